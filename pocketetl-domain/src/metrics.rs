//! # Metrics Sink Contract
//!
//! The metrics/profiling sink is an external collaborator: the pipeline
//! core only ever calls through this trait, and never ships a concrete
//! monitoring backend. Two
//! dependency-free implementations live here because a reader needs
//! *something* to exercise the trait with: [`NoopMetrics`], the
//! runtime's default, and [`InMemoryMetrics`], a small recording double
//! used across the test suite.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Operations a metrics collaborator must support.
///
/// `create_child` backs the nestable [profiling scope][crate profiling
/// module in `pocketetl`]: every nesting level gets its own child sink
/// that rolls its totals up into the parent when it closes. It takes
/// `self` by `Arc`, not by reference — the same receiver shape as
/// `std::task::Wake` — so an implementation can actually retain a
/// strong pointer back to the instance it was called on as the new
/// child's parent, which a plain `&self` receiver can't give it.
pub trait MetricsSink: Send + Sync {
    /// Adds `value` to a named counter.
    fn add_count(&self, name: &str, value: u64);

    /// Records an elapsed-time sample, in milliseconds, under `name`.
    fn add_time(&self, name: &str, millis: u64);

    /// Creates a child sink scoped to a nested operation.
    fn create_child(self: Arc<Self>) -> Arc<dyn MetricsSink>;

    /// Rolls this sink's totals into its parent, if any. The default
    /// no-op is correct for sinks with no parent to roll up into.
    fn close(&self) {}
}

/// The default sink: every operation is a no-op.
#[derive(Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn add_count(&self, _name: &str, _value: u64) {}
    fn add_time(&self, _name: &str, _millis: u64) {}
    fn create_child(self: Arc<Self>) -> Arc<dyn MetricsSink> {
        Arc::new(NoopMetrics)
    }
}

#[derive(Debug, Default)]
struct Totals {
    counts: HashMap<String, u64>,
    times: HashMap<String, Vec<u64>>,
}

/// A recording metrics sink for tests and demos.
///
/// Children roll their totals into the parent's on `close()`; counters
/// add, timing samples append (so a test can assert both the count and
/// the individual samples recorded for a scope).
#[derive(Debug)]
pub struct InMemoryMetrics {
    totals: Mutex<Totals>,
    parent: Option<Arc<InMemoryMetrics>>,
    closed: AtomicBool,
    post_close_write: AtomicBool,
    double_closed: AtomicBool,
}

impl Default for InMemoryMetrics {
    fn default() -> Self {
        Self {
            totals: Mutex::new(Totals::default()),
            parent: None,
            closed: AtomicBool::new(false),
            post_close_write: AtomicBool::new(false),
            double_closed: AtomicBool::new(false),
        }
    }
}

impl InMemoryMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self, name: &str) -> u64 {
        self.totals.lock().counts.get(name).copied().unwrap_or(0)
    }

    pub fn times(&self, name: &str) -> Vec<u64> {
        self.totals.lock().times.get(name).cloned().unwrap_or_default()
    }

    /// Whether a metric was recorded after this scope closed. This
    /// crate has no logging dependency of its own, so unlike the
    /// profiling scope in `pocketetl`, this double just tracks the
    /// misuse rather than logging it; callers that care can check
    /// [`InMemoryMetrics::recorded_after_close`].
    pub fn recorded_after_close(&self) -> bool {
        self.post_close_write.load(Ordering::Acquire)
    }

    /// Whether this scope was closed more than once.
    pub fn double_closed(&self) -> bool {
        self.double_closed.load(Ordering::Acquire)
    }

    fn note_if_closed(&self) {
        if self.closed.load(Ordering::Acquire) {
            self.post_close_write.store(true, Ordering::Release);
        }
    }
}

impl MetricsSink for InMemoryMetrics {
    fn add_count(&self, name: &str, value: u64) {
        self.note_if_closed();
        *self.totals.lock().counts.entry(name.to_string()).or_insert(0) += value;
    }

    fn add_time(&self, name: &str, millis: u64) {
        self.note_if_closed();
        self.totals.lock().times.entry(name.to_string()).or_default().push(millis);
    }

    fn create_child(self: Arc<Self>) -> Arc<dyn MetricsSink> {
        InMemoryMetrics::child_of(&self)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            self.double_closed.store(true, Ordering::Release);
            return;
        }
        if let Some(parent) = &self.parent {
            let totals = self.totals.lock();
            let mut parent_totals = parent.totals.lock();
            for (name, value) in &totals.counts {
                *parent_totals.counts.entry(name.clone()).or_insert(0) += value;
            }
            for (name, samples) in &totals.times {
                parent_totals.times.entry(name.clone()).or_default().extend(samples.iter().copied());
            }
        }
    }
}

impl InMemoryMetrics {
    /// Builds a child scope that rolls its totals up into `parent` when
    /// the child is closed. This is what `create_child` calls; it's
    /// also exposed directly so a test can build a roll-up chain of
    /// concrete `InMemoryMetrics` without going through `Arc<dyn
    /// MetricsSink>` first.
    pub fn child_of(parent: &Arc<InMemoryMetrics>) -> Arc<InMemoryMetrics> {
        Arc::new(InMemoryMetrics {
            totals: Mutex::new(Totals::default()),
            parent: Some(Arc::clone(parent)),
            closed: AtomicBool::new(false),
            post_close_write: AtomicBool::new(false),
            double_closed: AtomicBool::new(false),
        })
    }
}
