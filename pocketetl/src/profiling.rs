//! # Profiling Scope
//!
//! A nestable, `Drop`-based timer over a [`MetricsSink`]. Opening a scope
//! starts a clock and creates a child sink via `create_child`; closing it
//! (either explicitly or implicitly on drop) records the elapsed wall
//! clock time and rolls the child's totals into its parent. Closing a
//! scope twice is a misuse the scope logs rather than raises — metrics
//! are diagnostic, not correctness-critical, so double-closing one
//! shouldn't abort a run that is otherwise behaving correctly.

use std::sync::Arc;
use std::time::Instant;

use pocketetl_domain::MetricsSink;

/// A single nested timing scope.
///
/// `ProfilingScope::new` starts the clock immediately. Call
/// [`ProfilingScope::close`] to stop it and record the sample under
/// `name`; if the scope is dropped without an explicit `close`, it
/// closes itself using the same name.
pub struct ProfilingScope {
    name: String,
    start: Instant,
    sink: Arc<dyn MetricsSink>,
    closed: bool,
}

impl ProfilingScope {
    /// Opens a child scope of `parent`, timed under `name`.
    pub fn new(name: impl Into<String>, parent: &Arc<dyn MetricsSink>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
            sink: Arc::clone(parent).create_child(),
            closed: false,
        }
    }

    /// The child sink this scope hands to the work it's timing, so
    /// nested stages can open their own child scopes in turn.
    pub fn sink(&self) -> &Arc<dyn MetricsSink> {
        &self.sink
    }

    /// Stops the clock, records the elapsed time, and rolls this
    /// scope's totals up into its parent.
    ///
    /// Calling this more than once logs a warning and is otherwise a
    /// no-op; the elapsed time from the *first* call is the one that's
    /// kept.
    pub fn close(&mut self) {
        if self.closed {
            tracing::warn!(scope = %self.name, "profiling scope closed more than once");
            return;
        }
        self.closed = true;
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        self.sink.add_time(&self.name, elapsed_ms);
        self.sink.close();
    }
}

impl Drop for ProfilingScope {
    fn drop(&mut self) {
        if !self.closed {
            self.close();
        }
    }
}
