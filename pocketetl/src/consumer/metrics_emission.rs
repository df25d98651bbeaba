//! # `MetricsEmission`
//!
//! Emits `<stage>.recordsProcessed` on every `consume`, and a
//! zero-valued sample of the same counter on `open` so the metric
//! exists even for a stream that never sees a single record. Also opens
//! a [`ProfilingScope`] named after the stage around every `consume`, so
//! the wrapped dispatch-and-leaf work is timed the way §4.6 calls for
//! ("every stage opens a scope on `consume`"). Otherwise a pass-through:
//! forwards open/consume/close to the wrapped consumer unchanged.

use std::sync::{Arc, OnceLock};

use pocketetl_domain::envelope::Envelope;
use pocketetl_domain::{EtlError, MetricsSink};

use crate::profiling::ProfilingScope;

use super::runtime_consumer::RuntimeConsumer;

pub struct MetricsEmission {
    stage_name: String,
    inner: Arc<dyn RuntimeConsumer>,
    metrics: OnceLock<Arc<dyn MetricsSink>>,
}

impl MetricsEmission {
    pub fn new(stage_name: impl Into<String>, inner: Arc<dyn RuntimeConsumer>) -> Self {
        Self {
            stage_name: stage_name.into(),
            inner,
            metrics: OnceLock::new(),
        }
    }

    fn counter_name(&self) -> String {
        format!("{}.recordsProcessed", self.stage_name)
    }
}

impl RuntimeConsumer for MetricsEmission {
    fn open(&self, metrics: Arc<dyn MetricsSink>) -> Result<(), EtlError> {
        metrics.add_count(&self.counter_name(), 0);
        // `open` can legitimately run more than once through a
        // `SmartOpenClose` wrapper higher up the chain (a fan-in's
        // per-upstream open) by the time it reaches here only if this
        // node itself is shared, which it never is in this chain's
        // wrapping order — `MetricsEmission` always sits directly
        // under exactly one `SmartOpenClose`. `get_or_init` still
        // guards against stashing a second, different sink on any
        // accidental repeat.
        let _ = self.metrics.get_or_init(|| metrics);
        self.inner.open(self.metrics.get().unwrap().clone())
    }

    fn consume(&self, envelope: Envelope) -> Result<(), EtlError> {
        if let Some(metrics) = self.metrics.get() {
            metrics.add_count(&self.counter_name(), 1);
            let mut scope = ProfilingScope::new(self.stage_name.clone(), metrics);
            let result = self.inner.consume(envelope);
            scope.close();
            return result;
        }
        self.inner.consume(envelope)
    }

    fn close(&self) -> Result<(), EtlError> {
        self.inner.close()
    }
}
