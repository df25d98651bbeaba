//! # Runtime Producer Contract
//!
//! The two producer-side runtime nodes: [`super::extractor_pull::ExtractorPullProducer`],
//! which drives a user `Extractor`, and
//! [`super::combined::CombinedProducer`], which fans N of them into one
//! shared downstream. Both are single-use: `run` consumes the node by
//! value and drives the chain to completion or abort.

use std::sync::Arc;

use pocketetl_domain::{EtlError, MetricsSink};

pub trait RuntimeProducer: Send + Sync {
    /// Drives the stage to completion: opens the downstream consumer,
    /// pulls until exhausted (or aborted), then closes it. Returns the
    /// first unrecoverable failure observed anywhere in the run, if
    /// any.
    fn run(&self, metrics: Arc<dyn MetricsSink>) -> Result<(), EtlError>;
}
