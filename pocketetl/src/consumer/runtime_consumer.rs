//! # Runtime Consumer Contract
//!
//! Every node a stage chain compiles on the consumer side — whether it's
//! the loader at a chain's tail or one of the wrapping layers around it
//! — implements this trait. The wrapping order is always the same,
//! leaf-last: `SmartOpenClose` around `MetricsEmission` around
//! `ExecutorDispatch` around the leaf (`LoaderLeaf` or
//! `TransformerFanout`).

use std::sync::Arc;

use pocketetl_domain::{EtlError, MetricsSink};
use pocketetl_domain::envelope::Envelope;

/// A single node in the consumer-side wrapping chain.
///
/// `consume` only ever returns `Err` for an unrecoverable failure (or a
/// misuse of the dispatch contract, e.g. consuming after close) —
/// recoverable record failures are caught and routed to the stage's
/// error sink internally and never surface here, matching the
/// propagation policy: recoverable errors travel sideways, never up.
pub trait RuntimeConsumer: Send + Sync {
    /// Called once per independent opener before any `consume`. Fan-in
    /// producers sharing one downstream each call this once; see
    /// `SmartOpenClose` for how that's reconciled into a single
    /// underlying open.
    fn open(&self, metrics: Arc<dyn MetricsSink>) -> Result<(), EtlError>;

    /// Hands one record to this node.
    fn consume(&self, envelope: Envelope) -> Result<(), EtlError>;

    /// Called once per opener, mirroring `open`.
    fn close(&self) -> Result<(), EtlError>;
}
