//! # pocketetl-domain
//!
//! Domain types for PocketETL: the record envelope, the `Extractor` /
//! `Transformer` / `Loader` collaborator traits, the `MetricsSink`
//! contract, and the error taxonomy every stage communicates failure
//! through. Nothing in this crate spawns a thread, opens a socket, or
//! knows what a worker pool is — that's the runtime crate's job. This
//! crate only defines the vocabulary the runtime and its callers share.

pub mod envelope;
pub mod error;
pub mod metrics;
pub mod traits;
pub mod value_objects;

pub use envelope::{AttributeMap, Envelope};
pub use error::EtlError;
pub use metrics::{InMemoryMetrics, MetricsSink, NoopMetrics};
pub use traits::{Extractor, Loader, Transformer};
pub use value_objects::{QueueCapacity, WorkerCount};
