//! # Consumer Chain
//!
//! The consumer side of a compiled stage: `SmartOpenClose` wraps
//! `MetricsEmission` wraps `ExecutorDispatch` wraps a leaf
//! (`LoaderLeaf` or `TransformerFanout`). Each layer is its own module;
//! `stage::StageFactory` implementations are the only code that
//! actually assembles the chain.

pub mod dispatch;
pub mod error_sink;
pub mod loader_leaf;
pub mod metrics_emission;
pub mod runtime_consumer;
pub mod smart;
pub mod transformer_fanout;

pub use dispatch::ExecutorDispatch;
pub use error_sink::{default_renderer, ErrorRenderer, ErrorSink};
pub use loader_leaf::LoaderLeaf;
pub use metrics_emission::MetricsEmission;
pub use runtime_consumer::RuntimeConsumer;
pub use smart::SmartOpenClose;
pub use transformer_fanout::TransformerFanout;
