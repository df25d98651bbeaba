//! # Producer Chain
//!
//! The producer side of a compiled pipeline: a single
//! [`extractor_pull::ExtractorPullProducer`] driving one user
//! extractor, or a [`combined::CombinedProducer`] fanning several of
//! them into one shared downstream.

pub mod combined;
pub mod extractor_pull;
pub mod runtime_producer;

pub use combined::CombinedProducer;
pub use extractor_pull::ExtractorPullProducer;
pub use runtime_producer::RuntimeProducer;
