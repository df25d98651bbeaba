//! # pocketetl
//!
//! An embeddable, in-process batch data-movement pipeline runtime: a
//! user composes a directed acyclic pipeline of **producers**
//! (extract), **transformers**, and terminal **consumers** (load) and
//! runs it synchronously to completion with [`StageChain::run`].
//!
//! ## Quick start
//!
//! ```
//! use pocketetl::{extract, load, transform};
//! use pocketetl_domain::{EtlError, Extractor};
//!
//! #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
//! struct Row {
//!     v: String,
//! }
//!
//! struct Inputs(std::vec::IntoIter<Row>);
//! impl Extractor<Row> for Inputs {
//!     fn next(&mut self) -> Result<Option<Row>, EtlError> {
//!         Ok(self.0.next())
//!     }
//! }
//!
//! let rows = vec![Row { v: "ONE".into() }, Row { v: "TWO".into() }];
//! let chain = extract(Inputs(rows.into_iter()))
//!     .then(transform(|row: Row| Ok(vec![Row { v: row.v.to_lowercase() }])))
//!     .unwrap()
//!     .then(load(|row: Row| {
//!         println!("{}", row.v);
//!         Ok(())
//!     }))
//!     .unwrap();
//!
//! chain.run().unwrap();
//! ```
//!
//! ## Module map
//!
//! - [`chain`] — the fluent `StageChain` builder: `extract`, `extract_many`,
//!   `combine`, `.then()`, `.run()`.
//! - [`stage`] — the per-stage description types (`ExtractStage`,
//!   `TransformStage`, `LoadStage`) that `chain` compiles.
//! - [`executor`] — the bounded-queue worker pool every stage runs behind.
//! - [`consumer`] / [`producer`] — the runtime node types the chain compiles
//!   stage descriptions into.
//! - [`profiling`] — the nestable, `Drop`-based timing scope every stage
//!   opens around its work.
//! - [`view`] — the `ViewType` bound every stage's declared record type
//!   must satisfy.
//!
//! The three collaborator traits a caller implements — `Extractor`,
//! `Transformer`, `Loader` — along with the record envelope, the error
//! taxonomy, and the metrics sink contract live in the sibling
//! `pocketetl-domain` crate and are re-exported there rather than here,
//! since none of them depend on anything in this crate.

pub mod chain;
pub mod consumer;
pub mod executor;
pub mod producer;
pub mod profiling;
pub mod stage;
pub mod view;

pub use chain::{combine, extract, extract_many, StageChain};
pub use stage::{load, transform, ConsumerStage, ExtractStage, LoadStage, ProducerStage, TransformStage};
pub use view::ViewType;
