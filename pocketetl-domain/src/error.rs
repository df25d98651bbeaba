//! # Error Taxonomy
//!
//! PocketETL classifies every failure a stage can raise into exactly
//! three categories, matching the error-handling design laid out for
//! the pipeline runtime:
//!
//! - **Recoverable** — one record failed; it is routed to the owning
//!   stage's error sink and the stream continues.
//! - **Unrecoverable** — the whole run must abort; the first one raised
//!   wins and is what `run()`/`run_with_metrics()` return.
//! - **Misuse** — a caller broke a build-time or run-time contract
//!   (adding a stage to a terminated chain, running an unterminated
//!   chain, closing a shared consumer more times than it was opened).
//!   Raised synchronously on the calling thread.
//!
//! `EtlError` stores string payloads rather than boxed source errors so
//! that it stays `Clone` — a failure recorded on one worker thread
//! needs to be read back by the thread driving `run()` without any
//! further synchronization machinery.

use thiserror::Error;

/// The single error type threaded through every PocketETL trait and
/// runtime component.
#[derive(Error, Debug, Clone)]
pub enum EtlError {
    /// A single record failed to process; the record is dropped and the
    /// stream continues.
    #[error("{0}")]
    Recoverable(String),

    /// The stream cannot continue; `run()` aborts and returns this
    /// error after in-flight work drains and every stage closes.
    #[error("unrecoverable stream failure: {0}")]
    Unrecoverable(String),

    /// The caller violated a build-time or run-time contract of the
    /// pipeline API itself (not a data-processing failure).
    #[error("invalid pipeline usage: {0}")]
    Misuse(String),
}

impl EtlError {
    /// Builds a recoverable record error from any displayable cause.
    pub fn recoverable(cause: impl std::fmt::Display) -> Self {
        Self::Recoverable(cause.to_string())
    }

    /// Builds an unrecoverable stream failure from any displayable cause.
    pub fn unrecoverable(cause: impl std::fmt::Display) -> Self {
        Self::Unrecoverable(cause.to_string())
    }

    /// Builds a misuse error.
    pub fn misuse(message: impl Into<String>) -> Self {
        Self::Misuse(message.into())
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable(_))
    }

    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Unrecoverable(_))
    }

    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::Misuse(_))
    }
}

// The envelope layer is the only place the domain crate needs to turn a
// foreign error into one of ours: (de)serializing a stage's view type.
// A serialization failure on a single record's attributes is, per the
// envelope contract, a recoverable error at the calling stage.
impl From<serde_json::Error> for EtlError {
    fn from(err: serde_json::Error) -> Self {
        EtlError::Recoverable(err.to_string())
    }
}
