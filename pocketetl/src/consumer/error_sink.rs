//! # Error Sink (`LogAsErrorLeaf`)
//!
//! Every stage's leaf consumer routes a record's recoverable failure
//! here instead of letting it propagate. Unlike the rest of the
//! consumer chain, the sink needs both the envelope *and* the
//! [`EtlError`] that describes what went wrong, which doesn't fit the
//! generic `RuntimeConsumer::consume(envelope)` shape — so this is a
//! narrower, dedicated type rather than another `RuntimeConsumer`
//! variant. It runs synchronously, inline, on whichever worker thread
//! hit the failure: routing a record here must never itself be
//! subject to the stage's own backpressure.
//!
//! The per-record log renderer defaults to revealing only the source
//! type's name, never its field contents, so a caller who forgets to
//! configure a custom renderer can't accidentally leak record payloads
//! into logs.

use std::marker::PhantomData;
use std::sync::Arc;

use pocketetl_domain::envelope::Envelope;
use pocketetl_domain::EtlError;

/// Renders a failed record for the error log line. Boxed so stage
/// descriptions can carry a custom renderer without a generic
/// parameter leaking into every consumer type that owns one.
pub type ErrorRenderer<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// Builds the default renderer for `T`: reveals only the type name.
pub fn default_renderer<T>() -> ErrorRenderer<T> {
    Arc::new(|_record: &T| std::any::type_name::<T>().to_string())
}

pub struct ErrorSink<T> {
    stage_name: String,
    renderer: ErrorRenderer<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ErrorSink<T> {
    pub fn new(stage_name: impl Into<String>, renderer: ErrorRenderer<T>) -> Self {
        Self {
            stage_name: stage_name.into(),
            renderer,
            _marker: PhantomData,
        }
    }

    /// Logs a record's failure. `record` is the stage's own view type,
    /// already projected from the envelope that failed — the caller
    /// projects it before calling, since that's the same projection
    /// the leaf already had to perform to invoke the user function.
    pub fn record(&self, record: &T, error: &EtlError, _envelope: &Envelope) {
        tracing::error!(
            stage = %self.stage_name,
            record = %(self.renderer)(record),
            error = %error,
            "record failed, routed to error sink"
        );
    }
}
