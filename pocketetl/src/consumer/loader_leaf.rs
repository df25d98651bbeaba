//! # `LoaderLeaf`
//!
//! The terminal consumer at the tail of a chain. Projects the envelope
//! into the stage's view type and hands it to the user's loader. A
//! recoverable failure is routed to this stage's error sink and the
//! record is considered handled; an unrecoverable one unwinds the
//! chain.

use std::sync::Mutex;

use pocketetl_domain::envelope::Envelope;
use pocketetl_domain::{EtlError, Loader, MetricsSink};

use crate::view::ViewType;

use super::error_sink::ErrorSink;
use super::runtime_consumer::RuntimeConsumer;

pub struct LoaderLeaf<T: ViewType> {
    loader: Mutex<Box<dyn Loader<T>>>,
    error_sink: ErrorSink<T>,
}

impl<T: ViewType> LoaderLeaf<T> {
    pub fn new(loader: Box<dyn Loader<T>>, error_sink: ErrorSink<T>) -> Self {
        Self {
            loader: Mutex::new(loader),
            error_sink,
        }
    }
}

impl<T: ViewType> RuntimeConsumer for LoaderLeaf<T> {
    fn open(&self, _metrics: std::sync::Arc<dyn MetricsSink>) -> Result<(), EtlError> {
        self.loader.lock().unwrap().open()
    }

    fn consume(&self, envelope: Envelope) -> Result<(), EtlError> {
        let record: T = match envelope.project() {
            Ok(record) => record,
            Err(error) => {
                self.error_sink.record(&T::default(), &error, &envelope);
                return Ok(());
            }
        };
        let outcome = self.loader.lock().unwrap().load(record.clone());
        match outcome {
            Ok(()) => Ok(()),
            Err(error) if error.is_unrecoverable() => Err(error),
            Err(error) => {
                self.error_sink.record(&record, &error, &envelope);
                Ok(())
            }
        }
    }

    fn close(&self) -> Result<(), EtlError> {
        self.loader.lock().unwrap().close()
    }
}
