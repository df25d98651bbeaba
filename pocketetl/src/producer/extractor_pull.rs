//! # `ExtractorPullProducer`
//!
//! Drives a single user `Extractor`: opens the downstream consumer,
//! pulls records with `next()` until the source is exhausted, wraps
//! each into an envelope and hands it to `consume`, then closes the
//! downstream and the extractor. A stage configured with more than one
//! worker pulls with all of them concurrently against the same
//! extractor, serialized only for the `next()` call itself — the
//! extractor is locked just long enough to pull one record, so the
//! potentially-blocking `consume` downstream runs outside the lock and
//! different workers' records can be in flight at once.

use std::sync::{Arc, Mutex};

use pocketetl_domain::envelope::Envelope;
use pocketetl_domain::value_objects::WorkerCount;
use pocketetl_domain::{EtlError, Extractor, MetricsSink};

use crate::consumer::RuntimeConsumer;
use crate::view::ViewType;

use super::runtime_producer::RuntimeProducer;

pub struct ExtractorPullProducer<T: ViewType> {
    name: String,
    extractor: Mutex<Box<dyn Extractor<T>>>,
    workers: WorkerCount,
    downstream: Arc<dyn RuntimeConsumer>,
}

impl<T: ViewType> ExtractorPullProducer<T> {
    pub fn new(
        name: impl Into<String>,
        extractor: Box<dyn Extractor<T>>,
        workers: WorkerCount,
        downstream: Arc<dyn RuntimeConsumer>,
    ) -> Self {
        Self {
            name: name.into(),
            extractor: Mutex::new(extractor),
            workers,
            downstream,
        }
    }

    /// Pulls and forwards records until the source is exhausted or an
    /// unrecoverable failure is observed (locally or by a sibling
    /// worker via `abort`).
    fn pull_loop(&self, abort: &Mutex<Option<EtlError>>) {
        loop {
            if abort.lock().unwrap().is_some() {
                return;
            }

            let next = self.extractor.lock().unwrap().next();
            match next {
                Ok(Some(record)) => match Envelope::from_object(&record) {
                    Ok(envelope) => match self.downstream.consume(envelope) {
                        Ok(()) => {}
                        Err(error) if error.is_unrecoverable() => {
                            *abort.lock().unwrap() = Some(error);
                            return;
                        }
                        Err(error) => {
                            tracing::warn!(stage = %self.name, %error, "downstream rejected record");
                            return;
                        }
                    },
                    Err(error) => {
                        tracing::warn!(stage = %self.name, %error, "failed to serialize extracted record");
                    }
                },
                Ok(None) => return,
                Err(error) if error.is_unrecoverable() => {
                    *abort.lock().unwrap() = Some(error);
                    return;
                }
                Err(error) => {
                    tracing::warn!(stage = %self.name, %error, "recoverable extractor error");
                }
            }
        }
    }
}

impl<T: ViewType> RuntimeProducer for ExtractorPullProducer<T> {
    fn run(&self, metrics: Arc<dyn MetricsSink>) -> Result<(), EtlError> {
        self.downstream.open(metrics)?;
        self.extractor.lock().unwrap().open()?;

        let abort: Mutex<Option<EtlError>> = Mutex::new(None);
        if self.workers.get() <= 1 {
            self.pull_loop(&abort);
        } else {
            std::thread::scope(|scope| {
                for _ in 0..self.workers.get() {
                    scope.spawn(|| self.pull_loop(&abort));
                }
            });
        }

        let extractor_close = self.extractor.lock().unwrap().close();
        let downstream_close = self.downstream.close();
        let aborted = abort.into_inner().unwrap();

        if let Some(error) = aborted {
            return Err(error);
        }
        if let Err(error) = extractor_close {
            if error.is_unrecoverable() {
                return Err(error);
            }
            tracing::error!(stage = %self.name, %error, "extractor failed to close");
        }
        downstream_close
    }
}
