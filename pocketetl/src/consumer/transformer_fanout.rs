//! # `TransformerFanout`
//!
//! Projects the envelope into the stage's input view type, calls the
//! user transformer, and re-emits each of its 0..N outputs as a new
//! envelope — the output's attributes overlaid on the input's, so
//! anything the transformer didn't touch tunnels through to the next
//! stage unchanged. Same recoverable/unrecoverable error policy as
//! [`LoaderLeaf`](super::loader_leaf::LoaderLeaf).

use std::sync::{Arc, Mutex};

use pocketetl_domain::envelope::Envelope;
use pocketetl_domain::{EtlError, MetricsSink, Transformer};

use crate::view::ViewType;

use super::error_sink::ErrorSink;
use super::runtime_consumer::RuntimeConsumer;

pub struct TransformerFanout<I: ViewType, O: ViewType> {
    transformer: Mutex<Box<dyn Transformer<I, O>>>,
    downstream: Arc<dyn RuntimeConsumer>,
    error_sink: ErrorSink<I>,
}

impl<I: ViewType, O: ViewType> TransformerFanout<I, O> {
    pub fn new(
        transformer: Box<dyn Transformer<I, O>>,
        downstream: Arc<dyn RuntimeConsumer>,
        error_sink: ErrorSink<I>,
    ) -> Self {
        Self {
            transformer: Mutex::new(transformer),
            downstream,
            error_sink,
        }
    }
}

impl<I: ViewType, O: ViewType> RuntimeConsumer for TransformerFanout<I, O> {
    fn open(&self, metrics: Arc<dyn MetricsSink>) -> Result<(), EtlError> {
        self.transformer.lock().unwrap().open()?;
        self.downstream.open(metrics)
    }

    fn consume(&self, envelope: Envelope) -> Result<(), EtlError> {
        let input: I = match envelope.project() {
            Ok(input) => input,
            Err(error) => {
                self.error_sink.record(&I::default(), &error, &envelope);
                return Ok(());
            }
        };

        let outputs = match self.transformer.lock().unwrap().transform(input.clone()) {
            Ok(outputs) => outputs,
            Err(error) if error.is_unrecoverable() => return Err(error),
            Err(error) => {
                self.error_sink.record(&input, &error, &envelope);
                return Ok(());
            }
        };

        for output in outputs {
            let merged = match envelope.merge_object(&output) {
                Ok(merged) => merged,
                Err(error) => {
                    self.error_sink.record(&input, &error, &envelope);
                    continue;
                }
            };
            self.downstream.consume(merged)?;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), EtlError> {
        self.transformer.lock().unwrap().close()?;
        self.downstream.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pocketetl_domain::NoopMetrics;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Rec {
        v: String,
    }

    struct CollectingConsumer(StdMutex<Vec<Rec>>);
    impl RuntimeConsumer for CollectingConsumer {
        fn open(&self, _metrics: Arc<dyn MetricsSink>) -> Result<(), EtlError> {
            Ok(())
        }
        fn consume(&self, envelope: Envelope) -> Result<(), EtlError> {
            let record: Rec = envelope.project()?;
            self.0.lock().unwrap().push(record);
            Ok(())
        }
        fn close(&self) -> Result<(), EtlError> {
            Ok(())
        }
    }

    #[test]
    fn fans_out_multiple_outputs_per_input() {
        let collector = Arc::new(CollectingConsumer(StdMutex::new(Vec::new())));
        let transformer: Box<dyn Transformer<Rec, Rec>> = Box::new(|input: Rec| {
            Ok(vec![
                input.clone(),
                Rec {
                    v: input.v.to_lowercase(),
                },
            ])
        });
        let fanout = TransformerFanout::new(
            transformer,
            collector.clone(),
            ErrorSink::new("t", super::super::error_sink::default_renderer()),
        );
        fanout.open(Arc::new(NoopMetrics)).unwrap();
        let envelope = Envelope::from_object(&Rec { v: "ONE".into() }).unwrap();
        fanout.consume(envelope).unwrap();

        let seen = collector.0.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].v, "ONE");
        assert_eq!(seen[1].v, "one");
    }
}
