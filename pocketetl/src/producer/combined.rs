//! # `CombinedProducer`
//!
//! Fans in N upstream producers. Each upstream runs concurrently on its
//! own thread and is otherwise oblivious to its siblings; if any of
//! them observes an unrecoverable failure, it stops pulling on its own,
//! and the combined producer waits for every sibling to finish before
//! surfacing the first such failure.
//!
//! When the upstreams share one downstream consumer (built with
//! [`CombinedProducer::fan_in`]), each upstream still independently
//! opens and closes its own view of it, reconciled into one real
//! open/close by that consumer's `SmartOpenClose` wrapper — but nothing
//! stops one sibling's entire open→pull→close cycle from finishing
//! before another sibling has even opened its own view, which would
//! let the refcount return to zero mid-run and the leaf see more than
//! one open/close. `fan_in` closes that gap by holding its own baseline
//! open on the shared consumer before spawning any upstream and
//! releasing it only after every upstream has joined, so the refcount
//! never reaches zero until the whole combine is done.

use std::sync::Arc;

use pocketetl_domain::{EtlError, MetricsSink};

use crate::consumer::RuntimeConsumer;

use super::runtime_producer::RuntimeProducer;

pub struct CombinedProducer {
    producers: Vec<Arc<dyn RuntimeProducer>>,
    /// Held open for the whole run when the upstreams share one
    /// downstream consumer; `None` when each upstream is an
    /// already-self-contained chain with nothing in common to hold
    /// open a baseline on.
    shared_downstream: Option<Arc<dyn RuntimeConsumer>>,
}

impl CombinedProducer {
    /// Combines producers that have nothing shared between them —
    /// each is already a fully self-contained compiled chain with its
    /// own downstream consumer.
    pub fn new(producers: Vec<Arc<dyn RuntimeProducer>>) -> Self {
        Self {
            producers,
            shared_downstream: None,
        }
    }

    /// Combines producers that all feed the same `shared_downstream`.
    /// Takes a baseline open on it before any upstream starts and
    /// releases it only once every upstream has finished, so the
    /// shared consumer's refcount can't hit zero until the whole
    /// combine is done.
    pub fn fan_in(producers: Vec<Arc<dyn RuntimeProducer>>, shared_downstream: Arc<dyn RuntimeConsumer>) -> Self {
        Self {
            producers,
            shared_downstream: Some(shared_downstream),
        }
    }
}

impl RuntimeProducer for CombinedProducer {
    fn run(&self, metrics: Arc<dyn MetricsSink>) -> Result<(), EtlError> {
        if let Some(shared) = &self.shared_downstream {
            shared.open(Arc::clone(&metrics))?;
        }

        let results: Vec<Result<(), EtlError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .producers
                .iter()
                .map(|producer| {
                    let metrics = Arc::clone(&metrics);
                    scope.spawn(move || producer.run(metrics))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("producer worker thread panicked"))
                .collect()
        });

        let run_error = results.into_iter().find(Result::is_err);
        let close_result = match &self.shared_downstream {
            Some(shared) => shared.close(),
            None => Ok(()),
        };

        match run_error {
            Some(err) => err,
            None => close_result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pocketetl_domain::envelope::Envelope;
    use pocketetl_domain::{Extractor, NoopMetrics};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use crate::consumer::{ErrorSink, LoaderLeaf, MetricsEmission, RuntimeConsumer, SmartOpenClose};
    use crate::producer::extractor_pull::ExtractorPullProducer;
    use pocketetl_domain::value_objects::WorkerCount;
    use pocketetl_domain::Loader;

    #[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Rec {
        v: String,
    }

    struct VecExtractor(std::vec::IntoIter<Rec>);
    impl Extractor<Rec> for VecExtractor {
        fn next(&mut self) -> Result<Option<Rec>, EtlError> {
            Ok(self.0.next())
        }
    }

    #[test]
    fn fan_in_delivers_union_of_both_sources_with_the_leaf_opened_and_closed_exactly_once() {
        let buffer = Arc::new(StdMutex::new(Vec::new()));
        let buffer_clone = Arc::clone(&buffer);
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let loader: Box<dyn Loader<Rec>> = Box::new(move |record: Rec| {
            buffer_clone.lock().unwrap().push(record);
            Ok(())
        });
        let leaf = LoaderLeaf::new(loader, ErrorSink::new("load", crate::consumer::default_renderer()));
        let metrics_wrap = MetricsEmission::new("load", Arc::new(leaf));
        struct CountingConsumer(Arc<dyn RuntimeConsumer>, Arc<AtomicUsize>, Arc<AtomicUsize>);
        impl RuntimeConsumer for CountingConsumer {
            fn open(&self, metrics: Arc<dyn MetricsSink>) -> Result<(), EtlError> {
                self.1.fetch_add(1, Ordering::SeqCst);
                self.0.open(metrics)
            }
            fn consume(&self, envelope: Envelope) -> Result<(), EtlError> {
                self.0.consume(envelope)
            }
            fn close(&self) -> Result<(), EtlError> {
                self.2.fetch_add(1, Ordering::SeqCst);
                self.0.close()
            }
        }
        let counted: Arc<dyn RuntimeConsumer> =
            Arc::new(CountingConsumer(Arc::new(metrics_wrap), opens.clone(), closes.clone()));
        let shared: Arc<dyn RuntimeConsumer> = Arc::new(SmartOpenClose::new(counted));

        let left = ExtractorPullProducer::new(
            "a",
            Box::new(VecExtractor(vec![Rec { v: "A".into() }].into_iter())),
            WorkerCount::new(1).unwrap(),
            Arc::clone(&shared),
        );
        let right = ExtractorPullProducer::new(
            "b",
            Box::new(VecExtractor(vec![Rec { v: "B".into() }].into_iter())),
            WorkerCount::new(1).unwrap(),
            Arc::clone(&shared),
        );

        let combined = CombinedProducer::fan_in(vec![Arc::new(left), Arc::new(right)], shared);
        combined.run(Arc::new(NoopMetrics)).unwrap();

        let mut seen: Vec<String> = buffer.lock().unwrap().iter().map(|r| r.v.clone()).collect();
        seen.sort();
        assert_eq!(seen, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(opens.load(Ordering::SeqCst), 1, "leaf must be opened exactly once regardless of fan-in width");
        assert_eq!(closes.load(Ordering::SeqCst), 1, "leaf must be closed exactly once regardless of fan-in width");
    }

    #[test]
    fn one_unrecoverable_sibling_fails_the_whole_combine_with_the_leaf_opened_and_closed_exactly_once() {
        struct FailingExtractor;
        impl Extractor<Rec> for FailingExtractor {
            fn next(&mut self) -> Result<Option<Rec>, EtlError> {
                Err(EtlError::unrecoverable("dead"))
            }
        }
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        struct CountingConsumer(Arc<AtomicUsize>, Arc<AtomicUsize>);
        impl RuntimeConsumer for CountingConsumer {
            fn open(&self, _metrics: Arc<dyn MetricsSink>) -> Result<(), EtlError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            fn consume(&self, _envelope: Envelope) -> Result<(), EtlError> {
                Ok(())
            }
            fn close(&self) -> Result<(), EtlError> {
                self.1.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
        let shared: Arc<dyn RuntimeConsumer> =
            Arc::new(SmartOpenClose::new(Arc::new(CountingConsumer(opens.clone(), closes.clone()))));

        let good = ExtractorPullProducer::new(
            "good",
            Box::new(VecExtractor(vec![Rec { v: "A".into() }].into_iter())),
            WorkerCount::new(1).unwrap(),
            Arc::clone(&shared),
        );
        let bad =
            ExtractorPullProducer::new("bad", Box::new(FailingExtractor), WorkerCount::new(1).unwrap(), Arc::clone(&shared));

        let combined = CombinedProducer::fan_in(vec![Arc::new(good), Arc::new(bad)], shared);
        let err = combined.run(Arc::new(NoopMetrics)).unwrap_err();
        assert!(err.is_unrecoverable());
        assert_eq!(opens.load(Ordering::SeqCst), 1, "leaf must be opened exactly once regardless of fan-in width");
        assert_eq!(closes.load(Ordering::SeqCst), 1, "leaf must be closed exactly once regardless of fan-in width");
    }
}
