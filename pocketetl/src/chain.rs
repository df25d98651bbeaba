//! # Stage Chain & Compilation
//!
//! `StageChain` is the fluent, immutable description of a pipeline: one
//! producer followed by zero or more consumer stages, the last of
//! which — if present — must be a loader for the chain to be
//! **terminated**. Only a terminated chain can be run. Every `.then()`
//! call consumes the chain and returns a new one; there is no way to
//! hold onto an earlier value and keep building from it after it's
//! moved past, matching the "original is never mutated" guarantee
//! through ownership rather than cloning.
//!
//! A chain compiles leaves-first at `run()` time (see
//! [`StageChain::run`]): the loader is built first with no downstream,
//! each transform above it is built against the already-built
//! downstream, and finally the producer (or producers, for a
//! multi-extractor or combined chain) is built against the completed
//! consumer chain. Every compiled runtime node is single-use — `run`
//! consumes the chain by value.
//!
//! ## `combine` and partially-built chains
//!
//! `combine(chains)` fans N stage chains' producers into one runtime.
//! The source system combine() is grounded on allows combining chains
//! that already have their own, divergent downstream consumers
//! attached (some terminated with a loader, others not) — a case that
//! doesn't have one unambiguous generalization once a combined fan-in
//! is modeled as "N producers sharing one downstream consumer": a
//! chain that's already terminated has no "downstream" left to share.
//! Rather than guess at a general rule, `combine` accepts exactly the
//! two shapes a shared-downstream fan-in can represent without making
//! something up:
//!
//! - an **already-terminated** chain, which keeps its own self-contained
//!   producer/consumer graph and simply runs alongside its siblings
//!   (independent, not sharing anything), or
//! - a **bare producer** chain with no consumer stages attached yet,
//!   whose producer(s) are folded into the combined chain's own
//!   producer set so that a later `.then()` gives all of them one
//!   shared downstream.
//!
//! A chain that has *some* consumer stages attached but isn't yet
//! terminated (a transform with no loader after it) can't be expressed
//! in either shape and is rejected as misuse. The combined chain is
//! terminated iff every input was already terminated; nested combines
//! are flattened into one fan-in rather than wrapped, so running it
//! never spins up a pool of pools.

use std::sync::Arc;

use pocketetl_domain::{EtlError, Extractor, MetricsSink, NoopMetrics};

use crate::producer::{CombinedProducer, RuntimeProducer};
use crate::stage::{ConsumerStage, ExtractStage, ProducerStage};
use crate::view::ViewType;

/// The producer-side head of a chain: either a single extractor stage
/// or several sharing one downstream (built by [`extract_many`] or
/// folded together by [`combine`]).
enum ProducerSpec {
    Single(Box<dyn ProducerStage>),
    Many(Vec<Box<dyn ProducerStage>>),
}

impl ProducerSpec {
    fn build(self, downstream: Arc<dyn crate::consumer::RuntimeConsumer>) -> Arc<dyn RuntimeProducer> {
        match self {
            ProducerSpec::Single(stage) => stage.build(downstream),
            ProducerSpec::Many(stages) => {
                let producers = stages
                    .into_iter()
                    .map(|stage| stage.build(Arc::clone(&downstream)))
                    .collect();
                Arc::new(CombinedProducer::fan_in(producers, downstream))
            }
        }
    }
}

/// An immutable, fluently-built description of a pipeline.
pub struct StageChain {
    producer: Option<ProducerSpec>,
    stages: Vec<Box<dyn ConsumerStage>>,
    /// Already-terminated chains folded in by [`combine`]; each
    /// compiles to its own self-contained runtime producer and runs
    /// alongside whatever this chain's own `producer` builds.
    independent: Vec<StageChain>,
    terminated: bool,
}

impl StageChain {
    fn from_producer(stage: Box<dyn ProducerStage>) -> Self {
        Self {
            producer: Some(ProducerSpec::Single(stage)),
            stages: Vec::new(),
            independent: Vec::new(),
            terminated: false,
        }
    }

    /// Whether this chain's last stage is a loader. Only a terminated
    /// chain may be `run`.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Appends a consumer stage, built with [`crate::stage::transform`]
    /// or [`crate::stage::load`]. Fails with a misuse error if this
    /// chain is already terminated.
    pub fn then(mut self, stage: impl ConsumerStage + 'static) -> Result<Self, EtlError> {
        if self.terminated {
            return Err(EtlError::misuse("cannot add a stage to an already-terminated chain"));
        }
        self.terminated = stage.is_loader();
        self.stages.push(Box::new(stage));
        Ok(self)
    }

    /// Compiles and runs this chain to completion with a no-op metrics
    /// sink. Fails with a misuse error if the chain isn't terminated.
    pub fn run(self) -> Result<(), EtlError> {
        self.run_with_metrics(Arc::new(NoopMetrics))
    }

    /// Compiles and runs this chain to completion, threading `metrics`
    /// through every stage's `open`. Fails with a misuse error if the
    /// chain isn't terminated.
    pub fn run_with_metrics(self, metrics: Arc<dyn MetricsSink>) -> Result<(), EtlError> {
        let producer = self.compile()?;
        producer.run(metrics)
    }

    /// Builds the runtime graph leaves-first. Consumes the chain:
    /// the compiled graph is single-use, matching the runtime's
    /// "immutable description, single-use execution" split.
    fn compile(self) -> Result<Arc<dyn RuntimeProducer>, EtlError> {
        if !self.terminated {
            return Err(EtlError::misuse("cannot run a stage chain that has not been terminated with a load stage"));
        }

        let mut downstream: Option<Arc<dyn crate::consumer::RuntimeConsumer>> = None;
        for stage in self.stages.into_iter().rev() {
            downstream = Some(stage.build(downstream));
        }

        let mut producers = Vec::new();
        if let Some(spec) = self.producer {
            let consumer = downstream.expect("a terminated chain with its own producer always built a loader");
            producers.push(spec.build(consumer));
        }
        for independent in self.independent {
            producers.push(independent.compile()?);
        }

        match producers.len() {
            0 => Err(EtlError::misuse("stage chain has no producer to run")),
            1 => Ok(producers.into_iter().next().expect("checked len == 1")),
            _ => Ok(Arc::new(CombinedProducer::new(producers))),
        }
    }
}

/// Starts a chain from a single extractor.
pub fn extract<T: ViewType>(extractor: impl Extractor<T> + 'static) -> StageChain {
    StageChain::from_producer(Box::new(ExtractStage::new(extractor)))
}

/// Starts a chain from several extractors of the same view type,
/// all pulled concurrently against one eventual shared downstream.
pub fn extract_many<T: ViewType>(extractors: Vec<Box<dyn Extractor<T>>>) -> Result<StageChain, EtlError> {
    if extractors.is_empty() {
        return Err(EtlError::misuse("extract_many requires at least one extractor"));
    }
    let mut stages: Vec<Box<dyn ProducerStage>> = extractors
        .into_iter()
        .map(|extractor| Box::new(ExtractStage::from_boxed(extractor)) as Box<dyn ProducerStage>)
        .collect();

    let producer = if stages.len() == 1 {
        ProducerSpec::Single(stages.pop().expect("checked len == 1"))
    } else {
        ProducerSpec::Many(stages)
    };

    Ok(StageChain {
        producer: Some(producer),
        stages: Vec::new(),
        independent: Vec::new(),
        terminated: false,
    })
}

/// Fans N stage chains' producers into one combined runtime. See the
/// module documentation for exactly which chain shapes this accepts.
pub fn combine(chains: Vec<StageChain>) -> Result<StageChain, EtlError> {
    if chains.len() < 2 {
        return Err(EtlError::misuse("combine requires at least two stage chains"));
    }

    let mut merged_producers: Vec<Box<dyn ProducerStage>> = Vec::new();
    let mut independent: Vec<StageChain> = Vec::new();
    let mut all_terminated = true;

    for chain in chains {
        if !chain.terminated && !chain.stages.is_empty() {
            return Err(EtlError::misuse(
                "combine only accepts chains that are already terminated or have no consumer stages attached yet",
            ));
        }
        all_terminated &= chain.terminated;

        if chain.terminated {
            independent.push(chain);
        } else {
            match chain.producer {
                Some(ProducerSpec::Single(stage)) => merged_producers.push(stage),
                Some(ProducerSpec::Many(stages)) => merged_producers.extend(stages),
                None => {}
            }
        }
    }

    // Flatten rather than nest: an already-combined chain folded into
    // this one contributes its own independents directly, so running
    // the result never spins up a combined pool of combined pools.
    let mut flattened = Vec::with_capacity(independent.len());
    for chain in independent {
        if chain.independent.is_empty() {
            flattened.push(chain);
            continue;
        }
        let StageChain {
            producer,
            stages,
            independent: nested,
            terminated,
        } = chain;
        if producer.is_some() || !stages.is_empty() {
            flattened.push(StageChain {
                producer,
                stages,
                independent: Vec::new(),
                terminated,
            });
        }
        flattened.extend(nested);
    }

    let producer = if merged_producers.is_empty() {
        None
    } else if merged_producers.len() == 1 {
        Some(ProducerSpec::Single(merged_producers.pop().expect("checked len == 1")))
    } else {
        Some(ProducerSpec::Many(merged_producers))
    };

    Ok(StageChain {
        producer,
        stages: Vec::new(),
        independent: flattened,
        terminated: all_terminated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pocketetl_domain::EtlError as DomainError;
    use std::sync::Mutex as StdMutex;

    use crate::stage::{load, transform};

    #[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Rec {
        v: String,
    }

    struct VecExtractor(std::vec::IntoIter<Rec>);
    impl Extractor<Rec> for VecExtractor {
        fn next(&mut self) -> Result<Option<Rec>, DomainError> {
            Ok(self.0.next())
        }
    }

    fn vec_extractor(values: &[&str]) -> VecExtractor {
        VecExtractor(values.iter().map(|v| Rec { v: v.to_string() }).collect::<Vec<_>>().into_iter())
    }

    #[test]
    fn simple_extract_then_load_runs_to_completion() {
        let buffer = Arc::new(StdMutex::new(Vec::new()));
        let buffer_clone = Arc::clone(&buffer);

        let chain = extract(vec_extractor(&["ONE", "TWO"]))
            .then(load(move |record: Rec| {
                buffer_clone.lock().unwrap().push(record.v);
                Ok(())
            }))
            .unwrap();

        assert!(chain.is_terminated());
        chain.run().unwrap();

        let mut seen = buffer.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["ONE".to_string(), "TWO".to_string()]);
    }

    #[test]
    fn appending_a_stage_after_termination_is_misuse() {
        let chain = extract(vec_extractor(&["ONE"])).then(load(|_: Rec| Ok(()))).unwrap();
        let err = chain.then(load(|_: Rec| Ok(()))).unwrap_err();
        assert!(err.is_misuse());
    }

    #[test]
    fn running_an_unterminated_chain_is_misuse() {
        let chain = extract(vec_extractor(&["ONE"])).then(transform(|r: Rec| Ok(vec![r]))).unwrap();
        let err = chain.run().unwrap_err();
        assert!(err.is_misuse());
    }

    #[test]
    fn combine_of_a_single_chain_is_misuse() {
        let chain = extract(vec_extractor(&["ONE"])).then(load(|_: Rec| Ok(()))).unwrap();
        let err = combine(vec![chain]).unwrap_err();
        assert!(err.is_misuse());
    }

    #[test]
    fn combine_fans_in_two_bare_producers_before_then() {
        let buffer = Arc::new(StdMutex::new(Vec::new()));
        let buffer_clone = Arc::clone(&buffer);

        let left = extract(vec_extractor(&["A"]));
        let right = extract(vec_extractor(&["B"]));
        let combined = combine(vec![left, right]).unwrap();
        assert!(!combined.is_terminated());

        let chain = combined
            .then(load(move |record: Rec| {
                buffer_clone.lock().unwrap().push(record.v);
                Ok(())
            }))
            .unwrap();
        chain.run().unwrap();

        let mut seen = buffer.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn combine_of_two_already_terminated_chains_runs_both_independently() {
        let buffer = Arc::new(StdMutex::new(Vec::new()));

        let buffer_a = Arc::clone(&buffer);
        let left = extract(vec_extractor(&["A"]))
            .then(load(move |record: Rec| {
                buffer_a.lock().unwrap().push(record.v);
                Ok(())
            }))
            .unwrap();

        let buffer_b = Arc::clone(&buffer);
        let right = extract(vec_extractor(&["B"]))
            .then(load(move |record: Rec| {
                buffer_b.lock().unwrap().push(record.v);
                Ok(())
            }))
            .unwrap();

        let combined = combine(vec![left, right]).unwrap();
        assert!(combined.is_terminated());
        combined.run().unwrap();

        let mut seen = buffer.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn combine_of_mixed_terminated_and_bare_chains_links_the_then_only_to_the_bare_one() {
        let terminated_buffer = Arc::new(StdMutex::new(Vec::new()));
        let shared_buffer = Arc::new(StdMutex::new(Vec::new()));

        let terminated_clone = Arc::clone(&terminated_buffer);
        let already_terminated = extract(vec_extractor(&["PRE"]))
            .then(load(move |record: Rec| {
                terminated_clone.lock().unwrap().push(record.v);
                Ok(())
            }))
            .unwrap();

        let bare = extract(vec_extractor(&["BARE"]));

        let combined = combine(vec![already_terminated, bare]).unwrap();
        assert!(!combined.is_terminated(), "mixed combine is not terminated until the bare side gets a loader");

        let shared_clone = Arc::clone(&shared_buffer);
        let chain = combined
            .then(load(move |record: Rec| {
                shared_clone.lock().unwrap().push(record.v);
                Ok(())
            }))
            .unwrap();
        chain.run().unwrap();

        assert_eq!(*terminated_buffer.lock().unwrap(), vec!["PRE".to_string()]);
        assert_eq!(*shared_buffer.lock().unwrap(), vec!["BARE".to_string()]);
    }

    #[test]
    fn combine_with_a_half_built_chain_is_misuse() {
        let half_built = extract(vec_extractor(&["ONE"])).then(transform(|r: Rec| Ok(vec![r]))).unwrap();
        let bare = extract(vec_extractor(&["TWO"]));
        let err = combine(vec![half_built, bare]).unwrap_err();
        assert!(err.is_misuse());
    }

    #[test]
    fn extract_many_requires_at_least_one_extractor() {
        let err = extract_many::<Rec>(Vec::new()).unwrap_err();
        assert!(err.is_misuse());
    }

    #[test]
    fn extract_many_fans_in_every_source() {
        let buffer = Arc::new(StdMutex::new(Vec::new()));
        let buffer_clone = Arc::clone(&buffer);

        let extractors: Vec<Box<dyn Extractor<Rec>>> =
            vec![Box::new(vec_extractor(&["A"])), Box::new(vec_extractor(&["B"])), Box::new(vec_extractor(&["C"]))];
        let chain = extract_many(extractors)
            .unwrap()
            .then(load(move |record: Rec| {
                buffer_clone.lock().unwrap().push(record.v);
                Ok(())
            }))
            .unwrap();
        chain.run().unwrap();

        let mut seen = buffer.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["A".to_string(), "B".to_string(), "C".to_string()]);
    }
}
