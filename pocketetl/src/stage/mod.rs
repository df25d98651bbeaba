//! # Stage Description & Compilation
//!
//! Immutable-by-convention builder objects: `ExtractStage`,
//! `TransformStage`, `LoadStage`. Each exposes `with_name`,
//! `with_threads`, `with_queue_capacity`, and (consumer stages only)
//! `with_logger`. `.then()` on a [`crate::chain::StageChain`] takes any
//! [`ConsumerStage`] — build one with the free functions [`transform`]
//! or [`load`]. `ExtractStage` is built directly (`ExtractStage::new`)
//! and handed to [`crate::chain::extract`]/[`crate::chain::extract_many`],
//! the chain DSL's entry points.
//!
//! Builder calls mutate and return `self` by value rather than
//! allocating a fresh instance on every call — cheaper, and the
//! "original is never mutated" guarantee the design calls for still
//! holds, because the receiver is consumed: there is no way to hold
//! onto the pre-`with_name` value and use it again afterward.

use std::sync::Arc;

use pocketetl_domain::value_objects::{QueueCapacity, WorkerCount};
use pocketetl_domain::{EtlError, Extractor, Loader, Transformer};

use crate::consumer::{
    default_renderer, ErrorRenderer, ErrorSink, ExecutorDispatch, LoaderLeaf, MetricsEmission,
    RuntimeConsumer, SmartOpenClose, TransformerFanout,
};
use crate::executor::Executor;
use crate::producer::ExtractorPullProducer;
use crate::producer::RuntimeProducer;
use crate::view::ViewType;

/// A consumer-side stage description: either a transform or a load.
/// `.then()` accepts anything implementing this trait.
pub trait ConsumerStage: Send + Sync {
    /// Whether this stage terminates a chain (a loader does; a
    /// transform doesn't).
    fn is_loader(&self) -> bool;

    fn set_name(&mut self, name: String);
    fn set_threads(&mut self, workers: WorkerCount);
    fn set_queue_capacity(&mut self, capacity: QueueCapacity);

    /// Compiles this description into a runtime consumer node.
    /// `downstream` is `Some` for a transform (the already-built next
    /// stage) and `None` for a loader (nothing downstream of it).
    fn build(self: Box<Self>, downstream: Option<Arc<dyn RuntimeConsumer>>) -> Arc<dyn RuntimeConsumer>;
}

/// A producer-side stage description.
pub trait ProducerStage: Send + Sync {
    fn set_name(&mut self, name: String);
    fn set_threads(&mut self, workers: WorkerCount);

    /// Compiles this description into a runtime producer node that
    /// feeds `downstream`.
    fn build(self: Box<Self>, downstream: Arc<dyn RuntimeConsumer>) -> Arc<dyn RuntimeProducer>;
}

/// Describes an extractor stage: the head of a chain.
pub struct ExtractStage<T: ViewType> {
    name: String,
    workers: WorkerCount,
    extractor: Box<dyn Extractor<T>>,
}

impl<T: ViewType> ExtractStage<T> {
    pub fn new(extractor: impl Extractor<T> + 'static) -> Self {
        Self::from_boxed(Box::new(extractor))
    }

    /// Builds directly from an already-boxed extractor. Used by
    /// [`crate::chain::extract_many`], which collects its callers'
    /// extractors into `Box<dyn Extractor<T>>` before describing each
    /// as its own stage.
    pub fn from_boxed(extractor: Box<dyn Extractor<T>>) -> Self {
        Self {
            name: "extract".to_string(),
            workers: WorkerCount::default(),
            extractor,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_threads(mut self, workers: usize) -> Result<Self, EtlError> {
        self.workers = WorkerCount::new(workers)?;
        Ok(self)
    }
}

impl<T: ViewType> ProducerStage for ExtractStage<T> {
    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn set_threads(&mut self, workers: WorkerCount) {
        self.workers = workers;
    }

    fn build(self: Box<Self>, downstream: Arc<dyn RuntimeConsumer>) -> Arc<dyn RuntimeProducer> {
        Arc::new(ExtractorPullProducer::new(
            self.name,
            self.extractor,
            self.workers,
            downstream,
        ))
    }
}

/// Describes a transform stage.
pub struct TransformStage<I: ViewType, O: ViewType> {
    name: String,
    workers: WorkerCount,
    queue_capacity: QueueCapacity,
    renderer: ErrorRenderer<I>,
    transformer: Box<dyn Transformer<I, O>>,
}

impl<I: ViewType, O: ViewType> TransformStage<I, O> {
    pub fn new(transformer: impl Transformer<I, O> + 'static) -> Self {
        Self {
            name: "transform".to_string(),
            workers: WorkerCount::default(),
            queue_capacity: QueueCapacity::default(),
            renderer: default_renderer(),
            transformer: Box::new(transformer),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_threads(mut self, workers: usize) -> Result<Self, EtlError> {
        self.workers = WorkerCount::new(workers)?;
        Ok(self)
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Result<Self, EtlError> {
        self.queue_capacity = QueueCapacity::new(capacity)?;
        Ok(self)
    }

    pub fn with_logger(mut self, renderer: impl Fn(&I) -> String + Send + Sync + 'static) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }
}

impl<I: ViewType, O: ViewType> ConsumerStage for TransformStage<I, O> {
    fn is_loader(&self) -> bool {
        false
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn set_threads(&mut self, workers: WorkerCount) {
        self.workers = workers;
    }

    fn set_queue_capacity(&mut self, capacity: QueueCapacity) {
        self.queue_capacity = capacity;
    }

    fn build(self: Box<Self>, downstream: Option<Arc<dyn RuntimeConsumer>>) -> Arc<dyn RuntimeConsumer> {
        let downstream = downstream.expect("transform stage always has a downstream");
        let error_sink = ErrorSink::new(self.name.clone(), self.renderer);
        let leaf: Arc<dyn RuntimeConsumer> = Arc::new(TransformerFanout::new(self.transformer, downstream, error_sink));
        let dispatch: Arc<dyn RuntimeConsumer> = Arc::new(ExecutorDispatch::new(
            Executor::pooled(&self.name, self.workers, self.queue_capacity),
            leaf,
        ));
        let metrics: Arc<dyn RuntimeConsumer> = Arc::new(MetricsEmission::new(self.name, dispatch));
        Arc::new(SmartOpenClose::new(metrics))
    }
}

/// Describes a load (terminal) stage.
pub struct LoadStage<T: ViewType> {
    name: String,
    workers: WorkerCount,
    queue_capacity: QueueCapacity,
    renderer: ErrorRenderer<T>,
    loader: Box<dyn Loader<T>>,
}

impl<T: ViewType> LoadStage<T> {
    pub fn new(loader: impl Loader<T> + 'static) -> Self {
        Self {
            name: "load".to_string(),
            workers: WorkerCount::default(),
            queue_capacity: QueueCapacity::default(),
            renderer: default_renderer(),
            loader: Box::new(loader),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_threads(mut self, workers: usize) -> Result<Self, EtlError> {
        self.workers = WorkerCount::new(workers)?;
        Ok(self)
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Result<Self, EtlError> {
        self.queue_capacity = QueueCapacity::new(capacity)?;
        Ok(self)
    }

    pub fn with_logger(mut self, renderer: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }
}

impl<T: ViewType> ConsumerStage for LoadStage<T> {
    fn is_loader(&self) -> bool {
        true
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn set_threads(&mut self, workers: WorkerCount) {
        self.workers = workers;
    }

    fn set_queue_capacity(&mut self, capacity: QueueCapacity) {
        self.queue_capacity = capacity;
    }

    fn build(self: Box<Self>, downstream: Option<Arc<dyn RuntimeConsumer>>) -> Arc<dyn RuntimeConsumer> {
        debug_assert!(downstream.is_none(), "a loader is always the tail of a chain");
        let error_sink = ErrorSink::new(self.name.clone(), self.renderer);
        let leaf: Arc<dyn RuntimeConsumer> = Arc::new(LoaderLeaf::new(self.loader, error_sink));
        let dispatch: Arc<dyn RuntimeConsumer> = Arc::new(ExecutorDispatch::new(
            Executor::pooled(&self.name, self.workers, self.queue_capacity),
            leaf,
        ));
        let metrics: Arc<dyn RuntimeConsumer> = Arc::new(MetricsEmission::new(self.name, dispatch));
        Arc::new(SmartOpenClose::new(metrics))
    }
}

/// Wraps a user transformer in its default stage description.
pub fn transform<I: ViewType, O: ViewType>(transformer: impl Transformer<I, O> + 'static) -> TransformStage<I, O> {
    TransformStage::new(transformer)
}

/// Wraps a user loader in its default stage description.
pub fn load<T: ViewType>(loader: impl Loader<T> + 'static) -> LoadStage<T> {
    LoadStage::new(loader)
}
