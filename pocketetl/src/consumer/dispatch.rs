//! # `ExecutorDispatch`
//!
//! Submits each `consume` to the stage's worker pool as a job that
//! calls the wrapped consumer; the submission itself blocks the caller
//! while the pool's queue is full, which is the backpressure mechanism
//! described in the concurrency model. `close` drains the pool (so
//! every submitted job finishes) before closing the wrapped consumer.
//!
//! Since jobs run off-thread, an unrecoverable failure raised inside
//! one can't simply return up through `consume`'s call stack — the
//! call that submitted it already returned once the job was queued.
//! Instead the first unrecoverable failure observed by any worker is
//! latched into [`DispatchState`] and returned by every subsequent
//! `consume` (and by `close`), which is how the producer loop upstream
//! learns to stop pulling.

use std::sync::{Arc, Mutex};

use pocketetl_domain::envelope::Envelope;
use pocketetl_domain::{EtlError, MetricsSink};

use crate::executor::Executor;

use super::runtime_consumer::RuntimeConsumer;

enum DispatchState {
    Open,
    Aborted(EtlError),
    Closed,
}

pub struct ExecutorDispatch {
    executor: Executor,
    inner: Arc<dyn RuntimeConsumer>,
    state: Arc<Mutex<DispatchState>>,
}

impl ExecutorDispatch {
    pub fn new(executor: Executor, inner: Arc<dyn RuntimeConsumer>) -> Self {
        Self {
            executor,
            inner,
            state: Arc::new(Mutex::new(DispatchState::Open)),
        }
    }
}

impl RuntimeConsumer for ExecutorDispatch {
    fn open(&self, metrics: Arc<dyn MetricsSink>) -> Result<(), EtlError> {
        self.inner.open(metrics)
    }

    fn consume(&self, envelope: Envelope) -> Result<(), EtlError> {
        {
            let state = self.state.lock().unwrap();
            match &*state {
                DispatchState::Aborted(error) => return Err(error.clone()),
                DispatchState::Closed => {
                    return Err(EtlError::misuse("consume called on a closed dispatch"))
                }
                DispatchState::Open => {}
            }
        }

        let inner = Arc::clone(&self.inner);
        let state = Arc::clone(&self.state);
        self.executor.submit(move || {
            if let Err(error) = inner.consume(envelope) {
                if error.is_unrecoverable() {
                    let mut state = state.lock().unwrap();
                    if matches!(&*state, DispatchState::Open) {
                        *state = DispatchState::Aborted(error);
                    }
                }
            }
        });
        Ok(())
    }

    fn close(&self) -> Result<(), EtlError> {
        // Drain first so every already-submitted job (including one
        // that might still latch an abort) finishes before we read
        // the final state.
        self.executor.drain();
        let mut state = self.state.lock().unwrap();
        let prior = std::mem::replace(&mut *state, DispatchState::Closed);
        drop(state);

        let close_result = self.inner.close();
        match prior {
            DispatchState::Aborted(error) => Err(error),
            _ => close_result,
        }
    }
}
