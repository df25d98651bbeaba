//! # `SmartOpenClose`
//!
//! A combined (fan-in) producer hands the same downstream consumer to
//! N upstream producers, each of which independently calls `open` and
//! `close` on what it believes is its own consumer. This wrapper turns
//! that into exactly one real open and one real close on the wrapped
//! consumer by tracking an atomic reference count: the first `open`
//! opens it for real, later ones just increment; a `close` that brings
//! the count back to zero closes it for real. More closes than opens
//! is a misuse error, never a panic — a badly-behaved caller shouldn't
//! be able to bring down a pipeline that would otherwise finish
//! draining cleanly.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use pocketetl_domain::envelope::Envelope;
use pocketetl_domain::{EtlError, MetricsSink};

use super::runtime_consumer::RuntimeConsumer;

pub struct SmartOpenClose {
    inner: Arc<dyn RuntimeConsumer>,
    refcount: AtomicI64,
}

impl SmartOpenClose {
    pub fn new(inner: Arc<dyn RuntimeConsumer>) -> Self {
        Self {
            inner,
            refcount: AtomicI64::new(0),
        }
    }
}

impl RuntimeConsumer for SmartOpenClose {
    fn open(&self, metrics: Arc<dyn MetricsSink>) -> Result<(), EtlError> {
        if self.refcount.fetch_add(1, Ordering::AcqRel) == 0 {
            self.inner.open(metrics)?;
        }
        Ok(())
    }

    fn consume(&self, envelope: Envelope) -> Result<(), EtlError> {
        self.inner.consume(envelope)
    }

    fn close(&self) -> Result<(), EtlError> {
        let previous = self.refcount.fetch_sub(1, Ordering::AcqRel);
        if previous <= 0 {
            // Restore the count so a caller that keeps going (logging
            // this and continuing) doesn't dig the counter deeper into
            // negative territory with every further mistaken close.
            self.refcount.fetch_add(1, Ordering::AcqRel);
            return Err(EtlError::misuse(
                "consumer closed more times than it was opened",
            ));
        }
        if previous == 1 {
            self.inner.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pocketetl_domain::NoopMetrics;
    use std::sync::atomic::AtomicUsize;

    struct CountingConsumer {
        opens: AtomicUsize,
        closes: AtomicUsize,
    }

    impl RuntimeConsumer for CountingConsumer {
        fn open(&self, _metrics: Arc<dyn MetricsSink>) -> Result<(), EtlError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn consume(&self, _envelope: Envelope) -> Result<(), EtlError> {
            Ok(())
        }
        fn close(&self) -> Result<(), EtlError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn collapses_n_opens_and_closes_into_one() {
        let inner = Arc::new(CountingConsumer {
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        });
        let smart = SmartOpenClose::new(inner.clone());
        let metrics: Arc<dyn MetricsSink> = Arc::new(NoopMetrics);

        for _ in 0..3 {
            smart.open(metrics.clone()).unwrap();
        }
        assert_eq!(inner.opens.load(Ordering::SeqCst), 1);

        smart.close().unwrap();
        smart.close().unwrap();
        assert_eq!(inner.closes.load(Ordering::SeqCst), 0);
        smart.close().unwrap();
        assert_eq!(inner.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn excess_close_is_misuse() {
        let inner = Arc::new(CountingConsumer {
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        });
        let smart = SmartOpenClose::new(inner);
        let metrics: Arc<dyn MetricsSink> = Arc::new(NoopMetrics);
        smart.open(metrics).unwrap();
        smart.close().unwrap();
        let err = smart.close().unwrap_err();
        assert!(err.is_misuse());
    }
}
