//! # Worker Pool / Executor
//!
//! Every consumer-side stage runs behind one of two executor strategies:
//! a [`BlockingPool`] of named worker threads pulling jobs off a bounded
//! `crossbeam-channel`, or [`Executor::Immediate`], which runs a job
//! inline on the calling thread with no queue at all. The bounded
//! channel is the backpressure mechanism: a producer that outruns its
//! consumers blocks on `send` until a worker frees a slot, exactly the
//! "caller blocks" behavior the concurrency model calls for.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender};
use parking_lot::{Condvar, Mutex};
use pocketetl_domain::value_objects::{QueueCapacity, WorkerCount};

/// A unit of work submitted to a [`BlockingPool`]: a boxed closure run
/// on whichever worker thread picks it up next.
type Job = Box<dyn FnOnce() + Send + 'static>;

/// How a stage's consumer chain actually runs its work.
pub enum Executor {
    /// Runs every job on the calling thread, synchronously, with no
    /// queue. Matches a stage described with a single worker and no
    /// queue capacity override: there's nothing a pool would buy over
    /// calling straight through.
    Immediate,

    /// Dispatches jobs to a fixed-size pool of named worker threads
    /// behind a bounded queue.
    Pooled(BlockingPool),
}

impl Executor {
    /// Builds a pooled executor with `workers` threads and a queue
    /// bounded at `queue_capacity`, the threads named `{name}-{n}` for
    /// debugging and panic messages.
    pub fn pooled(name: &str, workers: WorkerCount, queue_capacity: QueueCapacity) -> Self {
        Executor::Pooled(BlockingPool::new(name, workers, queue_capacity))
    }

    /// Runs `job` per this executor's strategy. For `Immediate`, runs
    /// synchronously on the calling thread; for `Pooled`, blocks the
    /// calling thread until a worker slot is free, then returns as soon
    /// as the job is queued (not once it completes).
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        match self {
            Executor::Immediate => job(),
            Executor::Pooled(pool) => pool.submit(job),
        }
    }

    /// Blocks until every job already submitted has finished running.
    /// A no-op for `Immediate`, since `submit` already ran the job
    /// synchronously.
    pub fn drain(&self) {
        if let Executor::Pooled(pool) = self {
            pool.drain();
        }
    }
}

/// A fixed-size pool of worker threads behind a bounded job queue.
///
/// Shutdown is idempotent by construction: dropping the one `Sender`
/// closes the channel, every worker's `recv` loop ends, and `join`
/// returns. `BlockingPool` doesn't need an explicit "stop" flag for
/// that reason; `drain()` below is for waiting on in-flight jobs
/// without tearing the pool down.
pub struct BlockingPool {
    sender: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    // Tracks jobs that have been queued but not yet finished running,
    // so `drain` can wait for true completion rather than just dequeue.
    in_flight: Arc<(Mutex<usize>, Condvar)>,
}

impl BlockingPool {
    pub fn new(name: &str, workers: WorkerCount, queue_capacity: QueueCapacity) -> Self {
        let (sender, receiver) = bounded::<Job>(queue_capacity.get());
        let in_flight = Arc::new((Mutex::new(0usize), Condvar::new()));

        let handles = (0..workers.get())
            .map(|index| {
                let receiver = receiver.clone();
                let in_flight = Arc::clone(&in_flight);
                std::thread::Builder::new()
                    .name(format!("{name}-{index}"))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            job();
                            let (count, condvar) = &*in_flight;
                            let mut count = count.lock();
                            *count -= 1;
                            if *count == 0 {
                                condvar.notify_all();
                            }
                        }
                    })
                    .expect("failed to spawn pipeline worker thread")
            })
            .collect();

        Self {
            sender,
            workers: handles,
            in_flight,
        }
    }

    /// Queues `job`, blocking the calling thread while the bounded
    /// channel is full.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        *self.in_flight.0.lock() += 1;
        // A closed receiver only happens once every worker thread has
        // already been told to stop, which this pool never does on its
        // own — surfacing as a panic here would mean a caller is
        // submitting after `drain`-then-drop, which is a programming
        // error in the runtime itself, not a record-level failure.
        self.sender
            .send(Box::new(job))
            .expect("submitted work to a pool whose workers have already stopped");
    }

    /// Blocks until every job submitted so far has finished running.
    pub fn drain(&self) {
        let (count, condvar) = &*self.in_flight;
        let mut guard = count.lock();
        condvar.wait_while(&mut guard, |count| *count > 0);
    }
}

impl Drop for BlockingPool {
    fn drop(&mut self) {
        // Replacing the sender with one whose matching receiver is
        // already gone closes the channel: every worker's `recv` loop
        // ends and the thread returns.
        let (closed_sender, _) = bounded::<Job>(0);
        self.sender = closed_sender;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn immediate_executor_runs_inline() {
        let executor = Executor::Immediate;
        let ran = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&ran);
        executor.submit(move || {
            flag.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pooled_executor_runs_every_job() {
        let executor = Executor::pooled(
            "test-pool",
            WorkerCount::new(3).unwrap(),
            QueueCapacity::new(8).unwrap(),
        );
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            executor.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        executor.drain();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn drain_waits_for_in_flight_work() {
        let pool = BlockingPool::new("drain-test", WorkerCount::new(2).unwrap(), QueueCapacity::new(4).unwrap());
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                std::thread::yield_now();
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.drain();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }
}
