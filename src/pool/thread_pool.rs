//! Thread Pool Implementation
//!
//! A fixed set of worker threads consuming type-erased jobs from a shared
//! [`LockFreeQueue`]. Each submission pairs the job with a one-shot result
//! slot; the worker that executes the job fulfills the slot, capturing a
//! panic instead of dying from it.
//!
//! ## Worker loop
//!
//! 1. Try to pop a job; if one was obtained, run it with the active-task
//!    counter bracketed around execution, then loop.
//! 2. Otherwise, wait on the idle condition variable for up to ~100 ms, or
//!    until a submission or the stop flag signals it. The predicate
//!    (`stop || !queue.is_empty()`) is conservative; spurious wakeups are
//!    harmless.
//!
//! ## Shutdown
//!
//! Dropping the pool (1) marks it closed so further submissions fail,
//! (2) drains every pending job via [`ThreadPool::wait`], (3) sets the stop
//! flag with release ordering, (4) broadcasts on the condition variable,
//! and (5) joins every worker. A worker that terminated abnormally has its
//! panic re-raised at join.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::handle::{JobHandle, ResultSlot};
use crate::queue::LockFreeQueue;
use crate::{Error, Result};

/// Upper bound on a worker's idle wait; keeps shutdown signalling live even
/// if a wakeup is missed.
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// A queued unit of work, already bound to its result slot.
type Job = Box<dyn FnOnce() + Send + 'static>;

/// Counters shared with job wrappers.
struct PoolStats {
    executed_tasks: AtomicU64,
    failed_tasks: AtomicU64,
}

/// State shared between the pool front-end and its workers.
struct PoolInner {
    queue: LockFreeQueue<Job>,
    /// Set when shutdown begins; gates `submit`.
    shutting_down: AtomicBool,
    /// Set after the final drain; tells idle workers to exit.
    stop: AtomicBool,
    /// Jobs currently executing.
    active_tasks: AtomicUsize,
    /// Jobs submitted but not yet finished (queued + executing). This is
    /// the drain barrier: `wait` returns only once it reaches zero.
    tasks_in_flight: AtomicUsize,
    stats: Arc<PoolStats>,
    idle_lock: Mutex<()>,
    idle_signal: Condvar,
}

impl PoolInner {
    fn run_job(&self, job: Job) {
        self.active_tasks.fetch_add(1, Ordering::AcqRel);
        job();
        self.active_tasks.fetch_sub(1, Ordering::AcqRel);
        self.tasks_in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        if let Some(job) = inner.queue.pop() {
            inner.run_job(job);
            continue;
        }

        if inner.stop.load(Ordering::Acquire) {
            break;
        }

        let mut idle = inner.idle_lock.lock();
        if inner.stop.load(Ordering::Acquire) || !inner.queue.is_empty() {
            continue;
        }
        let _ = inner.idle_signal.wait_for(&mut idle, IDLE_WAIT);
    }
}

fn panic_message(payload: &(dyn core::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "job panicked".to_string()
    }
}

/// A fixed-size thread pool with result handles.
///
/// Workers pull jobs from a shared lock-free queue. Submitting returns a
/// [`JobHandle`] that yields the job's value, or the panic it raised, when
/// waited on. Dropping the pool drains all pending work before joining the
/// workers, so no submitted job is ever lost.
///
/// # Examples
///
/// ```rust
/// use rapids::pool::ThreadPool;
///
/// let pool = ThreadPool::new(4);
///
/// let handle = pool.submit(|| (0..100).sum::<u32>()).unwrap();
/// assert_eq!(handle.wait().unwrap(), 4950);
///
/// pool.wait();
/// assert_eq!(pool.active_tasks(), 0);
/// assert_eq!(pool.queued_tasks(), 0);
/// ```
pub struct ThreadPool {
    inner: Arc<PoolInner>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl ThreadPool {
    /// Create a pool with `workers` threads.
    ///
    /// A worker count of 0 is coerced to 1.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rapids::pool::ThreadPool;
    ///
    /// let pool = ThreadPool::new(0);
    /// assert_eq!(pool.worker_count(), 1);
    /// ```
    pub fn new(workers: usize) -> Self {
        let worker_count = workers.max(1);

        let inner = Arc::new(PoolInner {
            queue: LockFreeQueue::new(),
            shutting_down: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            active_tasks: AtomicUsize::new(0),
            tasks_in_flight: AtomicUsize::new(0),
            stats: Arc::new(PoolStats {
                executed_tasks: AtomicU64::new(0),
                failed_tasks: AtomicU64::new(0),
            }),
            idle_lock: Mutex::new(()),
            idle_signal: Condvar::new(),
        });

        let workers = (0..worker_count)
            .map(|index| {
                let inner = Arc::clone(&inner);
                thread::Builder::new()
                    .name(format!("rapids-worker-{}", index))
                    .spawn(move || worker_loop(&inner))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { inner, workers }
    }

    /// Submit a job for execution.
    ///
    /// The job is pushed onto the internal queue and one idle worker is
    /// signalled. The returned [`JobHandle`] blocks at
    /// [`wait`](JobHandle::wait) until the job has produced a value or
    /// panicked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] once the pool's shutdown has begun;
    /// submissions are rejected rather than silently dropped.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rapids::pool::ThreadPool;
    ///
    /// let pool = ThreadPool::new(2);
    /// let handle = pool.submit(|| 21 * 2).unwrap();
    /// assert_eq!(handle.wait().unwrap(), 42);
    /// ```
    pub fn submit<F, R>(&self, job: F) -> Result<JobHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        let slot = Arc::new(ResultSlot::new());
        let worker_slot = Arc::clone(&slot);
        let stats = Arc::clone(&self.inner.stats);

        self.inner.tasks_in_flight.fetch_add(1, Ordering::AcqRel);
        self.inner.queue.push(Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(job)).map_err(|payload| {
                stats.failed_tasks.fetch_add(1, Ordering::Relaxed);
                Error::TaskPanicked(panic_message(payload.as_ref()))
            });
            stats.executed_tasks.fetch_add(1, Ordering::Relaxed);
            worker_slot.fulfill(outcome);
        }));

        // Taking the idle lock orders this notify after any in-progress
        // predicate check, so the signal cannot fall into the gap between a
        // worker's check and its wait.
        drop(self.inner.idle_lock.lock());
        self.inner.idle_signal.notify_one();

        Ok(JobHandle::new(slot))
    }

    /// Block until every submitted job has finished.
    ///
    /// Jobs still queued are drained on the calling thread, which
    /// guarantees progress even if all workers are busy. After `wait`
    /// returns, every job submitted before the call has fulfilled its
    /// handle, and both [`active_tasks`](Self::active_tasks) and
    /// [`queued_tasks`](Self::queued_tasks) are observed at zero.
    pub fn wait(&self) {
        loop {
            if let Some(job) = self.inner.queue.pop() {
                self.inner.run_job(job);
            } else if self.inner.tasks_in_flight.load(Ordering::Acquire) == 0 {
                return;
            } else {
                thread::yield_now();
            }
        }
    }

    /// Number of jobs currently executing.
    pub fn active_tasks(&self) -> usize {
        self.inner.active_tasks.load(Ordering::Acquire)
    }

    /// Approximate number of jobs waiting in the queue.
    pub fn queued_tasks(&self) -> usize {
        self.inner.queue.approximate_size()
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Snapshot of the pool's counters.
    ///
    /// Counters are relaxed atomics; the snapshot is consistent only at
    /// quiescence.
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            workers: self.workers.len(),
            active_tasks: self.active_tasks(),
            queued_tasks: self.queued_tasks(),
            executed_tasks: self.inner.stats.executed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.inner.stats.failed_tasks.load(Ordering::Relaxed),
        }
    }
}

impl Default for ThreadPool {
    /// Create a pool with one worker per available CPU.
    fn default() -> Self {
        let workers = thread::available_parallelism().map_or(1, usize::from);
        Self::new(workers)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.inner.shutting_down.store(true, Ordering::Release);
        self.wait();

        self.inner.stop.store(true, Ordering::Release);
        drop(self.inner.idle_lock.lock());
        self.inner.idle_signal.notify_all();

        for worker in self.workers.drain(..) {
            if let Err(payload) = worker.join() {
                // Job panics are captured in the wrapper, so a dead worker
                // means the loop itself failed; surface it.
                if !thread::panicking() {
                    panic::resume_unwind(payload);
                }
            }
        }
    }
}

impl core::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.workers.len())
            .field("active_tasks", &self.active_tasks())
            .finish()
    }
}

/// Point-in-time counters for a [`ThreadPool`].
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Number of worker threads.
    pub workers: usize,
    /// Jobs executing at the snapshot.
    pub active_tasks: usize,
    /// Jobs queued at the snapshot (approximate).
    pub queued_tasks: usize,
    /// Jobs executed since construction, including failed ones.
    pub executed_tasks: u64,
    /// Jobs that panicked.
    pub failed_tasks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_basic_compute() {
        let pool = ThreadPool::new(4);

        let handles: Vec<_> = (0..1000)
            .map(|i| pool.submit(move || i * 2).unwrap())
            .collect();

        let mut sum = 0usize;
        for (i, handle) in handles.into_iter().enumerate() {
            let value = handle.wait().unwrap();
            assert_eq!(value, 2 * i);
            sum += value;
        }
        assert_eq!(sum, 999_000);
    }

    #[test]
    fn test_failure_propagation() {
        let pool = ThreadPool::new(2);

        let failing = pool.submit(|| -> i32 { panic!("deliberate failure") }).unwrap();
        match failing.wait() {
            Err(Error::TaskPanicked(message)) => assert_eq!(message, "deliberate failure"),
            other => panic!("expected captured panic, got {:?}", other),
        }

        // The pool survives a panicking job.
        let ok = pool.submit(|| 42).unwrap();
        assert_eq!(ok.wait().unwrap(), 42);
    }

    #[test]
    fn test_zero_workers_coerced_to_one() {
        let pool = ThreadPool::new(0);
        assert_eq!(pool.worker_count(), 1);

        let handle = pool.submit(|| "still works").unwrap();
        assert_eq!(handle.wait().unwrap(), "still works");
    }

    #[test]
    fn test_wait_is_a_drain_barrier() {
        let pool = ThreadPool::new(4);
        let completed = Arc::new(AtomicUsize::new(0));

        for _ in 0..500 {
            let completed = Arc::clone(&completed);
            pool.submit(move || {
                completed.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }

        pool.wait();
        assert_eq!(completed.load(Ordering::Relaxed), 500);
        assert_eq!(pool.active_tasks(), 0);
        assert_eq!(pool.queued_tasks(), 0);
    }

    #[test]
    fn test_drop_runs_pending_jobs() {
        let completed = Arc::new(AtomicUsize::new(0));
        {
            let pool = ThreadPool::new(2);
            for _ in 0..200 {
                let completed = Arc::clone(&completed);
                pool.submit(move || {
                    completed.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap();
            }
        }
        assert_eq!(completed.load(Ordering::Relaxed), 200);
    }

    #[test]
    fn test_dropped_handle_does_not_block_worker() {
        let pool = ThreadPool::new(1);

        drop(pool.submit(|| 1).unwrap());

        // The single worker must still be able to serve this job.
        let handle = pool.submit(|| 2).unwrap();
        assert_eq!(handle.wait().unwrap(), 2);
    }

    #[test]
    fn test_concurrent_submitters() {
        let pool = Arc::new(ThreadPool::new(4));
        let mut submitters = Vec::new();

        for thread_id in 0..8usize {
            let pool = Arc::clone(&pool);
            submitters.push(thread::spawn(move || {
                let handles: Vec<_> = (0..100)
                    .map(|i| pool.submit(move || thread_id * 100 + i).unwrap())
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.wait().unwrap())
                    .sum::<usize>()
            }));
        }

        let total: usize = submitters.into_iter().map(|s| s.join().unwrap()).sum();
        let expected: usize = (0..800).sum();
        assert_eq!(total, expected);
    }

    #[test]
    fn test_metrics_at_quiescence() {
        let pool = ThreadPool::new(2);

        for i in 0..50 {
            let handle = pool
                .submit(move || {
                    if i % 10 == 0 {
                        panic!("every tenth job fails");
                    }
                })
                .unwrap();
            let _ = handle.wait();
        }
        pool.wait();

        let metrics = pool.metrics();
        assert_eq!(metrics.workers, 2);
        assert_eq!(metrics.active_tasks, 0);
        assert_eq!(metrics.queued_tasks, 0);
        assert_eq!(metrics.executed_tasks, 50);
        assert_eq!(metrics.failed_tasks, 5);
    }

    #[test]
    fn test_default_pool_geometry() {
        let pool = ThreadPool::default();
        assert!(pool.worker_count() >= 1);

        let handle = pool.submit(|| ()).unwrap();
        handle.wait().unwrap();
    }
}
