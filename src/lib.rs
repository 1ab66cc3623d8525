//! # Rapids
//!
//! A small library of lock-free data structures for high-throughput
//! multi-producer/multi-consumer workloads.
//!
//! ## 🚀 Features
//!
//! - **Lock-Free Queue**: Unbounded MPMC FIFO queue with epoch-based memory reclamation
//! - **Concurrent HashMap**: Lock-free reads with per-bucket serialized writers and
//!   atomically replaceable values
//! - **Thread Pool**: Fixed worker pool pulling jobs from the lock-free queue, with
//!   one-shot result handles and panic capture
//!
//! ## 🎯 Philosophy
//!
//! Rapids focuses on providing:
//! - Non-blocking reads everywhere; no lock on any queue or map fast path
//! - Explicit memory ordering on every atomic publication and consumption
//! - Safe reclamation of shared nodes through `crossbeam-epoch`
//! - Small, predictable APIs that transfer ownership through the structure
//!
//! ## ⚡ Quick Start
//!
//! ```rust
//! use rapids::{LockFreeQueue, ConcurrentHashMap, ThreadPool};
//!
//! let queue = LockFreeQueue::new();
//! queue.push(42);
//! assert_eq!(queue.pop(), Some(42));
//!
//! let map = ConcurrentHashMap::new();
//! map.insert("answer", 42);
//! assert_eq!(map.get(&"answer"), Some(42));
//!
//! let pool = ThreadPool::new(4);
//! let handle = pool.submit(|| 6 * 7).unwrap();
//! assert_eq!(handle.wait().unwrap(), 42);
//! ```
//!
//! ## 🔒 Thread Safety
//!
//! All structures are safe to share across threads behind an `Arc` (or a
//! reference with a scoped thread API). Queue and map operations never block
//! on peer threads; the pool blocks only where documented (result-handle
//! wait, `ThreadPool::wait`, and the workers' bounded idle wait).

pub mod map;
pub mod pool;
pub mod queue;

pub use crate::map::{ConcurrentHashMap, InsertOutcome};
pub use crate::pool::{JobHandle, PoolMetrics, ThreadPool};
pub use crate::queue::LockFreeQueue;

/// Error type for Rapids operations.
///
/// Empty dequeues and absent keys are ordinary `None`/`false` results, not
/// errors; this enum covers the failures that actually carry information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The pool has begun shutting down and no longer accepts submissions.
    Closed,
    /// A submitted job panicked; the captured message is surfaced at
    /// [`JobHandle::wait`].
    TaskPanicked(String),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Closed => write!(f, "thread pool is shutting down"),
            Error::TaskPanicked(msg) => write!(f, "job panicked: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Result type for Rapids operations.
pub type Result<T> = core::result::Result<T, Error>;
