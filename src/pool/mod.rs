//! Thread pool
//!
//! A fixed-size pool of worker threads pulling jobs from the crate's
//! [lock-free queue](crate::queue). Submitting a job returns a one-shot
//! [`JobHandle`] that delivers the job's value, or the panic it raised, to
//! the submitter.
//!
//! ## Lifecycle
//!
//! Running → Draining → Stopped. Dropping the pool drains every submitted
//! job (helping on the calling thread), signals the workers to exit, and
//! joins them; jobs are never silently discarded.
//!
//! ## Example
//!
//! ```rust
//! use rapids::pool::ThreadPool;
//!
//! let pool = ThreadPool::new(4);
//! let handles: Vec<_> = (0..8)
//!     .map(|i| pool.submit(move || i * i).unwrap())
//!     .collect();
//!
//! let sum: i32 = handles.into_iter().map(|h| h.wait().unwrap()).sum();
//! assert_eq!(sum, 140);
//! ```

pub mod handle;
pub mod thread_pool;

pub use handle::JobHandle;
pub use thread_pool::{PoolMetrics, ThreadPool};
