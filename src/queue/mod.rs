//! Queue implementations
//!
//! This module provides the unbounded lock-free FIFO queue used both directly
//! and as the task channel of the [thread pool](crate::pool).
//!
//! ## Available Queues
//!
//! - [`LockFreeQueue`]: Multi-producer, multi-consumer unbounded queue
//!
//! ## Characteristics
//!
//! - **Lock-free**: push and pop are non-blocking atomic operations
//! - **Unbounded**: nodes are heap-allocated per element
//! - **Reclamation**: retired nodes are freed through epoch-based reclamation
//!
//! ## Examples
//!
//! ```rust
//! use rapids::queue::LockFreeQueue;
//!
//! let queue = LockFreeQueue::new();
//! queue.push("hello");
//! assert_eq!(queue.pop(), Some("hello"));
//! assert!(queue.is_empty());
//! ```

pub mod unbounded;

#[cfg(test)]
mod proptests;

pub use unbounded::LockFreeQueue;
