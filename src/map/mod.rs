//! Map implementations
//!
//! This module provides the concurrent hash map.
//!
//! ## Available Maps
//!
//! - [`ConcurrentHashMap`]: lock-free reads over per-bucket entry chains,
//!   with writers serialized per bucket
//!
//! ## Choosing parameters
//!
//! - The bucket array is fixed at construction (default 1024); there is no
//!   resizing, so size the table for the expected key population
//! - Hash distribution is the caller's concern; chains grow with collisions

pub mod concurrent;


pub use concurrent::{ConcurrentHashMap, InsertOutcome};
