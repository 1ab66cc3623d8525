//! Property-based tests for the lock-free queue
//!
//! These verify the queue's invariants over generated operation sequences:
//! FIFO ordering, conservation of elements, and size accounting.

use super::LockFreeQueue;
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;

proptest! {
    #[test]
    fn fifo_ordering_single_thread(values in prop::collection::vec(any::<i32>(), 0..200)) {
        let queue = LockFreeQueue::new();

        for &value in &values {
            queue.push(value);
        }
        for &expected in &values {
            prop_assert_eq!(queue.pop(), Some(expected));
        }
        prop_assert_eq!(queue.pop(), None);
        prop_assert!(queue.is_empty());
    }

    #[test]
    fn size_tracks_push_pop_balance(
        operations in prop::collection::vec(prop::bool::weighted(0.6), 1..200)
    ) {
        let queue = LockFreeQueue::new();
        let mut expected_len = 0usize;
        let mut counter = 0;

        for &should_push in &operations {
            if should_push {
                queue.push(counter);
                counter += 1;
                expected_len += 1;
            } else if queue.pop().is_some() {
                expected_len -= 1;
            }
            prop_assert_eq!(queue.approximate_size(), expected_len);
            prop_assert_eq!(queue.is_empty(), expected_len == 0);
        }
    }

    #[test]
    fn concurrent_conservation(
        num_producers in 2usize..5,
        items_per_producer in 10usize..100,
    ) {
        let queue = Arc::new(LockFreeQueue::new());
        let mut handles = Vec::new();

        for producer_id in 0..num_producers {
            let queue = Arc::clone(&queue);
            handles.push(thread::spawn(move || {
                for i in 0..items_per_producer {
                    queue.push(producer_id * items_per_producer + i);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Every pushed value comes out exactly once.
        let mut drained = Vec::new();
        while let Some(value) = queue.pop() {
            drained.push(value);
        }
        drained.sort_unstable();
        let expected: Vec<usize> = (0..num_producers * items_per_producer).collect();
        prop_assert_eq!(drained, expected);
    }
}
