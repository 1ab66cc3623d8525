//! Integration tests for Rapids
//!
//! End-to-end scenarios exercising the queue, map, and pool through their
//! public APIs, alone and in combination.

use rapids::{ConcurrentHashMap, Error, InsertOutcome, LockFreeQueue, ThreadPool};
use rand::Rng;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_single_threaded_fifo() {
    let queue = LockFreeQueue::new();

    for i in 0..100 {
        queue.push(i);
    }
    for i in 0..100 {
        assert_eq!(queue.pop(), Some(i));
    }
    assert_eq!(queue.pop(), None);
    assert!(queue.is_empty());
}

#[test]
fn test_map_update_and_erase_roundtrip() {
    let map = ConcurrentHashMap::new();

    assert_eq!(map.insert(1, 100), InsertOutcome::Inserted);
    assert_eq!(map.insert(1, 200), InsertOutcome::Updated);
    assert_eq!(map.get(&1), Some(200));
    assert_eq!(map.len(), 1);

    assert!(map.erase(&1));
    assert!(!map.contains(&1));
    assert!(!map.erase(&1));
    assert!(map.is_empty());
}

#[test]
fn test_multi_producer_consumption_order() {
    const PRODUCERS: usize = 8;
    const ITEMS: usize = 1000;

    let queue = Arc::new(LockFreeQueue::new());
    let barrier = Arc::new(Barrier::new(PRODUCERS));

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|t| {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for value in t * 1000..t * 1000 + ITEMS {
                    queue.push(value);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut consumed = Vec::with_capacity(PRODUCERS * ITEMS);
    while let Some(value) = queue.pop() {
        consumed.push(value);
    }

    // Per producer, values appear in ascending order.
    for t in 0..PRODUCERS {
        let per_producer: Vec<_> = consumed.iter().filter(|v| **v / 1000 == t).collect();
        assert_eq!(per_producer.len(), ITEMS);
        assert!(per_producer.windows(2).all(|w| w[0] < w[1]));
    }

    // The multiset of results is exactly {0..7999}.
    let mut sorted = consumed;
    sorted.sort_unstable();
    assert_eq!(sorted, (0..PRODUCERS * ITEMS).collect::<Vec<_>>());
}

#[test]
fn test_pool_computes_closures() {
    let pool = ThreadPool::new(4);

    let handles: Vec<_> = (0..1000)
        .map(|i| pool.submit(move || i * 2).unwrap())
        .collect();

    pool.wait();

    let mut sum = 0usize;
    for (i, handle) in handles.into_iter().enumerate() {
        assert!(handle.is_finished());
        let value = handle.wait().unwrap();
        assert_eq!(value, 2 * i);
        sum += value;
    }
    assert_eq!(sum, 2 * 499_500);
}

#[test]
fn test_pool_failure_recovery() {
    let pool = ThreadPool::new(2);

    let failing = pool
        .submit(|| -> u32 { panic!("integration failure") })
        .unwrap();
    assert_eq!(
        failing.wait(),
        Err(Error::TaskPanicked("integration failure".to_string()))
    );

    let ok = pool.submit(|| 42).unwrap();
    assert_eq!(ok.wait(), Ok(42));
}

#[test]
fn test_concurrent_map_stress() {
    const WRITERS: usize = 8;
    const READERS: usize = 8;
    const KEYS_PER_WRITER: usize = 1000;

    let map = Arc::new(ConcurrentHashMap::new());
    let barrier = Arc::new(Barrier::new(WRITERS + READERS));
    let mut handles = Vec::new();

    for writer_id in 0..WRITERS {
        let map = Arc::clone(&map);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for k in writer_id * KEYS_PER_WRITER..(writer_id + 1) * KEYS_PER_WRITER {
                map.insert(k, k * 2);
            }
        }));
    }

    for _ in 0..READERS {
        let map = Arc::clone(&map);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            let mut rng = rand::thread_rng();
            for _ in 0..KEYS_PER_WRITER {
                let k = rng.gen_range(0..WRITERS * KEYS_PER_WRITER);
                if let Some(value) = map.get(&k) {
                    assert_eq!(value, k * 2);
                }
                let _ = map.contains(&k);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(map.len(), WRITERS * KEYS_PER_WRITER);
    for k in 0..WRITERS * KEYS_PER_WRITER {
        assert_eq!(map.get(&k), Some(k * 2));
    }
}

#[test]
fn test_pipeline_pool_feeds_map() {
    // Jobs computed on the pool publish their results into the shared map;
    // after the drain barrier every result must be visible.
    let pool = ThreadPool::new(4);
    let map = Arc::new(ConcurrentHashMap::new());

    for i in 0..1000usize {
        let map = Arc::clone(&map);
        pool.submit(move || {
            map.insert(i, i * i);
        })
        .unwrap();
    }

    pool.wait();

    assert_eq!(map.len(), 1000);
    for i in 0..1000 {
        assert_eq!(map.get(&i), Some(i * i));
    }
}

#[test]
fn test_mixed_structures_under_contention() {
    let queue = Arc::new(LockFreeQueue::new());
    let map = Arc::new(ConcurrentHashMap::new());

    let num_threads = 4;
    let operations_per_thread = 2000;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let queue = Arc::clone(&queue);
            let map = Arc::clone(&map);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..operations_per_thread {
                    let value = thread_id * operations_per_thread + i;
                    match i % 3 {
                        0 => {
                            queue.push(value);
                            let _ = queue.pop();
                        }
                        1 => {
                            map.insert(value, value);
                            assert_eq!(map.get(&value), Some(value));
                        }
                        _ => {
                            map.insert(value, value);
                            assert!(map.erase(&value));
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    while queue.pop().is_some() {}
    assert!(queue.is_empty());

    // Keys from the insert-only branch stay; the insert-erase branch leaves
    // nothing behind.
    let live = (0..num_threads * operations_per_thread)
        .filter(|v| map.contains(v))
        .count();
    assert_eq!(map.len(), live);
}
