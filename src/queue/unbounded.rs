//! Unbounded MPMC Queue
//!
//! A lock-free multi-producer, multi-consumer FIFO queue built as a
//! singly-linked list with a dummy head node, in the Michael–Scott style.
//!
//! ## Design
//!
//! The queue always contains at least one node. The head node is a dummy:
//! its payload has already been handed out (or never existed), and the
//! logically-first element lives in `head.next`. Producers append by
//! atomically exchanging the tail pointer with a freshly allocated node and
//! then publishing the previous tail's `next` link. Consumers advance the
//! head pointer by compare-and-swap and move the payload out of the node
//! that just became the new dummy.
//!
//! ## Memory Ordering
//!
//! ```text
//! Producer (push)                    Consumer (pop)
//! ---------------                    --------------
//! tail.swap(new)       (AcqRel)      head.load            (Acquire)
//! prev.next.store(new) (Release) --> head.next.load       (Acquire)
//!                                    head CAS -> next     (AcqRel / Acquire)
//! ```
//!
//! The release store of `prev.next` pairs with the consumer's acquire load,
//! making the payload visible before the node is reachable. The CAS on head
//! serializes consumers; a failed CAS retries against a fresh head.
//!
//! ## Memory Reclamation
//!
//! A dequeued node cannot be freed immediately: a producer that read the old
//! tail may still write its `next` link, and another consumer may still be
//! mid-retry on the same head. Nodes are therefore retired through
//! epoch-based reclamation (`crossbeam-epoch`): every operation pins the
//! current epoch, and a retired node is only freed once no pinned thread can
//! still reach it. Steady-state memory stays bounded as epochs turn over.

use core::mem::MaybeUninit;
use core::sync::atomic::Ordering;

use crossbeam_epoch::{self as epoch, Atomic, Owned};
use crossbeam_utils::{Backoff, CachePadded};

/// A node in the queue's linked list.
///
/// The payload is `MaybeUninit` because the dummy head's slot is always
/// logically dead: either it was moved out by the consumer that advanced
/// head past this node, or the node was created as the initial dummy.
struct Node<T> {
    value: MaybeUninit<T>,
    next: Atomic<Node<T>>,
}

/// An unbounded multi-producer, multi-consumer lock-free FIFO queue.
///
/// Elements are owned by the queue once pushed and transferred back out on a
/// successful pop. Insertion order is preserved: values pushed by one
/// producer are popped in that producer's order, and a push that
/// happens-before another push is dequeued first.
///
/// Head and tail pointers live on their own cache lines to avoid false
/// sharing between producers and consumers.
///
/// # Examples
///
/// ```rust
/// use rapids::queue::LockFreeQueue;
/// use std::sync::Arc;
/// use std::thread;
///
/// let queue = Arc::new(LockFreeQueue::new());
///
/// let producer = thread::spawn({
///     let queue = Arc::clone(&queue);
///     move || {
///         for i in 0..100 {
///             queue.push(i);
///         }
///     }
/// });
///
/// let consumer = thread::spawn({
///     let queue = Arc::clone(&queue);
///     move || {
///         let mut sum = 0u64;
///         let mut received = 0;
///         while received < 100 {
///             if let Some(value) = queue.pop() {
///                 sum += value;
///                 received += 1;
///             }
///         }
///         sum
///     }
/// });
///
/// producer.join().unwrap();
/// assert_eq!(consumer.join().unwrap(), 4950);
/// ```
pub struct LockFreeQueue<T> {
    /// Points at the current dummy node. `head.next` is the first element.
    head: CachePadded<Atomic<Node<T>>>,
    /// Points at the most recently published node.
    tail: CachePadded<Atomic<Node<T>>>,
}

unsafe impl<T: Send> Send for LockFreeQueue<T> {}
unsafe impl<T: Send> Sync for LockFreeQueue<T> {}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LockFreeQueue<T> {
    /// Create a new, empty queue.
    ///
    /// Allocates the initial dummy node shared by head and tail.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rapids::queue::LockFreeQueue;
    ///
    /// let queue: LockFreeQueue<i32> = LockFreeQueue::new();
    /// assert!(queue.is_empty());
    /// ```
    pub fn new() -> Self {
        let dummy = Owned::new(Node {
            value: MaybeUninit::uninit(),
            next: Atomic::null(),
        });
        let guard = unsafe { epoch::unprotected() };
        let dummy = dummy.into_shared(guard);

        Self {
            head: CachePadded::new(Atomic::from(dummy)),
            tail: CachePadded::new(Atomic::from(dummy)),
        }
    }

    /// Push a value onto the back of the queue.
    ///
    /// This operation is lock-free and never fails. The value becomes
    /// visible to consumers once the previous tail's `next` link is
    /// published with release ordering.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rapids::queue::LockFreeQueue;
    ///
    /// let queue = LockFreeQueue::new();
    /// queue.push(42);
    /// assert!(!queue.is_empty());
    /// ```
    pub fn push(&self, value: T) {
        let guard = epoch::pin();

        let node = Owned::new(Node {
            value: MaybeUninit::new(value),
            next: Atomic::null(),
        })
        .into_shared(&guard);

        // Claim a position in the chain, then link the previous tail to us.
        // Between the swap and the store the new node is unreachable from
        // head; consumers simply observe the queue as shorter until the link
        // is published.
        let prev = self.tail.swap(node, Ordering::AcqRel, &guard);
        unsafe {
            prev.deref().next.store(node, Ordering::Release);
        }
    }

    /// Pop the value at the front of the queue.
    ///
    /// Returns `None` if the queue was empty at the linearization point
    /// (the acquire load that observed `head.next == null`). Empty is a
    /// success, not an error.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rapids::queue::LockFreeQueue;
    ///
    /// let queue = LockFreeQueue::new();
    /// queue.push(1);
    /// assert_eq!(queue.pop(), Some(1));
    /// assert_eq!(queue.pop(), None);
    /// ```
    pub fn pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        let guard = epoch::pin();

        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            let next = unsafe { head.deref() }.next.load(Ordering::Acquire, &guard);

            let next_ref = unsafe { next.as_ref() }?;

            match self.head.compare_exchange_weak(
                head,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
                &guard,
            ) {
                Ok(_) => {
                    // We own the successor now; move its payload out and let
                    // it serve as the new dummy. The old dummy is retired and
                    // freed once no pinned thread can still reach it.
                    let value = unsafe { next_ref.value.assume_init_read() };
                    unsafe {
                        guard.defer_destroy(head);
                    }
                    return Some(value);
                }
                Err(_) => backoff.snooze(),
            }
        }
    }

    /// Check whether the queue is empty.
    ///
    /// This is a snapshot and may be stale by the time the caller acts on
    /// it.
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        let head = self.head.load(Ordering::Acquire, &guard);
        unsafe { head.deref() }
            .next
            .load(Ordering::Acquire, &guard)
            .is_null()
    }

    /// Count the elements currently in the queue.
    ///
    /// This walks the whole chain (O(n)) and is best-effort: concurrent
    /// pushes and pops can make the result stale before it is returned, and
    /// a node mid-publication may or may not be counted.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rapids::queue::LockFreeQueue;
    ///
    /// let queue = LockFreeQueue::new();
    /// queue.push(1);
    /// queue.push(2);
    /// assert_eq!(queue.approximate_size(), 2);
    /// ```
    pub fn approximate_size(&self) -> usize {
        let guard = epoch::pin();
        let head = self.head.load(Ordering::Acquire, &guard);

        let mut count = 0;
        let mut current = unsafe { head.deref() }.next.load(Ordering::Acquire, &guard);
        while let Some(node) = unsafe { current.as_ref() } {
            count += 1;
            current = node.next.load(Ordering::Acquire, &guard);
        }
        count
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        // Exclusive access: walk the chain, dropping every undelivered
        // payload and freeing every node. The dummy head's payload slot is
        // dead and must be skipped.
        unsafe {
            let guard = epoch::unprotected();
            let mut current = self.head.load(Ordering::Relaxed, guard);
            let mut is_dummy = true;

            while !current.is_null() {
                let next = current.deref().next.load(Ordering::Relaxed, guard);
                let mut node = current.into_owned();
                if !is_dummy {
                    node.value.assume_init_drop();
                }
                drop(node);
                is_dummy = false;
                current = next;
            }
        }
    }
}

impl<T> core::fmt::Debug for LockFreeQueue<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LockFreeQueue").finish_non_exhaustive()
    }
}
