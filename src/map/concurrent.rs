//! Concurrent HashMap Implementation
//!
//! A concurrent hash map with lock-free reads and per-bucket serialized
//! writers. The table is a fixed array of buckets; each bucket holds a
//! singly-linked chain of entries behind an atomic head pointer.
//!
//! ## Design
//!
//! - Fixed bucket array chosen at construction (default 1024); the bucket
//!   index of a key is `hash(key) % bucket_count`. There is no resizing.
//! - Each bucket is padded to its own cache line and carries a small mutex
//!   taken only by writers. Readers never take it: lookups walk the chain
//!   under an epoch guard with acquire loads.
//! - Every entry stores its key, an atomically swappable value holder, a
//!   forward link, and a tombstone flag. Erase tombstones the entry before
//!   unlinking it, so a reader standing on the entry mid-walk treats it as
//!   absent and keeps walking.
//! - Replacing a value never blocks readers: the holder is swapped
//!   atomically and the previous holder is retired through the epoch
//!   reclamation scheme once no reader can still observe it.
//!
//! Serializing writers per bucket resolves the races a chain-per-bucket map
//! is prone to (two inserts of the same absent key producing duplicate
//! entries, and a mid-chain unlink splicing against a stale predecessor)
//! while leaving the read path entirely non-blocking.
//!
//! ## Memory Ordering
//!
//! - Chain heads, entry links, and value holders are published with
//!   `Release` and consumed with `Acquire`.
//! - The tombstone flag is stored with `Release` (the erase linearization
//!   point) and read with `Acquire`.
//! - The size counter is monotone best-effort and uses `Relaxed`.
//!
//! ## Example
//!
//! ```rust
//! use rapids::map::ConcurrentHashMap;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let map = Arc::new(ConcurrentHashMap::new());
//!
//! let writer = thread::spawn({
//!     let map = Arc::clone(&map);
//!     move || {
//!         for i in 0..1000 {
//!             map.insert(i, i * 2);
//!         }
//!     }
//! });
//!
//! writer.join().unwrap();
//! assert_eq!(map.get(&7), Some(14));
//! assert_eq!(map.len(), 1000);
//! ```

use core::hash::{BuildHasher, Hash, Hasher};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned};
use crossbeam_utils::CachePadded;
use fxhash::FxBuildHasher;
use parking_lot::Mutex;

/// Default number of buckets when none is specified.
const DEFAULT_BUCKET_COUNT: usize = 1024;

/// Outcome of [`ConcurrentHashMap::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The key was absent; a new entry was created.
    Inserted,
    /// The key was present; its value holder was replaced.
    Updated,
}

impl InsertOutcome {
    /// `true` if the insert created a new entry.
    pub fn is_inserted(self) -> bool {
        self == InsertOutcome::Inserted
    }

    /// `true` if the insert replaced an existing value.
    pub fn is_updated(self) -> bool {
        self == InsertOutcome::Updated
    }
}

/// An entry in a bucket chain.
///
/// The value holder is replaceable by atomic swap; the entry itself owns
/// whatever holder is installed when it is finally dropped. A tombstoned
/// entry is logically absent and is unlinked by the thread that set the
/// flag.
struct Entry<K, V> {
    key: K,
    value: Atomic<V>,
    next: Atomic<Entry<K, V>>,
    tombstone: AtomicBool,
}

impl<K, V> Drop for Entry<K, V> {
    fn drop(&mut self) {
        // Runs with exclusive access: either at epoch turnover after the
        // entry was retired, or during the map's own drop.
        unsafe {
            let value = self.value.load(Ordering::Relaxed, epoch::unprotected());
            if !value.is_null() {
                drop(value.into_owned());
            }
        }
    }
}

/// A bucket: the chain head plus the writer lock for this chain.
struct Bucket<K, V> {
    head: Atomic<Entry<K, V>>,
    write_lock: Mutex<()>,
}

impl<K, V> Bucket<K, V> {
    fn new() -> Self {
        Self {
            head: Atomic::null(),
            write_lock: Mutex::new(()),
        }
    }
}

/// A concurrent hash map with lock-free reads.
///
/// Maps a hashable, equality-comparable key `K` to a value `V`. Lookups
/// (`get`, `contains`) never block; modifications (`insert`, `erase`)
/// serialize per bucket, so writers to different buckets proceed in
/// parallel.
///
/// # Type Parameters
///
/// * `K` - key type (`Hash + Eq`)
/// * `V` - value type; `get` returns a snapshot and needs `V: Clone`
/// * `S` - hasher factory, defaulting to [`fxhash::FxBuildHasher`]
///
/// # Examples
///
/// ```rust
/// use rapids::map::{ConcurrentHashMap, InsertOutcome};
///
/// let map: ConcurrentHashMap<i32, String> = ConcurrentHashMap::new();
/// assert_eq!(map.insert(1, "hello".to_string()), InsertOutcome::Inserted);
/// assert_eq!(map.insert(1, "world".to_string()), InsertOutcome::Updated);
/// assert_eq!(map.get(&1).as_deref(), Some("world"));
/// assert!(map.erase(&1));
/// assert!(!map.contains(&1));
/// ```
pub struct ConcurrentHashMap<K, V, S = FxBuildHasher> {
    buckets: Box<[CachePadded<Bucket<K, V>>]>,
    size: AtomicUsize,
    hash_builder: S,
}

unsafe impl<K, V, S> Send for ConcurrentHashMap<K, V, S>
where
    K: Send + Sync,
    V: Send + Sync,
    S: Send,
{
}
unsafe impl<K, V, S> Sync for ConcurrentHashMap<K, V, S>
where
    K: Send + Sync,
    V: Send + Sync,
    S: Sync,
{
}

impl<K, V> ConcurrentHashMap<K, V> {
    /// Create a map with the default bucket count (1024) and hasher.
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKET_COUNT)
    }

    /// Create a map with `bucket_count` buckets and the default hasher.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_count` is 0.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rapids::map::ConcurrentHashMap;
    ///
    /// let map: ConcurrentHashMap<u64, u64> = ConcurrentHashMap::with_buckets(64);
    /// assert_eq!(map.bucket_count(), 64);
    /// ```
    pub fn with_buckets(bucket_count: usize) -> Self {
        Self::with_buckets_and_hasher(bucket_count, FxBuildHasher::default())
    }
}

impl<K, V> Default for ConcurrentHashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> ConcurrentHashMap<K, V, S> {
    /// Create a map with `bucket_count` buckets and a caller-supplied
    /// hasher factory.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_count` is 0.
    pub fn with_buckets_and_hasher(bucket_count: usize, hash_builder: S) -> Self {
        assert!(bucket_count > 0, "bucket count must be greater than 0");

        let buckets: Vec<CachePadded<Bucket<K, V>>> = (0..bucket_count)
            .map(|_| CachePadded::new(Bucket::new()))
            .collect();

        Self {
            buckets: buckets.into_boxed_slice(),
            size: AtomicUsize::new(0),
            hash_builder,
        }
    }

    /// Number of live entries.
    ///
    /// Transiently inaccurate while inserts and erases are in flight.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// `true` if the map holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of buckets in the fixed table.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl<K, V, S> ConcurrentHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Insert or update a key-value pair.
    ///
    /// If `key` is absent a new entry is created and
    /// [`InsertOutcome::Inserted`] is returned. If `key` is present the
    /// value holder is replaced by atomic swap (concurrent readers keep
    /// seeing the old value until the swap lands) and
    /// [`InsertOutcome::Updated`] is returned. Under a same-key race,
    /// exactly one writer observes `Inserted`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rapids::map::{ConcurrentHashMap, InsertOutcome};
    ///
    /// let map = ConcurrentHashMap::new();
    /// assert_eq!(map.insert(1, 100), InsertOutcome::Inserted);
    /// assert_eq!(map.insert(1, 200), InsertOutcome::Updated);
    /// assert_eq!(map.get(&1), Some(200));
    /// ```
    pub fn insert(&self, key: K, value: V) -> InsertOutcome {
        let guard = epoch::pin();
        let bucket = self.bucket_for(&key);
        let _write = bucket.write_lock.lock();

        if let Some(entry) = Self::find_live(bucket, &key, &guard) {
            let old = entry.value.swap(Owned::new(value), Ordering::AcqRel, &guard);
            unsafe {
                guard.defer_destroy(old);
            }
            return InsertOutcome::Updated;
        }

        let head = bucket.head.load(Ordering::Relaxed, &guard);
        let entry = Owned::new(Entry {
            key,
            value: Atomic::new(value),
            next: Atomic::null(),
            tombstone: AtomicBool::new(false),
        });
        entry.next.store(head, Ordering::Relaxed);
        bucket.head.store(entry, Ordering::Release);

        self.size.fetch_add(1, Ordering::Relaxed);
        InsertOutcome::Inserted
    }

    /// Look up a key and return a snapshot copy of its current value.
    ///
    /// Lock-free: walks the bucket chain under an epoch guard, skipping
    /// tombstoned entries. Returns `None` if the key is absent.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rapids::map::ConcurrentHashMap;
    ///
    /// let map = ConcurrentHashMap::new();
    /// map.insert("key", 7);
    /// assert_eq!(map.get(&"key"), Some(7));
    /// assert_eq!(map.get(&"missing"), None);
    /// ```
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let guard = epoch::pin();
        let bucket = self.bucket_for(key);

        let entry = Self::find_live(bucket, key, &guard)?;
        let value = entry.value.load(Ordering::Acquire, &guard);
        unsafe { value.as_ref() }.cloned()
    }

    /// Remove a key from the map.
    ///
    /// Returns `true` iff the key was live when the entry was tombstoned
    /// (the linearization point). The tombstoned entry is then unlinked
    /// from its chain and retired; readers standing on it mid-walk already
    /// treat it as absent.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rapids::map::ConcurrentHashMap;
    ///
    /// let map = ConcurrentHashMap::new();
    /// map.insert(1, "one");
    /// assert!(map.erase(&1));
    /// assert!(!map.erase(&1));
    /// ```
    pub fn erase(&self, key: &K) -> bool {
        let guard = epoch::pin();
        let bucket = self.bucket_for(key);
        let _write = bucket.write_lock.lock();

        let mut prev: Option<&Entry<K, V>> = None;
        let mut current = bucket.head.load(Ordering::Acquire, &guard);

        while let Some(entry) = unsafe { current.as_ref() } {
            let next = entry.next.load(Ordering::Acquire, &guard);

            if !entry.tombstone.load(Ordering::Acquire) && entry.key == *key {
                // Claim, then unlink. Readers between the two stores skip
                // the entry via its tombstone.
                entry.tombstone.store(true, Ordering::Release);
                match prev {
                    Some(p) => p.next.store(next, Ordering::Release),
                    None => bucket.head.store(next, Ordering::Release),
                }
                self.size.fetch_sub(1, Ordering::Relaxed);
                unsafe {
                    guard.defer_destroy(current);
                }
                return true;
            }

            prev = Some(entry);
            current = next;
        }

        false
    }

    /// Check whether a live entry for `key` exists.
    ///
    /// Lock-free, like [`get`](Self::get), without copying the value.
    pub fn contains(&self, key: &K) -> bool {
        let guard = epoch::pin();
        Self::find_live(self.bucket_for(key), key, &guard).is_some()
    }

    fn bucket_for(&self, key: &K) -> &Bucket<K, V> {
        let mut hasher = self.hash_builder.build_hasher();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.buckets.len();
        &self.buckets[index]
    }

    /// Walk `bucket`'s chain and return the live entry for `key`, if any.
    fn find_live<'g>(
        bucket: &Bucket<K, V>,
        key: &K,
        guard: &'g Guard,
    ) -> Option<&'g Entry<K, V>> {
        let mut current = bucket.head.load(Ordering::Acquire, guard);
        while let Some(entry) = unsafe { current.as_ref() } {
            if !entry.tombstone.load(Ordering::Acquire) && entry.key == *key {
                return Some(entry);
            }
            current = entry.next.load(Ordering::Acquire, guard);
        }
        None
    }
}

impl<K, V, S> Drop for ConcurrentHashMap<K, V, S> {
    fn drop(&mut self) {
        // Exclusive access: free every chain. Entry::drop releases the
        // value holder each entry still owns.
        unsafe {
            let guard = epoch::unprotected();
            for bucket in self.buckets.iter() {
                let mut current = bucket.head.load(Ordering::Relaxed, guard);
                while !current.is_null() {
                    let next = current.deref().next.load(Ordering::Relaxed, guard);
                    drop(current.into_owned());
                    current = next;
                }
            }
        }
    }
}

impl<K, V, S> core::fmt::Debug for ConcurrentHashMap<K, V, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConcurrentHashMap")
            .field("buckets", &self.buckets.len())
            .field("size", &self.size.load(Ordering::Relaxed))
            .finish()
    }
}
