//! Extendible hash table for buffer pool page ID to frame ID mapping.

use basalt_common::{BasaltError, Result};
use parking_lot::Mutex;
use rustc_hash::FxBuildHasher;
use std::fmt;
use std::hash::{BuildHasher, Hash};

/// Extendible hash table mapping keys to values in O(1) expected time.
///
/// The table routes a key through the low `global_depth` bits of its hash
/// into a directory of bucket references. A full bucket either splits
/// (when its local depth is below the global depth) or forces the
/// directory to double first, so capacity grows without ever rehashing
/// the whole table. Deletions never merge buckets or shrink the
/// directory.
///
/// Buckets live in an arena and the directory stores arena indices, so a
/// single bucket can be referenced by many directory slots at once; every
/// slot referencing a bucket of local depth `d` agrees with the others on
/// the low `d` bits of its index.
///
/// All operations take one instance-wide lock for their full duration.
pub struct ExtendibleHashTable<K, V, S = FxBuildHasher> {
    /// Internal state protected by mutex.
    inner: Mutex<HashTableInner<K, V>>,
    /// Hash builder; routing uses the low bits of the produced hash.
    hash_builder: S,
}

impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Debug for ExtendibleHashTable<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendibleHashTable")
            .field("inner", &self.inner)
            .finish()
    }
}

#[derive(Debug)]
struct HashTableInner<K, V> {
    /// Number of low-order hash bits used to index the directory.
    global_depth: usize,
    /// Maximum number of entries per bucket.
    bucket_size: usize,
    /// Directory of bucket arena indices, length 2^global_depth.
    directory: Vec<usize>,
    /// Bucket arena; splits append, nothing is ever freed.
    buckets: Vec<Bucket<K, V>>,
}

/// A fixed-capacity, append-ordered list of entries plus the number of
/// low hash bits its contents agree on.
#[derive(Debug)]
struct Bucket<K, V> {
    local_depth: usize,
    items: Vec<(K, V)>,
}

/// Masks a hash down to the low `depth` bits.
fn slot_for(hash: u64, depth: usize) -> usize {
    (hash as usize) & ((1usize << depth) - 1)
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq,
{
    /// Creates a table whose buckets hold `bucket_size` entries each,
    /// starting with global depth 0 and a single empty bucket.
    pub fn new(bucket_size: usize) -> Result<Self> {
        Self::with_hasher(bucket_size, FxBuildHasher)
    }
}

impl<K, V, S> ExtendibleHashTable<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Creates a table using the given hash builder for routing.
    pub fn with_hasher(bucket_size: usize, hash_builder: S) -> Result<Self> {
        if bucket_size == 0 {
            return Err(BasaltError::InvalidParameter {
                name: "bucket_size".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(Self {
            inner: Mutex::new(HashTableInner {
                global_depth: 0,
                bucket_size,
                directory: vec![0],
                buckets: vec![Bucket {
                    local_depth: 0,
                    items: Vec::new(),
                }],
            }),
            hash_builder,
        })
    }

    /// Looks up a key and returns its value if present.
    pub fn find(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let hash = self.hash_builder.hash_one(key);
        let inner = self.inner.lock();
        let slot = slot_for(hash, inner.global_depth);
        let bucket = &inner.buckets[inner.directory[slot]];
        bucket
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Removes a key's entry. Returns true if an entry was removed.
    pub fn remove(&self, key: &K) -> bool {
        let hash = self.hash_builder.hash_one(key);
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let slot = slot_for(hash, inner.global_depth);
        let bucket = &mut inner.buckets[inner.directory[slot]];
        match bucket.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                bucket.items.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Inserts a key/value pair, overwriting the value in place if the
    /// key already exists.
    ///
    /// When the routed bucket is full the table grows until the entry
    /// fits: the directory doubles whenever the bucket's local depth has
    /// caught up with the global depth, otherwise the bucket splits and
    /// its entries are redistributed by their next routing bit.
    pub fn insert(&self, key: K, value: V) {
        let hash = self.hash_builder.hash_one(&key);
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        loop {
            let slot = slot_for(hash, inner.global_depth);
            let bucket = &mut inner.buckets[inner.directory[slot]];

            if let Some(entry) = bucket.items.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value;
                return;
            }
            if bucket.items.len() < inner.bucket_size {
                bucket.items.push((key, value));
                return;
            }

            if bucket.local_depth == inner.global_depth {
                inner.double_directory();
            } else {
                inner.split_bucket(slot, &self.hash_builder);
            }
        }
    }

    /// Returns the number of low-order hash bits used to index the
    /// directory.
    pub fn global_depth(&self) -> usize {
        self.inner.lock().global_depth
    }

    /// Returns the local depth of the bucket referenced by the given
    /// directory slot. The directory has `2^global_depth()` slots.
    pub fn local_depth(&self, slot: usize) -> usize {
        let inner = self.inner.lock();
        inner.buckets[inner.directory[slot]].local_depth
    }

    /// Returns the number of buckets allocated so far.
    pub fn bucket_count(&self) -> usize {
        self.inner.lock().buckets.len()
    }
}

impl<K, V> HashTableInner<K, V>
where
    K: Hash + Eq,
{
    /// Doubles the directory, bumping the global depth by one. The upper
    /// half aliases the lower half's buckets; no local depth changes, so
    /// the low-bits aliasing invariant is preserved as-is.
    fn double_directory(&mut self) {
        self.global_depth += 1;
        let old_len = self.directory.len();
        for i in 0..old_len {
            let bucket_idx = self.directory[i];
            self.directory.push(bucket_idx);
        }
    }

    /// Splits the bucket referenced by `slot`, redistributing its entries
    /// between itself and a freshly allocated sibling by the bit the new
    /// local depth exposes.
    ///
    /// Directory repointing is computed from the split arithmetic over
    /// the whole directory range, not from the entries in the bucket: a
    /// side of the split left without entries still has its slots
    /// repointed correctly.
    fn split_bucket<S: BuildHasher>(&mut self, slot: usize, hash_builder: &S) {
        let bucket_idx = self.directory[slot];
        let old_depth = self.buckets[bucket_idx].local_depth;
        let new_depth = old_depth + 1;

        // All slots referencing this bucket share the routed slot's low
        // old_depth bits; the sibling takes the half with the new bit set.
        let sibling_pattern = (slot & ((1usize << old_depth) - 1)) | (1usize << old_depth);

        self.buckets[bucket_idx].local_depth = new_depth;
        let items = std::mem::take(&mut self.buckets[bucket_idx].items);
        let mut kept = Vec::new();
        let mut moved = Vec::new();
        for (k, v) in items {
            if slot_for(hash_builder.hash_one(&k), new_depth) == sibling_pattern {
                moved.push((k, v));
            } else {
                kept.push((k, v));
            }
        }
        self.buckets[bucket_idx].items = kept;

        let sibling_idx = self.buckets.len();
        self.buckets.push(Bucket {
            local_depth: new_depth,
            items: moved,
        });

        let new_mask = (1usize << new_depth) - 1;
        for i in 0..self.directory.len() {
            if i & new_mask == sibling_pattern {
                self.directory[i] = sibling_idx;
            }
        }
    }
}
