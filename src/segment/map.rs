//! `Segment<K, V>`, one lock-striped shard of a [`ConcurrentMap`], and the
//! public-facing map type itself.
//!
//! Every public operation resolves a key's hash to exactly one segment and
//! delegates the real work to [`crate::map::bucket_array_ref::BucketArrayRef`]:
//! this module's job is picking the segment, constructing that bridge, and
//! composing the handful of bulk operations (`len`, `is_empty`,
//! `contains_value`) that genuinely span every segment.

use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_epoch::{self as epoch, Atomic};
use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use tracing::trace;

use crate::config::{MapConfig, Strength};
use crate::map::bucket::BucketArray;
use crate::map::bucket_array_ref::{hash_key, BucketArrayRef};
use crate::map::DefaultHashBuilder;
use crate::reclaim::{Notification, CONTAINS_VALUE_RETRIES};
use crate::reference::{Anchor, Tracked};

/// One lock-striped shard. Reads walk `bucket_array` under an epoch guard and
/// never touch `lock`; every write takes `lock`, which is the only
/// synchronization between writers.
pub(crate) struct Segment<K, V> {
    bucket_array: Atomic<BucketArray<K, V>>,
    count: AtomicUsize,
    mod_count: AtomicUsize,
    threshold: AtomicUsize,
    read_count: AtomicUsize,
    key_queue: Option<Arc<SegQueue<Notification>>>,
    value_queue: Option<Arc<SegQueue<Notification>>>,
    lock: Mutex<()>,
}

impl<K, V> Segment<K, V> {
    fn new(initial_capacity: usize, key_strength: Strength, value_strength: Strength) -> Self {
        let capacity = initial_capacity.max(1).next_power_of_two();
        let threshold = capacity * crate::config::LOAD_FACTOR_NUM / crate::config::LOAD_FACTOR_DENOM;

        Segment {
            bucket_array: Atomic::new(BucketArray::with_capacity(capacity)),
            count: AtomicUsize::new(0),
            mod_count: AtomicUsize::new(0),
            threshold: AtomicUsize::new(threshold),
            read_count: AtomicUsize::new(0),
            key_queue: (key_strength == Strength::Weak).then(|| Arc::new(SegQueue::new())),
            value_queue: (value_strength == Strength::Weak).then(|| Arc::new(SegQueue::new())),
            lock: Mutex::new(()),
        }
    }
}

impl<K, V> Drop for Segment<K, V> {
    fn drop(&mut self) {
        // No concurrent access is possible once a segment is being dropped, so
        // `unprotected` is sound here: there is no later epoch any guard could
        // need the freed nodes to survive into.
        unsafe {
            let guard = &epoch::unprotected();
            let array = self.bucket_array.load(Ordering::Relaxed, guard);
            if let Some(array_ref) = array.as_ref() {
                for bucket in array_ref.iter_buckets() {
                    let mut cursor = bucket.load(Ordering::Relaxed, guard);
                    while let Some(node) = cursor.as_ref() {
                        let next = node.next.load(Ordering::Relaxed, guard);
                        drop(cursor.into_owned());
                        cursor = next;
                    }
                }
                drop(array.into_owned());
            }
        }
    }
}

/// A segmented, lock-striped concurrent map.
///
/// Reads never block: they walk a segment's bucket chain under an epoch guard
/// and are wait-free with respect to writers. Writes take only their own
/// segment's lock, so writers to different segments never contend.
///
/// `K` and `V` may each be held with [`Strength::Strong`] or
/// [`Strength::Weak`] retention, configured via [`MapConfig`]; see
/// [`crate::reference::Anchor`] for what weak retention means in a language
/// without a tracing collector.
pub struct ConcurrentMap<K, V, S = DefaultHashBuilder> {
    segments: Box<[Segment<K, V>]>,
    build_hasher: S,
    segment_shift: u32,
    config: MapConfig,
    dummy_cell: Mutex<Option<Arc<Tracked<V>>>>,
}

impl<K, V> ConcurrentMap<K, V, DefaultHashBuilder> {
    /// A map with the default configuration: strong keys and values, four
    /// segments, sixteen buckets per segment.
    pub fn new() -> Self {
        Self::with_config(MapConfig::default())
    }

    pub fn with_config(config: MapConfig) -> Self {
        Self::with_config_and_hasher(config, DefaultHashBuilder::default())
    }
}

impl<K, V> Default for ConcurrentMap<K, V, DefaultHashBuilder> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> ConcurrentMap<K, V, S> {
    pub fn with_config_and_hasher(config: MapConfig, build_hasher: S) -> Self {
        let num_segments = config.num_segments();
        debug_assert!(num_segments.is_power_of_two());
        let segment_shift = 64 - num_segments.trailing_zeros();

        let per_segment_capacity = (config.initial_capacity() / num_segments).max(1);
        let segments = (0..num_segments)
            .map(|_| Segment::new(per_segment_capacity, config.key_strength(), config.value_strength()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        trace!(
            num_segments,
            per_segment_capacity,
            key_strength = ?config.key_strength(),
            value_strength = ?config.value_strength(),
            "constructed concurrent map"
        );

        ConcurrentMap {
            segments,
            build_hasher,
            segment_shift,
            config,
            dummy_cell: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    fn segment_for(&self, hash: u64) -> &Segment<K, V> {
        // `segment_shift == 64` only when there's a single segment (`1 <<
        // segment_shift` would be the whole hash space); shifting a u64 by 64
        // is out of range, so short-circuit straight to segment 0 instead.
        let index = if self.segment_shift == 64 {
            0
        } else {
            (hash >> self.segment_shift) as usize & (self.segments.len() - 1)
        };
        &self.segments[index]
    }

    fn bucket_array_ref_for<'s>(&'s self, segment: &'s Segment<K, V>) -> BucketArrayRef<'s, K, V, S> {
        BucketArrayRef {
            bucket_array: &segment.bucket_array,
            build_hasher: &self.build_hasher,
            equivalence: self.config.key_equivalence(),
            key_strength: self.config.key_strength(),
            value_strength: self.config.value_strength(),
            count: &segment.count,
            mod_count: &segment.mod_count,
            threshold: &segment.threshold,
            read_count: &segment.read_count,
            key_queue: segment.key_queue.as_ref(),
            value_queue: segment.value_queue.as_ref(),
            lock: &segment.lock,
        }
    }

    fn bucket_array_ref(&self, hash: u64) -> BucketArrayRef<'_, K, V, S> {
        self.bucket_array_ref_for(self.segment_for(hash))
    }

    pub(crate) fn segments(&self) -> &[Segment<K, V>] {
        &self.segments
    }

    pub(crate) fn bucket_array_ref_for_iter<'s>(&'s self, segment: &'s Segment<K, V>) -> BucketArrayRef<'s, K, V, S> {
        self.bucket_array_ref_for(segment)
    }

    /// Total live entries across every segment. Each segment's count is read
    /// independently, so under concurrent mutation this may transiently
    /// over- or under-count by whatever changed mid-scan.
    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.count.load(Ordering::Acquire)).sum()
    }

    pub fn is_empty(&self) -> bool {
        for _ in 0..CONTAINS_VALUE_RETRIES {
            let before: Vec<usize> = self.segments.iter().map(|s| s.mod_count.load(Ordering::Acquire)).collect();

            if self.segments.iter().any(|s| s.count.load(Ordering::Acquire) != 0) {
                return false;
            }

            let stable = self
                .segments
                .iter()
                .zip(before.iter())
                .all(|(s, &before)| s.mod_count.load(Ordering::Acquire) == before);
            if stable {
                return true;
            }
        }

        self.segments.iter().all(|s| s.count.load(Ordering::Acquire) == 0)
    }

    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }
}

impl<K, V, S> ConcurrentMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Looks up `key`, cloning out its value. Lock-free.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let hash = hash_key(&self.build_hasher, key);
        self.bucket_array_ref(hash).get(key, hash)
    }

    /// Looks up `key`, applying `f` to its value without cloning it.
    pub fn get_and<Q, F, T>(&self, key: &Q, f: F) -> Option<T>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> T,
    {
        let hash = hash_key(&self.build_hasher, key);
        self.bucket_array_ref(hash).get_and(key, hash, f)
    }

    /// Looks up `key`, returning both its value and an [`Anchor`] to the
    /// entry's key cell captured atomically in the same chain walk. See
    /// [`crate::map::bucket_array_ref::BucketArrayRef::get_entry`] for why
    /// this exists alongside the plain `get`.
    pub fn get_entry<Q>(&self, key: &Q) -> Option<(Anchor<K>, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let hash = hash_key(&self.build_hasher, key);
        self.bucket_array_ref(hash).get_entry(key, hash)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = hash_key(&self.build_hasher, key);
        self.bucket_array_ref(hash).get_and(key, hash, |_| ()).is_some()
    }

    /// Whether any live entry currently holds `value`. Weakly consistent: a
    /// concurrent structural write observed mid-scan triggers a bounded number
    /// of retries before falling back to the last observation.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        for _ in 0..CONTAINS_VALUE_RETRIES {
            let before: Vec<usize> = self.segments.iter().map(|s| s.mod_count.load(Ordering::Acquire)).collect();

            if self
                .segments
                .iter()
                .any(|segment| self.bucket_array_ref_for(segment).contains_value(value))
            {
                return true;
            }

            let stable = self
                .segments
                .iter()
                .zip(before.iter())
                .all(|(s, &before)| s.mod_count.load(Ordering::Acquire) == before);
            if stable {
                return false;
            }
        }

        trace!(retries = CONTAINS_VALUE_RETRIES, "contains_value retries exhausted under concurrent mutation");
        false
    }

    /// Identity-equivalence lookup by the anchor returned from the `put` that
    /// created the entry. The only way to retrieve an entry in a map configured
    /// with [`crate::config::Equivalence::Identity`].
    pub fn get_by_anchor(&self, key_anchor: &Anchor<K>) -> Option<V>
    where
        V: Clone,
    {
        let hash = hash_key(&self.build_hasher, key_anchor.get());
        self.bucket_array_ref(hash).get_by_anchor(key_anchor, hash)
    }

    pub fn remove_by_anchor(&self, key_anchor: &Anchor<K>) -> Option<V>
    where
        V: Clone,
    {
        let hash = hash_key(&self.build_hasher, key_anchor.get());
        self.bucket_array_ref(hash).remove_by_anchor(key_anchor, hash)
    }

    /// Inserts `key`/`value`, replacing any existing live entry. Returns the
    /// previous value (if any) alongside anchors to the key/value cells now
    /// occupying the slot — retain these for as long as a weakly-held key or
    /// value must stay reachable.
    pub fn insert_full(&self, key: K, value: V) -> (Option<V>, Anchor<K>, Anchor<V>)
    where
        V: Clone,
    {
        let hash = hash_key(&self.build_hasher, &key);
        self.bucket_array_ref(hash).insert(key, hash, value, false)
    }

    /// Inserts `key`/`value` only if no live entry for `key` exists yet.
    pub fn insert_full_if_absent(&self, key: K, value: V) -> (Option<V>, Anchor<K>, Anchor<V>)
    where
        V: Clone,
    {
        let hash = hash_key(&self.build_hasher, &key);
        self.bucket_array_ref(hash).insert(key, hash, value, true)
    }

    /// Convenience wrapper over [`Self::insert_full`] for strong-key,
    /// strong-value maps, where the anchors are just boilerplate.
    pub fn insert(&self, key: K, value: V) -> Option<V>
    where
        V: Clone,
    {
        self.insert_full(key, value).0
    }

    pub fn insert_if_absent(&self, key: K, value: V) -> Option<V>
    where
        V: Clone,
    {
        self.insert_full_if_absent(key, value).0
    }

    /// Unconditionally replaces the value mapped to `key`, if it's currently
    /// live. No-op (returning `None`) if no live entry exists.
    pub fn replace<Q>(&self, key: &Q, value: V) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let hash = hash_key(&self.build_hasher, key);
        self.bucket_array_ref(hash).replace_value(key, hash, value)
    }

    /// Replaces the value mapped to `key` with `new_value` only if its current
    /// value equals `expected`.
    pub fn replace_if<Q>(&self, key: &Q, expected: &V, new_value: V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        let hash = hash_key(&self.build_hasher, key);
        self.bucket_array_ref(hash).replace_value_if(key, hash, expected, new_value)
    }

    /// Removes the entry mapped to `key`, regardless of its value.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let hash = hash_key(&self.build_hasher, key);
        self.bucket_array_ref(hash).remove(key, hash)
    }

    /// Removes the entry mapped to `key` only if its current value equals
    /// `expected`.
    pub fn remove_if<Q>(&self, key: &Q, expected: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        let hash = hash_key(&self.build_hasher, key);
        self.bucket_array_ref(hash).remove_if(key, hash, expected)
    }

    pub fn clear(&self) {
        for segment in self.segments.iter() {
            self.bucket_array_ref_for(segment).clear();
        }
    }

    /// A weakly consistent snapshot iterator over `(key, value)` pairs; see the
    /// [`crate::iter`] module docs for exactly what "weakly consistent" means
    /// here. Keys are yielded as their [`Anchor`] since the map never hands out
    /// owned `K`s.
    pub fn iter(&self) -> crate::iter::EntryIter<'_, K, V, S>
    where
        V: Clone,
    {
        crate::iter::EntryIter::new(self)
    }

    pub fn keys(&self) -> crate::iter::KeyIter<'_, K, V, S>
    where
        V: Clone,
    {
        crate::iter::KeyIter::new(self)
    }

    pub fn values(&self) -> crate::iter::ValueIter<'_, K, V, S>
    where
        V: Clone,
    {
        crate::iter::ValueIter::new(self)
    }
}

impl<K, V, S> ConcurrentMap<K, V, S>
where
    S: BuildHasher,
{
    /// Dummy-value (intern-set) mode: every key is mapped to a clone of the
    /// same cached marker value, established by whichever call reaches this
    /// method first. Requires [`Strength::Strong`] value strength (validated by
    /// [`crate::config::Builder::build`]), so the caller never has to come up
    /// with a fresh value per key when the map is really just being used as a
    /// concurrent set.
    pub fn insert_dummy(&self, key: K, marker: V) -> Anchor<K>
    where
        K: Hash + Eq,
        V: Clone,
    {
        debug_assert!(self.config.is_dummy_value(), "insert_dummy called on a non-dummy-value map");

        let value_tracked = {
            let mut cell = self.dummy_cell.lock();
            if cell.is_none() {
                *cell = Some(Tracked::new(marker));
            }
            Arc::clone(cell.as_ref().expect("just populated"))
        };

        let hash = hash_key(&self.build_hasher, &key);
        let (_, key_anchor, _) = self
            .bucket_array_ref(hash)
            .insert(key, hash, value_tracked.value().clone(), true);
        key_anchor
    }
}
