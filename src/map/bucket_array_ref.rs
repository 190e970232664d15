//! The per-segment operation set: every public map operation bottoms out in one
//! of the methods here, bundled around borrowed references to a single segment's
//! fields so that the facade in [`crate::segment::map`] never has to duplicate
//! the chain-walking logic once per operation.
//!
//! Reads never take `lock`; they walk the bucket array under an epoch guard and
//! tolerate a concurrently-rebuilt chain because `Entry::next` never changes in
//! place. Every write takes `lock` first, which serializes writers against each
//! other (never against readers) and lets the drain loops assume no concurrent
//! structural writer.

use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use tracing::trace;

use crate::config::{Equivalence, Strength, LOAD_FACTOR_DENOM, LOAD_FACTOR_NUM, MAX_CAPACITY};
use crate::reclaim::{should_amortize_drain, Notification, ReclaimSite, DRAIN_MAX};
use crate::reference::{Anchor, Holder, Tracked};

use super::bucket::{spread, BucketArray};
use super::entry::Entry;

/// Hashes `key` under `build_hasher` and applies the avalanche mix, producing the
/// one hash value used for both segment selection and bucket selection.
pub(crate) fn hash_key<Q, S>(build_hasher: &S, key: &Q) -> u64
where
    Q: Hash + ?Sized,
    S: BuildHasher,
{
    let mut hasher = build_hasher.build_hasher();
    key.hash(&mut hasher);
    spread(hasher.finish())
}

/// Whether `candidate`'s value matches a borrowed query key, under the configured
/// key equivalence.
///
/// Identity equivalence can never be satisfied this way: a bare `&Q` carries no
/// allocation to compare pointers against. Maps configured for identity
/// equivalence (the default for weak keys) are looked up by the `Anchor` handed
/// back from the `put` that created the entry, via [`BucketArrayRef::get_by_anchor`]
/// and friends, not by value.
fn matches<K, Q>(equivalence: Equivalence, candidate: &Arc<Tracked<K>>, key: &Q) -> bool
where
    K: Borrow<Q>,
    Q: Eq + ?Sized,
{
    match equivalence {
        Equivalence::Equals => candidate.value().borrow() == key,
        Equivalence::Identity => false,
    }
}

fn matches_anchor<K>(candidate: &Arc<Tracked<K>>, anchor: &Anchor<K>) -> bool {
    Arc::ptr_eq(candidate, &anchor.0)
}

/// Borrowed handles into one segment's mutable state, bundled together so the
/// chain-walking code below doesn't have to thread six separate references
/// through every call.
pub(crate) struct BucketArrayRef<'a, K, V, S> {
    pub(crate) bucket_array: &'a Atomic<BucketArray<K, V>>,
    pub(crate) build_hasher: &'a S,
    pub(crate) equivalence: Equivalence,
    pub(crate) key_strength: Strength,
    pub(crate) value_strength: Strength,
    pub(crate) count: &'a AtomicUsize,
    pub(crate) mod_count: &'a AtomicUsize,
    pub(crate) threshold: &'a AtomicUsize,
    pub(crate) read_count: &'a AtomicUsize,
    pub(crate) key_queue: Option<&'a Arc<SegQueue<Notification>>>,
    pub(crate) value_queue: Option<&'a Arc<SegQueue<Notification>>>,
    pub(crate) lock: &'a Mutex<()>,
}

impl<'a, K, V, S> BucketArrayRef<'a, K, V, S> {
    /// The currently-installed bucket array. Exposed crate-wide so the
    /// snapshotting iterator can walk segments without duplicating the chain
    /// traversal wiring.
    pub(crate) fn current_array<'g>(&self, guard: &'g Guard) -> &'g BucketArray<K, V> {
        unsafe { self.bucket_array.load(Ordering::Acquire, guard).as_ref() }
            .expect("a segment's bucket array is never null")
    }

    /// Registers `key_tracked` against its own allocation's identity, not the
    /// owning entry's address: the entry may later be relocated to a fresh
    /// clone by `expand`/`remove_matching`, but this `Arc`'s address never
    /// changes, so the notification stays actionable across relocation.
    fn register_key_site(&self, key_tracked: &Arc<Tracked<K>>, hash: u64) {
        if self.key_strength == Strength::Weak {
            if let Some(queue) = self.key_queue {
                key_tracked.register(ReclaimSite::Key {
                    queue: Arc::clone(queue),
                    key_ptr: Arc::as_ptr(key_tracked) as usize,
                    hash,
                });
            }
        }
    }

    /// Registers `value_tracked` against its own allocation's identity, for the
    /// same relocation-survives-identity reason as `register_key_site`.
    fn register_value_site(&self, value_tracked: &Arc<Tracked<V>>, hash: u64) {
        if self.value_strength == Strength::Weak {
            if let Some(queue) = self.value_queue {
                value_tracked.register(ReclaimSite::Value {
                    queue: Arc::clone(queue),
                    hash,
                    value_ptr: Arc::as_ptr(value_tracked) as usize,
                });
            }
        }
    }

    /// Drains both reclamation queues, bounded to `DRAIN_MAX` notifications each.
    /// Caller must already hold `lock`.
    fn pre_write_cleanup(&self, guard: &Guard) {
        self.drain_key_queue(guard);
        self.drain_value_queue(guard);
    }

    /// A non-blocking best-effort drain, for the read path's amortized cleanup:
    /// skipped entirely if a writer currently holds the segment.
    fn try_drain(&self, guard: &Guard) {
        if let Some(_held) = self.lock.try_lock() {
            self.pre_write_cleanup(guard);
        }
    }

    fn drain_key_queue(&self, guard: &Guard) {
        let queue = match self.key_queue {
            Some(queue) => queue,
            None => return,
        };

        let mut drained = 0usize;
        let mut reclaimed = 0usize;
        for _ in 0..DRAIN_MAX {
            match queue.pop() {
                Ok(Notification::Key { key_ptr, hash }) => {
                    drained += 1;
                    let removed = self.remove_matching(hash, guard, |node, _shared| node.key_identity() == key_ptr);
                    if removed.is_some() {
                        reclaimed += 1;
                        self.count.fetch_sub(1, Ordering::Release);
                        self.mod_count.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Ok(Notification::Value { .. }) => {}
                Err(_) => break,
            }
        }

        if drained == DRAIN_MAX {
            trace!(drained, reclaimed, "key reclamation queue drain exhausted its per-call budget");
        }
    }

    fn drain_value_queue(&self, guard: &Guard) {
        let queue = match self.value_queue {
            Some(queue) => queue,
            None => return,
        };

        let mut drained = 0usize;
        let mut reclaimed = 0usize;
        for _ in 0..DRAIN_MAX {
            match queue.pop() {
                Ok(Notification::Value { hash, value_ptr }) => {
                    drained += 1;
                    let removed = self
                        .remove_matching(hash, guard, |node, _shared| node.value_holder_identity(guard) == Some(value_ptr));
                    if removed.is_some() {
                        reclaimed += 1;
                        self.count.fetch_sub(1, Ordering::Release);
                        self.mod_count.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Ok(Notification::Key { .. }) => {}
                Err(_) => break,
            }
        }

        if drained == DRAIN_MAX {
            trace!(drained, reclaimed, "value reclamation queue drain exhausted its per-call budget");
        }
    }

    /// Rebuilds the bucket chain at `hash` with the first node satisfying
    /// `predicate` removed: nodes ahead of it are cloned onto the unchanged
    /// suffix, nodes behind it are untouched. Caller must hold `lock`.
    fn remove_matching<'g, F>(&self, hash: u64, guard: &'g Guard, mut predicate: F) -> Option<Shared<'g, Entry<K, V>>>
    where
        F: FnMut(&Entry<K, V>, Shared<'g, Entry<K, V>>) -> bool,
    {
        let array = self.current_array(guard);
        let bucket = array.bucket(hash);
        let head = bucket.load(Ordering::Acquire, guard);

        let mut prefix = Vec::new();
        let mut cursor = head;
        let mut target = None;
        while let Some(node) = unsafe { cursor.as_ref() } {
            if node.hash == hash && predicate(node, cursor) {
                target = Some(cursor);
                break;
            }
            prefix.push(cursor);
            cursor = node.next.load(Ordering::Acquire, guard);
        }

        let target = target?;
        let target_node = unsafe { target.as_ref() }.expect("just matched above");
        let suffix = target_node.next.load(Ordering::Acquire, guard);

        let mut new_head = suffix;
        for &old in prefix.iter().rev() {
            let old_node = unsafe { old.as_ref() }.expect("collected from a live walk");
            new_head = old_node.clone_with_next(guard, new_head).into_shared(guard);
        }

        bucket.store(new_head, Ordering::Release);

        for old in prefix {
            unsafe { guard.defer_destroy(old) };
        }
        unsafe { guard.defer_destroy(target) };

        Some(target)
    }

    /// Doubles the segment's bucket array (full-clone strategy: every live entry
    /// is cloned into the new array rather than reusing tail nodes in place, to
    /// avoid aliasing a node between two bucket arrays under epoch reclamation).
    /// A no-op once the array is already at [`MAX_CAPACITY`]. Caller must hold
    /// `lock`.
    fn expand(&self, guard: &Guard) {
        let old_array = self.current_array(guard);
        let old_capacity = old_array.capacity();
        let new_capacity = old_capacity.saturating_mul(2).min(MAX_CAPACITY);
        if new_capacity <= old_capacity {
            return;
        }

        let new_array = BucketArray::with_capacity(new_capacity);
        let mut heads: Vec<Shared<'_, Entry<K, V>>> = vec![Shared::null(); new_capacity];
        let mut old_nodes = Vec::new();
        let mut dropped = 0usize;

        for old_bucket in old_array.iter_buckets() {
            let mut chain = Vec::new();
            let mut cursor = old_bucket.load(Ordering::Acquire, guard);
            while let Some(node) = unsafe { cursor.as_ref() } {
                chain.push(cursor);
                cursor = node.next.load(Ordering::Acquire, guard);
            }

            for &node_shared in chain.iter().rev() {
                let node = unsafe { node_shared.as_ref() }.expect("collected above");
                old_nodes.push(node_shared);

                if !node.is_live(guard) {
                    dropped += 1;
                    continue;
                }

                let new_index = new_array.bucket_index(node.hash);
                let cloned = node.clone_with_next(guard, heads[new_index]);
                heads[new_index] = cloned.into_shared(guard);
            }
        }

        for (index, head) in heads.into_iter().enumerate() {
            new_array.bucket_at(index).store(head, Ordering::Release);
        }

        if dropped > 0 {
            self.count.fetch_sub(dropped, Ordering::Relaxed);
        }
        self.threshold.store(
            new_array.capacity() * LOAD_FACTOR_NUM / LOAD_FACTOR_DENOM,
            Ordering::Relaxed,
        );

        trace!(old_capacity, new_capacity, dropped, "segment bucket array expanded");

        let previous = self.bucket_array.swap(Owned::new(new_array), Ordering::Release, guard);
        unsafe {
            guard.defer_destroy(previous);
            for node in old_nodes {
                guard.defer_destroy(node);
            }
        }
    }

    fn note_read(&self, guard: &Guard) {
        let read_count = self.read_count.fetch_add(1, Ordering::Relaxed) + 1;
        if should_amortize_drain(read_count) {
            self.try_drain(guard);
        }
    }

    /// The same amortized-drain bookkeeping as [`Self::note_read`], exposed for
    /// the snapshot iterator: spec's "every advance invokes post-read cleanup"
    /// (§4.8) maps onto "every entry visited while building the snapshot counts
    /// as a read" here, since the snapshot is taken in the same head-to-tail,
    /// segment-by-segment order an iterator would otherwise walk live.
    pub(crate) fn note_iteration_step(&self, guard: &Guard) {
        self.note_read(guard);
    }

    /// Returns a clone of the value mapped to `key`, if a live entry exists.
    pub(crate) fn get<Q>(&self, key: &Q, hash: u64) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.get_and(key, hash, V::clone)
    }

    /// Applies `f` to the value mapped to `key` without cloning it, if a live
    /// entry exists.
    pub(crate) fn get_and<Q, F, T>(&self, key: &Q, hash: u64, f: F) -> Option<T>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> T,
    {
        let guard = &epoch::pin();

        if self.count.load(Ordering::Acquire) == 0 {
            self.note_read(guard);
            return None;
        }

        let array = self.current_array(guard);
        let mut cursor = array.bucket(hash).load(Ordering::Acquire, guard);
        let mut result = None;

        while let Some(node) = unsafe { cursor.as_ref() } {
            if node.hash == hash {
                if let Some(candidate) = node.key() {
                    if matches(self.equivalence, &candidate, key) {
                        result = node.value(guard).map(|value| f(value.value()));
                        break;
                    }
                }
            }
            cursor = node.next.load(Ordering::Acquire, guard);
        }

        self.note_read(guard);
        result
    }

    /// Looks up `key` and returns both the value and an [`Anchor`] to the
    /// entry's key cell, captured in a single chain walk so the two can't
    /// straddle a concurrent mutation the way two separate `get`/lookup calls
    /// could. This is the one way to get an `Anchor<K>` back out of a map
    /// configured with weak keys without already holding one — useful once a
    /// key's original anchor has been dropped by every other owner but the
    /// map itself still reports the entry live.
    pub(crate) fn get_entry<Q>(&self, key: &Q, hash: u64) -> Option<(Anchor<K>, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let guard = &epoch::pin();

        if self.count.load(Ordering::Acquire) == 0 {
            self.note_read(guard);
            return None;
        }

        let array = self.current_array(guard);
        let mut cursor = array.bucket(hash).load(Ordering::Acquire, guard);
        let mut result = None;

        while let Some(node) = unsafe { cursor.as_ref() } {
            if node.hash == hash {
                if let Some(candidate) = node.key() {
                    if matches(self.equivalence, &candidate, key) {
                        result = node.value(guard).map(|value| (Anchor(candidate), value.value().clone()));
                        break;
                    }
                }
            }
            cursor = node.next.load(Ordering::Acquire, guard);
        }

        self.note_read(guard);
        result
    }

    /// Identity-equivalence lookup: finds the entry whose key cell is the exact
    /// allocation backing `key_anchor`.
    pub(crate) fn get_by_anchor(&self, key_anchor: &Anchor<K>, hash: u64) -> Option<V>
    where
        V: Clone,
    {
        let guard = &epoch::pin();
        let array = self.current_array(guard);
        let mut cursor = array.bucket(hash).load(Ordering::Acquire, guard);

        while let Some(node) = unsafe { cursor.as_ref() } {
            if node.hash == hash {
                if let Some(candidate) = node.key() {
                    if matches_anchor(&candidate, key_anchor) {
                        let result = node.value(guard).map(|value| value.value().clone());
                        self.note_read(guard);
                        return result;
                    }
                }
            }
            cursor = node.next.load(Ordering::Acquire, guard);
        }

        self.note_read(guard);
        None
    }

    /// Whether any live entry in this segment holds `target` as its value,
    /// independent of key. Read-only; takes no lock.
    pub(crate) fn contains_value(&self, target: &V) -> bool
    where
        V: PartialEq,
    {
        let guard = &epoch::pin();
        let array = self.current_array(guard);

        for bucket in array.iter_buckets() {
            let mut cursor = bucket.load(Ordering::Acquire, guard);
            while let Some(node) = unsafe { cursor.as_ref() } {
                if let Some(value) = node.value(guard) {
                    if value.value() == target {
                        return true;
                    }
                }
                cursor = node.next.load(Ordering::Acquire, guard);
            }
        }

        false
    }

    /// Inserts `key`/`value`. If `only_if_absent` and a live entry already
    /// exists, the map is left unchanged and the existing value/anchors are
    /// returned instead. Returns the previous value (if any replaced) along
    /// with anchors to whichever key/value cells now occupy the slot.
    pub(crate) fn insert(&self, key: K, hash: u64, value: V, only_if_absent: bool) -> (Option<V>, Anchor<K>, Anchor<V>)
    where
        K: Hash + Eq,
        V: Clone,
    {
        let guard = &epoch::pin();
        let _held = self.lock.lock();
        self.pre_write_cleanup(guard);

        if self.count.load(Ordering::Relaxed) + 1 > self.threshold.load(Ordering::Relaxed) {
            self.expand(guard);
        }

        let array = self.current_array(guard);
        let bucket = array.bucket(hash);
        let head = bucket.load(Ordering::Acquire, guard);
        let mut cursor = head;

        while let Some(node) = unsafe { cursor.as_ref() } {
            if node.hash == hash {
                if let Some(existing_key) = node.key() {
                    if matches(self.equivalence, &existing_key, &key) {
                        let existing_value = node.value(guard);

                        if only_if_absent {
                            if let Some(live_value) = existing_value {
                                let old = live_value.value().clone();
                                return (Some(old), Anchor(existing_key), Anchor(live_value));
                            }
                            // value already collected: fall through and replace it,
                            // without treating this as a fresh insert.
                        }

                        let old_value_for_return = existing_value.as_ref().map(|v| v.value().clone());
                        let value_tracked = Tracked::new(value);
                        self.register_value_site(&value_tracked, hash);
                        let new_holder = Holder::new(self.value_strength, &value_tracked);
                        let old_shared = node.swap_value(new_holder, guard);
                        unsafe { guard.defer_destroy(old_shared) };

                        return (old_value_for_return, Anchor(existing_key), Anchor(value_tracked));
                    }
                }
            }
            cursor = node.next.load(Ordering::Acquire, guard);
        }

        let key_tracked = Tracked::new(key);
        let value_tracked = Tracked::new(value);
        let new_node = Entry::new(hash, self.key_strength, &key_tracked, self.value_strength, &value_tracked, head);
        let new_node_shared = new_node.into_shared(guard);

        self.register_key_site(&key_tracked, hash);
        self.register_value_site(&value_tracked, hash);

        bucket.store(new_node_shared, Ordering::Release);
        self.mod_count.fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Release);

        (None, Anchor(key_tracked), Anchor(value_tracked))
    }

    /// Unconditionally replaces the value mapped to `key`, if a live entry
    /// exists. A key match whose value has been collected is pruned and
    /// reported as absent, rather than revived.
    pub(crate) fn replace_value<Q>(&self, key: &Q, hash: u64, new_value: V) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let guard = &epoch::pin();
        let _held = self.lock.lock();
        self.pre_write_cleanup(guard);

        let array = self.current_array(guard);
        let mut cursor = array.bucket(hash).load(Ordering::Acquire, guard);
        let mut found: Option<Shared<'_, Entry<K, V>>> = None;

        while let Some(node) = unsafe { cursor.as_ref() } {
            if node.hash == hash {
                if let Some(candidate) = node.key() {
                    if matches(self.equivalence, &candidate, key) {
                        found = Some(cursor);
                        break;
                    }
                }
            }
            cursor = node.next.load(Ordering::Acquire, guard);
        }

        let found = found?;
        let node = unsafe { found.as_ref() }.expect("just matched above");

        match node.value(guard) {
            Some(old) => {
                let old_val = old.value().clone();
                let value_tracked = Tracked::new(new_value);
                self.register_value_site(&value_tracked, hash);
                let new_holder = Holder::new(self.value_strength, &value_tracked);
                let old_shared = node.swap_value(new_holder, guard);
                unsafe { guard.defer_destroy(old_shared) };
                Some(old_val)
            }
            None => {
                let removed = self.remove_matching(hash, guard, |_, shared| shared == found);
                if removed.is_some() {
                    self.count.fetch_sub(1, Ordering::Release);
                    self.mod_count.fetch_add(1, Ordering::Relaxed);
                }
                None
            }
        }
    }

    /// Compare-and-replace: replaces the value mapped to `key` with
    /// `new_value` only if its current value equals `expected`. A key match
    /// whose value has been collected is pruned and reported as a failed
    /// comparison, same as `replace_value`.
    pub(crate) fn replace_value_if<Q>(&self, key: &Q, hash: u64, expected: &V, new_value: V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        let guard = &epoch::pin();
        let _held = self.lock.lock();
        self.pre_write_cleanup(guard);

        let array = self.current_array(guard);
        let mut cursor = array.bucket(hash).load(Ordering::Acquire, guard);
        let mut found: Option<Shared<'_, Entry<K, V>>> = None;

        while let Some(node) = unsafe { cursor.as_ref() } {
            if node.hash == hash {
                if let Some(candidate) = node.key() {
                    if matches(self.equivalence, &candidate, key) {
                        found = Some(cursor);
                        break;
                    }
                }
            }
            cursor = node.next.load(Ordering::Acquire, guard);
        }

        let found = match found {
            Some(found) => found,
            None => return false,
        };
        let node = unsafe { found.as_ref() }.expect("just matched above");

        match node.value(guard) {
            Some(current) if current.value() == expected => {
                let value_tracked = Tracked::new(new_value);
                self.register_value_site(&value_tracked, hash);
                let new_holder = Holder::new(self.value_strength, &value_tracked);
                let old_shared = node.swap_value(new_holder, guard);
                unsafe { guard.defer_destroy(old_shared) };
                true
            }
            Some(_) => false,
            None => {
                let removed = self.remove_matching(hash, guard, |_, shared| shared == found);
                if removed.is_some() {
                    self.count.fetch_sub(1, Ordering::Release);
                    self.mod_count.fetch_add(1, Ordering::Relaxed);
                }
                false
            }
        }
    }

    /// Removes the entry mapped to `key`, regardless of its current value.
    /// Returns the removed value, or `None` if no live entry matched — either
    /// because none existed, or because its value had already been collected.
    /// A collected entry is still physically pruned; its stale value is never
    /// returned.
    pub(crate) fn remove<Q>(&self, key: &Q, hash: u64) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let guard = &epoch::pin();
        let _held = self.lock.lock();
        self.pre_write_cleanup(guard);

        let mut found_value = None;
        let removed = self.remove_matching(hash, guard, |node, _shared| match node.key() {
            Some(candidate) if matches(self.equivalence, &candidate, key) => {
                found_value = node.value(guard).map(|v| v.value().clone());
                true
            }
            _ => false,
        });

        if removed.is_some() {
            self.count.fetch_sub(1, Ordering::Release);
            self.mod_count.fetch_add(1, Ordering::Relaxed);
        }

        found_value
    }

    /// Removes the entry mapped to `key` only if its current value equals
    /// `expected`. Reports `false` (without removing) if the value differs; a
    /// collected value is pruned but also reported as `false`.
    pub(crate) fn remove_if<Q>(&self, key: &Q, hash: u64, expected: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        let guard = &epoch::pin();
        let _held = self.lock.lock();
        self.pre_write_cleanup(guard);

        let mut reported = false;
        let removed = self.remove_matching(hash, guard, |node, _shared| match node.key() {
            Some(candidate) if matches(self.equivalence, &candidate, key) => match node.value(guard) {
                Some(current) if current.value() == expected => {
                    reported = true;
                    true
                }
                Some(_) => false,
                None => true,
            },
            _ => false,
        });

        if removed.is_some() {
            self.count.fetch_sub(1, Ordering::Release);
            self.mod_count.fetch_add(1, Ordering::Relaxed);
        }

        reported
    }

    /// Removes the entry whose key cell is the exact allocation backing
    /// `key_anchor`. The identity-equivalence counterpart to `remove`.
    pub(crate) fn remove_by_anchor(&self, key_anchor: &Anchor<K>, hash: u64) -> Option<V>
    where
        V: Clone,
    {
        let guard = &epoch::pin();
        let _held = self.lock.lock();
        self.pre_write_cleanup(guard);

        let mut found_value = None;
        let removed = self.remove_matching(hash, guard, |node, _shared| match node.key() {
            Some(candidate) if matches_anchor(&candidate, key_anchor) => {
                found_value = node.value(guard).map(|v| v.value().clone());
                true
            }
            _ => false,
        });

        if removed.is_some() {
            self.count.fetch_sub(1, Ordering::Release);
            self.mod_count.fetch_add(1, Ordering::Relaxed);
        }

        found_value
    }

    /// Drops every entry in this segment. Takes the lock once for the whole
    /// operation rather than once per entry.
    pub(crate) fn clear(&self) {
        let guard = &epoch::pin();
        let _held = self.lock.lock();
        self.pre_write_cleanup(guard);

        let array = self.current_array(guard);
        let mut removed_count = 0usize;

        for bucket in array.iter_buckets() {
            let mut cursor = bucket.swap(Shared::null(), Ordering::AcqRel, guard);
            while let Some(node) = unsafe { cursor.as_ref() } {
                let next = node.next.load(Ordering::Acquire, guard);
                unsafe { guard.defer_destroy(cursor) };
                removed_count += 1;
                cursor = next;
            }
        }

        self.count.fetch_sub(removed_count, Ordering::Release);
        self.mod_count.fetch_add(1, Ordering::Relaxed);
    }
}
