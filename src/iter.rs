//! Weakly consistent iteration.
//!
//! An iterator reflects a snapshot taken at construction time: entries live at
//! that instant are all visited exactly once, in descending segment and bucket
//! order; entries inserted or removed afterward are simply not reflected
//! either way. This is the same guarantee `java.util.concurrent`'s own
//! concurrent collections give their iterators, and it sidesteps having to
//! keep an epoch guard pinned for the iterator's entire (caller-controlled)
//! lifetime.

use std::hash::{BuildHasher, Hash};
use std::sync::atomic::Ordering;

use crossbeam_epoch as epoch;

use crate::reference::Anchor;
use crate::segment::map::ConcurrentMap;

fn snapshot<K, V, S>(map: &ConcurrentMap<K, V, S>) -> Vec<(Anchor<K>, V)>
where
    V: Clone,
{
    let mut items = Vec::new();

    for segment in map.segments().iter().rev() {
        let bucket_ref = map.bucket_array_ref_for_iter(segment);
        let guard = &epoch::pin();
        let array = bucket_ref.current_array(guard);

        for bucket in array.iter_buckets().rev() {
            let mut cursor = bucket.load(Ordering::Acquire, guard);
            while let Some(node) = unsafe { cursor.as_ref() } {
                if let (Some(key), Some(value)) = (node.key(), node.value(guard)) {
                    items.push((Anchor(key), value.value().clone()));
                }
                bucket_ref.note_iteration_step(guard);
                cursor = node.next.load(Ordering::Acquire, guard);
            }
        }
    }

    items
}

/// Snapshot iterator over `(Anchor<K>, V)` pairs.
pub struct EntryIter<'m, K, V, S> {
    map: &'m ConcurrentMap<K, V, S>,
    items: std::vec::IntoIter<(Anchor<K>, V)>,
    last: Option<Anchor<K>>,
}

impl<'m, K, V, S> EntryIter<'m, K, V, S>
where
    V: Clone,
{
    pub(crate) fn new(map: &'m ConcurrentMap<K, V, S>) -> Self {
        EntryIter {
            map,
            items: snapshot(map).into_iter(),
            last: None,
        }
    }
}

impl<'m, K, V, S> Iterator for EntryIter<'m, K, V, S> {
    type Item = (Anchor<K>, V);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.items.next()?;
        self.last = Some(item.0.clone());
        Some(item)
    }
}

impl<'m, K, V, S> EntryIter<'m, K, V, S>
where
    K: Hash + Eq,
    V: Clone,
    S: BuildHasher,
{
    /// Removes the entry most recently yielded by `next`, from the live map —
    /// not just from this snapshot. A no-op if it was already removed by
    /// someone else since the snapshot was taken.
    pub fn remove_last(&mut self) -> Option<V> {
        let anchor = self.last.take()?;
        self.map.remove_by_anchor(&anchor)
    }
}

/// Snapshot iterator over keys, exposed as their [`Anchor`].
pub struct KeyIter<'m, K, V, S> {
    inner: EntryIter<'m, K, V, S>,
}

impl<'m, K, V, S> KeyIter<'m, K, V, S>
where
    V: Clone,
{
    pub(crate) fn new(map: &'m ConcurrentMap<K, V, S>) -> Self {
        KeyIter { inner: EntryIter::new(map) }
    }
}

impl<'m, K, V, S> Iterator for KeyIter<'m, K, V, S> {
    type Item = Anchor<K>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, _)| key)
    }
}

/// Snapshot iterator over values.
pub struct ValueIter<'m, K, V, S> {
    inner: EntryIter<'m, K, V, S>,
}

impl<'m, K, V, S> ValueIter<'m, K, V, S>
where
    V: Clone,
{
    pub(crate) fn new(map: &'m ConcurrentMap<K, V, S>) -> Self {
        ValueIter { inner: EntryIter::new(map) }
    }
}

impl<'m, K, V, S> Iterator for ValueIter<'m, K, V, S> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, value)| value)
    }
}
