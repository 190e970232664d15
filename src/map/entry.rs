//! A single bucket-chain node.
//!
//! `hash` and `next` are set at construction and never reassigned: readers
//! that have already loaded a node can keep walking the rest of the chain
//! even while a writer rebuilds and republishes a new prefix ahead of it.
//! `value_ref` is the one field that does change in place, via an atomic swap, so
//! that a replacing `put` doesn't have to clone the whole suffix.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_epoch::{Atomic, Guard, Owned, Shared};

use crate::config::Strength;
use crate::reference::{Holder, Tracked};

/// A node in a segment's bucket chain.
pub(crate) struct Entry<K, V> {
    /// The pre-mixed hash computed under the configured key equivalence at
    /// insertion time. Never recomputed.
    pub(crate) hash: u64,
    /// Immutable once constructed; chain mutation proceeds by rebuilding the
    /// prefix and reusing this node's suffix unchanged.
    pub(crate) next: Atomic<Entry<K, V>>,
    /// Keys are never replaced in place; only the entry itself is replaced.
    pub(crate) key_ref: Holder<Tracked<K>>,
    /// The one mutable field: atomically replaceable by `put`/`replace`.
    pub(crate) value_ref: Atomic<Holder<Tracked<V>>>,
}

impl<K, V> Entry<K, V> {
    /// Builds a fresh, not-yet-published node. The caller is responsible for
    /// registering reclamation sites on `key_tracked`/`value_tracked` (see
    /// `bucket_array_ref::BucketArrayRef::register_key_site`/
    /// `register_value_site`) and for installing the returned node into a
    /// bucket slot.
    pub(crate) fn new<'g>(
        hash: u64,
        key_strength: Strength,
        key_tracked: &Arc<Tracked<K>>,
        value_strength: Strength,
        value_tracked: &Arc<Tracked<V>>,
        next: Shared<'g, Entry<K, V>>,
    ) -> Owned<Entry<K, V>> {
        let key_ref = Holder::new(key_strength, key_tracked);
        let value_ref = Holder::new(value_strength, value_tracked);

        Owned::new(Entry {
            hash,
            next: Atomic::from(next),
            key_ref,
            value_ref: Atomic::new(value_ref),
        })
    }

    /// Clones this node's key/value holders (not their referents — `Arc`/`Weak`
    /// clones preserve identity) into a new node with a different `next`. Used
    /// by the chain-rebuild protocol. The clone gets a fresh heap address, so
    /// reclamation notifications are keyed on [`Self::key_identity`] and
    /// [`Self::value_holder_identity`] instead, both of which survive the
    /// clone unchanged since neither re-registers anything here — the tracked
    /// cells themselves are unchanged, identity and all.
    pub(crate) fn clone_with_next<'g>(
        &self,
        guard: &'g Guard,
        next: Shared<'g, Entry<K, V>>,
    ) -> Owned<Entry<K, V>> {
        let value_ref = unsafe { self.value_ref.load(Ordering::Acquire, guard) };
        let value_holder = unsafe { value_ref.as_ref() }
            .expect("a live entry always has a value holder")
            .clone();

        Owned::new(Entry {
            hash: self.hash,
            next: Atomic::from(next),
            key_ref: self.key_ref.clone(),
            value_ref: Atomic::new(value_holder),
        })
    }

    /// An entry is live iff both its key and value holders currently resolve.
    pub(crate) fn is_live(&self, guard: &Guard) -> bool {
        if !self.key_ref.is_live() {
            return false;
        }

        let value_ref = unsafe { self.value_ref.load(Ordering::Acquire, guard) };
        match unsafe { value_ref.as_ref() } {
            Some(holder) => holder.is_live(),
            None => false,
        }
    }

    pub(crate) fn key(&self) -> Option<Arc<Tracked<K>>> {
        self.key_ref.get()
    }

    pub(crate) fn value(&self, guard: &Guard) -> Option<Arc<Tracked<V>>> {
        let value_ref = unsafe { self.value_ref.load(Ordering::Acquire, guard) };
        unsafe { value_ref.as_ref() }.and_then(Holder::get)
    }

    /// Swaps in a new value holder, returning the previous one so the caller can
    /// defer its destruction once safe.
    pub(crate) fn swap_value<'g>(
        &self,
        new_holder: Holder<Tracked<V>>,
        guard: &'g Guard,
    ) -> Shared<'g, Holder<Tracked<V>>> {
        self.value_ref.swap(Owned::new(new_holder), Ordering::AcqRel, guard)
    }

    /// The identity of this node's key cell's underlying allocation. Stable
    /// across `clone_with_next` (the clone shares the same `Arc`/`Weak`
    /// referent) — and therefore across relocation by a chain rebuild or an
    /// `expand()` — unlike this node's own heap address, so a key-reclamation
    /// notification can still find the entry after it has moved.
    pub(crate) fn key_identity(&self) -> usize {
        self.key_ref.identity()
    }

    /// The identity of the value holder currently installed, if any. Lets a
    /// value-reclamation notification confirm the value it names hasn't already
    /// been replaced by a later `put`/`replace` before removing the entry. Like
    /// `key_identity`, this is stable across relocation because the holder
    /// itself (and the `Tracked` allocation it points at) is what gets cloned,
    /// not recreated.
    pub(crate) fn value_holder_identity(&self, guard: &Guard) -> Option<usize> {
        let value_ref = unsafe { self.value_ref.load(Ordering::Acquire, guard) };
        unsafe { value_ref.as_ref() }.map(Holder::identity)
    }
}

impl<K, V> Drop for Entry<K, V> {
    /// `value_ref` boxes its `Holder` separately from this node (`Atomic::new`
    /// allocates), unlike the inline `key_ref`; a plain field-by-field drop of
    /// `Entry` would leak that box, so its current occupant is reclaimed here.
    /// `next` is left untouched: the suffix it points to is never uniquely
    /// owned by this node alone, only ever pruned as its own entry.
    fn drop(&mut self) {
        unsafe {
            let guard = &crossbeam_epoch::unprotected();
            let value_ref = self.value_ref.load(Ordering::Relaxed, guard);
            if !value_ref.is_null() {
                drop(value_ref.into_owned());
            }
        }
    }
}
