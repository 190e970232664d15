//! Reference cells: the strong/weak holder abstraction entries are built from, and
//! the `Tracked<T>` / `Anchor<T>` pair that stands in for a host runtime's
//! reachability machinery in a language with no tracing collector.
//!
//! Rust has no equivalent of `java.lang.ref.WeakReference<T>` over an arbitrary
//! live object: liveness here is just refcounting. So a weak-strength cell is built
//! from `Arc<Tracked<T>>` / `std::sync::Weak<Tracked<T>>`, and the "something else"
//! that keeps a weakly-held key or value alive is the [`Anchor`] handed back from
//! the insertion call that created it. Dropping the last `Anchor` is what a host
//! GC reclaiming the referent stands in for here: it runs `Tracked::drop`, which
//! pushes a notification onto the owning segment's reclamation queue.

use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::config::Equivalence;
use crate::reclaim::{Notification, ReclaimSite};

/// The tracked cell behind every key and value stored in the map.
///
/// Wraps the caller's `T` with a back-pointer to the segment queue that should be
/// notified when this allocation's last strong owner goes away. The back-pointer
/// is unset (`None`) until the owning entry exists (so that we know its address),
/// and stays unset forever for strong-strength fields, which makes `Drop` a no-op
/// for them — there is nothing to notify since the map itself is the owner.
pub(crate) struct Tracked<T> {
    value: T,
    site: Mutex<Option<ReclaimSite>>,
}

impl<T> Tracked<T> {
    pub(crate) fn new(value: T) -> Arc<Self> {
        Arc::new(Tracked {
            value,
            site: Mutex::new(None),
        })
    }

    pub(crate) fn value(&self) -> &T {
        &self.value
    }

    /// Registers (or replaces) the reclamation site notified when this cell's last
    /// strong owner is dropped. Called once, right after the owning `Entry` has
    /// been assigned a stable address.
    pub(crate) fn register(&self, site: ReclaimSite) {
        *self.site.lock() = Some(site);
    }
}

impl<T> Drop for Tracked<T> {
    fn drop(&mut self) {
        // `&mut self`: we have exclusive access already, no need to go through the
        // lock.
        if let Some(site) = self.site.get_mut().take() {
            site.notify();
        }
    }
}

/// A strong or weak holder over a tracked cell.
///
/// An `Entry<K, V>` is built from one `Holder<Tracked<K>>` and one
/// `Holder<Tracked<V>>`, so the strong/weak combination for keys and values is
/// orthogonal instead of hand-duplicated into four structs.
pub(crate) enum Holder<T> {
    Strong(Arc<T>),
    Weak(Weak<T>),
}

impl<T> Holder<T> {
    pub(crate) fn new(strength: crate::config::Strength, tracked: &Arc<T>) -> Self {
        match strength {
            crate::config::Strength::Strong => Holder::Strong(Arc::clone(tracked)),
            crate::config::Strength::Weak => Holder::Weak(Arc::downgrade(tracked)),
        }
    }

    /// Attempts to upgrade to a strong handle. `None` means this cell is
    /// collected: a weak holder whose referent's last `Anchor` has been dropped.
    pub(crate) fn get(&self) -> Option<Arc<T>> {
        match self {
            Holder::Strong(arc) => Some(Arc::clone(arc)),
            Holder::Weak(weak) => weak.upgrade(),
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        match self {
            Holder::Strong(_) => true,
            Holder::Weak(weak) => weak.upgrade().is_some(),
        }
    }

    /// A stable identity for this holder's referent, usable to detect "has this
    /// cell been replaced since a notification was enqueued".
    pub(crate) fn identity(&self) -> usize {
        match self {
            Holder::Strong(arc) => Arc::as_ptr(arc) as usize,
            Holder::Weak(weak) => weak.as_ptr() as usize,
        }
    }
}

impl<T> Clone for Holder<T> {
    fn clone(&self) -> Self {
        match self {
            Holder::Strong(arc) => Holder::Strong(Arc::clone(arc)),
            Holder::Weak(weak) => Holder::Weak(Weak::clone(weak)),
        }
    }
}

/// The caller-visible strong handle returned by insertion.
///
/// For a strong-strength field this is a harmless extra reference — the map
/// already keeps its own and the field never disappears on its own, so dropping
/// the anchor immediately changes nothing. For a weak-strength field, this *is*
/// the referent's only strong owner: the entry can be collected the moment every
/// clone of this anchor is dropped.
pub struct Anchor<T>(pub(crate) Arc<Tracked<T>>);

impl<T> Anchor<T> {
    pub fn get(&self) -> &T {
        self.0.value()
    }
}

impl<T> Clone for Anchor<T> {
    fn clone(&self) -> Self {
        Anchor(Arc::clone(&self.0))
    }
}

/// Hashes a tracked key cell per the configured [`Equivalence`].
pub(crate) fn equivalence_hash<K: Hash, S: BuildHasher>(
    equivalence: Equivalence,
    build_hasher: &S,
    key: &Arc<Tracked<K>>,
) -> u64 {
    let mut hasher = build_hasher.build_hasher();
    match equivalence {
        Equivalence::Equals => key.value().hash(&mut hasher),
        Equivalence::Identity => (Arc::as_ptr(key) as usize).hash(&mut hasher),
    }
    hasher.finish()
}

/// Compares two tracked key cells per the configured [`Equivalence`].
pub(crate) fn equivalence_eq<K: Eq>(
    equivalence: Equivalence,
    a: &Arc<Tracked<K>>,
    b: &Arc<Tracked<K>>,
) -> bool {
    match equivalence {
        Equivalence::Equals => a.value() == b.value(),
        Equivalence::Identity => Arc::ptr_eq(a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Strength;
    use crossbeam_queue::SegQueue;
    use std::sync::Arc as StdArc;

    #[test]
    fn strong_holder_is_always_live() {
        let tracked = Tracked::new(42);
        let holder = Holder::new(Strength::Strong, &tracked);
        drop(tracked);
        assert!(holder.is_live());
        assert_eq!(*holder.get().unwrap().value(), 42);
    }

    #[test]
    fn weak_holder_dies_with_the_anchor() {
        let tracked = Tracked::new(42);
        let holder = Holder::new(Strength::Weak, &tracked);
        assert!(holder.is_live());
        drop(tracked);
        assert!(!holder.is_live());
        assert!(holder.get().is_none());
    }

    #[test]
    fn dropping_the_last_strong_owner_notifies_the_registered_site() {
        let queue = StdArc::new(SegQueue::new());
        let tracked = Tracked::new("x");
        let key_ptr = StdArc::as_ptr(&tracked) as usize;
        tracked.register(ReclaimSite::Key {
            queue: StdArc::clone(&queue),
            key_ptr,
            hash: 7,
        });
        let holder = Holder::new(Strength::Weak, &tracked);
        assert!(holder.is_live());

        drop(tracked);

        match queue.pop() {
            Ok(Notification::Key { key_ptr: notified_ptr, hash }) => {
                assert_eq!(notified_ptr, key_ptr);
                assert_eq!(hash, 7);
            }
            other => panic!("expected a key notification, got {:?}", other.is_ok()),
        }
    }
}
