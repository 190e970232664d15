//! The reclamation engine's shared vocabulary: what a reclamation notification
//! looks like, and the caps that bound how much drain work any one opportunity
//! does.
//!
//! The actual drain loops (`drain_key_queue`, `drain_value_queue`) live in
//! [`crate::map::bucket_array_ref`] next to the chain-rebuild code they share,
//! since draining a queue is really just "remove this entry" with the entry
//! identified a different way. This module only owns the notification shape and
//! the segment-independent constants.

use std::fmt;
use std::sync::Arc;

use crossbeam_queue::SegQueue;

/// Maximum notifications drained from one queue per drain opportunity.
pub(crate) const DRAIN_MAX: usize = 16;

/// A read schedules a drain attempt once every `DRAIN_THRESHOLD + 1` reads, i.e.
/// when `read_count & DRAIN_THRESHOLD == 0`. `DRAIN_THRESHOLD = 63` means "about
/// one in every 64 reads".
pub(crate) const DRAIN_THRESHOLD: usize = 63;

/// Retry bound for `contains_value`'s mod-count convergence scan.
pub(crate) const CONTAINS_VALUE_RETRIES: usize = 3;

/// A notification that some tracked cell's last strong owner has been dropped.
///
/// Carries just enough to let the drain loop decide, without re-walking the whole
/// table, whether the notification is still actionable: if the entry has already
/// been pruned, or its value has since been replaced, the notification is a
/// no-op rather than removing something it no longer names. Identities here are
/// keyed on the `Tracked` allocation itself (`key_ptr`/`value_ptr`), not the
/// owning `Entry` node's address — a node gets cloned to a new address by every
/// chain rebuild (`expand`, prefix removal), but its key/value holders, and the
/// `Tracked` cells they point at, carry over unchanged.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Notification {
    /// A key cell died. `key_ptr` is the address of the `Tracked<K>` allocation
    /// that died, stable across any relocation of the owning entry; `hash`
    /// locates the bucket to scan without walking the whole segment.
    Key { key_ptr: usize, hash: u64 },
    /// A value cell died. `hash` locates the bucket; `value_ptr` is the
    /// identity of the specific value holder that died, so a value replaced
    /// since the notification was enqueued is correctly ignored.
    Value { hash: u64, value_ptr: usize },
}

/// Where a [`crate::reference::Tracked`] cell sends its death notice.
///
/// Constructed once a key/value `Tracked` cell has been attached to a bucket
/// chain and registered via `Tracked::register`; `Drop` on the tracked cell
/// calls [`ReclaimSite::notify`] at most once.
pub(crate) enum ReclaimSite {
    Key {
        queue: Arc<SegQueue<Notification>>,
        key_ptr: usize,
        hash: u64,
    },
    Value {
        queue: Arc<SegQueue<Notification>>,
        hash: u64,
        value_ptr: usize,
    },
}

impl ReclaimSite {
    pub(crate) fn notify(&self) {
        match self {
            ReclaimSite::Key { queue, key_ptr, hash } => {
                queue.push(Notification::Key {
                    key_ptr: *key_ptr,
                    hash: *hash,
                });
            }
            ReclaimSite::Value { queue, hash, value_ptr } => {
                queue.push(Notification::Value {
                    hash: *hash,
                    value_ptr: *value_ptr,
                });
            }
        }
    }
}

impl fmt::Debug for ReclaimSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReclaimSite::Key { key_ptr, hash, .. } => f
                .debug_struct("ReclaimSite::Key")
                .field("key_ptr", key_ptr)
                .field("hash", hash)
                .finish(),
            ReclaimSite::Value { hash, value_ptr, .. } => f
                .debug_struct("ReclaimSite::Value")
                .field("hash", hash)
                .field("value_ptr", value_ptr)
                .finish(),
        }
    }
}

/// Whether a read at this (post-increment) `read_count` should schedule a
/// drain attempt: about once every `DRAIN_THRESHOLD + 1` reads.
#[inline]
pub(crate) fn should_amortize_drain(read_count: usize) -> bool {
    read_count & DRAIN_THRESHOLD == 0
}
