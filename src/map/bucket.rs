//! The per-segment bucket array: a fixed-size, power-of-two-length array of
//! atomically readable chain heads.
//!
//! Growing a segment never mutates this array in place — `expand` (in
//! `bucket_array_ref`) builds an entirely new, larger `BucketArray` and publishes
//! it by storing into the segment's `Atomic<BucketArray<K, V>>` slot, so a reader
//! that loaded the old array before an expand can keep walking it safely; the old
//! array and its nodes are reclaimed only once no pinned guard can still see them.

use crossbeam_epoch::Atomic;

use super::entry::Entry;

/// Bit-mixing function applied to a raw hash before it is used for segment or
/// bucket selection: a single-word avalanche, so that power-of-two masking
/// doesn't just reuse a poor hash function's low bits directly. This is the
/// same "smear" construction Guava's `MapMakerInternalMap` uses.
#[inline]
pub(crate) fn spread(hash: u64) -> u64 {
    let mut h = hash;
    h ^= (h >> 20) ^ (h >> 12);
    h ^ (h >> 7) ^ (h >> 4)
}

/// A segment's bucket array: every slot is a chain head, `None` represented as a
/// null `Shared` pointer.
pub(crate) struct BucketArray<K, V> {
    buckets: Box<[Atomic<Entry<K, V>>]>,
}

impl<K, V> BucketArray<K, V> {
    /// `capacity` must already be a power of two.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());

        let mut buckets = Vec::with_capacity(capacity);
        buckets.resize_with(capacity, Atomic::null);

        BucketArray {
            buckets: buckets.into_boxed_slice(),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub(crate) fn bucket_index(&self, hash: u64) -> usize {
        (hash as usize) & (self.capacity() - 1)
    }

    #[inline]
    pub(crate) fn bucket(&self, hash: u64) -> &Atomic<Entry<K, V>> {
        &self.buckets[self.bucket_index(hash)]
    }

    pub(crate) fn bucket_at(&self, index: usize) -> &Atomic<Entry<K, V>> {
        &self.buckets[index]
    }

    pub(crate) fn iter_buckets(&self) -> impl DoubleEndedIterator<Item = &Atomic<Entry<K, V>>> {
        self.buckets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spread_is_not_the_identity_function() {
        // A real avalanche mix should touch more than the bottom bits for at
        // least one of these inputs.
        assert_ne!(spread(1), 1);
        assert_ne!(spread(0xabcd_ef01_2345_6789), 0xabcd_ef01_2345_6789);
    }

    #[test]
    fn bucket_index_respects_capacity_mask() {
        let array: BucketArray<u32, u32> = BucketArray::with_capacity(16);
        assert_eq!(array.bucket_index(0), 0);
        assert_eq!(array.bucket_index(16), 0);
        assert_eq!(array.bucket_index(17), 1);
    }
}
