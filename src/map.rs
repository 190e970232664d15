//! The pieces a segment is built from: the bucket array, its chain nodes, and
//! the operation set that walks them. Kept separate from [`crate::segment`],
//! which owns the segment struct itself and the top-level map facade — the
//! same split Guava's `MapMakerInternalMap` draws between its table/bucket
//! layer and its segment layer.

pub(crate) mod bucket;
pub(crate) mod bucket_array_ref;
pub(crate) mod entry;

/// The default hasher, matching the source's choice of a fast non-cryptographic
/// hash: concurrent maps hash on every read, so a SipHash-grade DoS-resistant
/// default would tax every lookup for a property these maps don't advertise.
pub(crate) type DefaultHashBuilder = ahash::RandomState;
