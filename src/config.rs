//! Configuration surface.
//!
//! This is the plain configuration value that stands as this crate's only
//! construction surface: a generic, type-changing fluent builder (the Guava
//! `MapMaker`-style API) stays an external collaborator. `Builder` here just
//! gathers the handful of knobs a map needs and validates them once, up
//! front, so that [`crate::ConcurrentMap::with_config`] never has to fail
//! partway through allocating segments.

use crate::error::MapError;

/// Hard ceiling on a single segment's bucket array, matching the host collection's
/// historical `MAXIMUM_CAPACITY`. Past this, `expand` is a no-op and chains grow.
pub const MAX_CAPACITY: usize = 1 << 30;

/// Hard ceiling on the number of segments. `concurrency_level` is clamped here
/// before being rounded up to a power of two.
pub const MAX_SEGMENTS: usize = 1 << 16;

/// Default number of segments when the caller doesn't ask for a particular
/// concurrency level.
pub const DEFAULT_CONCURRENCY_LEVEL: usize = 4;

/// Default per-segment starting capacity.
pub const DEFAULT_INITIAL_CAPACITY: usize = 16;

/// The load factor past which a segment expands, expressed as in the source: 3/4.
pub const LOAD_FACTOR_NUM: usize = 3;
pub const LOAD_FACTOR_DENOM: usize = 4;

/// Whether a key or value slot is held strongly (the map owns a reference for as
/// long as the entry exists) or weakly (the map only observes liveness; an external
/// [`crate::reference::Anchor`] must be kept alive for the entry to survive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strength {
    /// The map keeps its own strong reference; the entry never disappears on its
    /// own.
    Strong,
    /// The map keeps only a weak reference; the entry is collected as soon as the
    /// caller's [`crate::reference::Anchor`] is dropped.
    Weak,
}

impl Default for Strength {
    fn default() -> Self {
        Strength::Strong
    }
}

/// The strategy used to hash and compare keys.
///
/// `Equals` hashes and compares by the key's own `Hash`/`Eq` implementation.
/// `Identity` hashes and compares by the address of the key's allocation,
/// independent of its `Hash`/`Eq` impls — the natural choice once a key may be
/// reclaimed out from under its hash code, since a collected key can no longer be
/// asked to hash itself consistently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Equivalence {
    Equals,
    Identity,
}

impl Equivalence {
    /// The equivalence a given key strength defaults to when none is specified.
    pub fn default_for(strength: Strength) -> Self {
        match strength {
            Strength::Strong => Equivalence::Equals,
            Strength::Weak => Equivalence::Identity,
        }
    }
}

/// A fully validated, immutable configuration for a [`crate::ConcurrentMap`].
///
/// Build one with [`Builder`]; `MapConfig` itself has no public constructor so that
/// an instance in hand is always known-valid.
#[derive(Debug, Clone)]
pub struct MapConfig {
    pub(crate) initial_capacity: usize,
    pub(crate) num_segments: usize,
    pub(crate) key_strength: Strength,
    pub(crate) value_strength: Strength,
    pub(crate) key_equivalence: Equivalence,
    pub(crate) dummy_value: bool,
}

impl MapConfig {
    pub fn initial_capacity(&self) -> usize {
        self.initial_capacity
    }

    pub fn num_segments(&self) -> usize {
        self.num_segments
    }

    pub fn key_strength(&self) -> Strength {
        self.key_strength
    }

    pub fn value_strength(&self) -> Strength {
        self.value_strength
    }

    pub fn key_equivalence(&self) -> Equivalence {
        self.key_equivalence
    }

    pub fn is_dummy_value(&self) -> bool {
        self.dummy_value
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Builder::new().build().expect("default configuration is always valid")
    }
}

/// Fluent builder for [`MapConfig`].
#[derive(Debug, Clone)]
pub struct Builder {
    initial_capacity: usize,
    concurrency_level: usize,
    key_strength: Strength,
    value_strength: Strength,
    key_equivalence: Option<Equivalence>,
    dummy_value: bool,
}

impl Builder {
    pub fn new() -> Self {
        Builder {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            concurrency_level: DEFAULT_CONCURRENCY_LEVEL,
            key_strength: Strength::Strong,
            value_strength: Strength::Strong,
            key_equivalence: None,
            dummy_value: false,
        }
    }

    /// Sets the initial total capacity, clamped to [`MAX_CAPACITY`].
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity.min(MAX_CAPACITY);
        self
    }

    /// Sets the target concurrency level (number of segments before rounding up to
    /// a power of two), clamped to [`MAX_SEGMENTS`].
    pub fn concurrency_level(mut self, level: usize) -> Self {
        self.concurrency_level = level.min(MAX_SEGMENTS);
        self
    }

    pub fn key_strength(mut self, strength: Strength) -> Self {
        self.key_strength = strength;
        self
    }

    pub fn value_strength(mut self, strength: Strength) -> Self {
        self.value_strength = strength;
        self
    }

    /// Overrides the default key equivalence (see [`Equivalence::default_for`]).
    pub fn key_equivalence(mut self, equivalence: Equivalence) -> Self {
        self.key_equivalence = Some(equivalence);
        self
    }

    /// Enables dummy-value (intern-set) mode: the map stores no per-entry value,
    /// treating every key as mapped to a single process-wide marker. Requires
    /// strong value strength.
    pub fn dummy_value(mut self, enabled: bool) -> Self {
        self.dummy_value = enabled;
        self
    }

    /// Validates the accumulated options and produces a [`MapConfig`].
    pub fn build(self) -> Result<MapConfig, MapError> {
        if self.concurrency_level == 0 {
            return Err(MapError::zero_concurrency_level());
        }

        if self.dummy_value && self.value_strength == Strength::Weak {
            return Err(MapError::dummy_value_requires_strong_values());
        }

        let num_segments = self.concurrency_level.next_power_of_two().min(MAX_SEGMENTS);
        let key_equivalence = self
            .key_equivalence
            .unwrap_or_else(|| Equivalence::default_for(self.key_strength));

        Ok(MapConfig {
            initial_capacity: self.initial_capacity.min(MAX_CAPACITY),
            num_segments,
            key_strength: self.key_strength,
            value_strength: self.value_strength,
            key_equivalence,
            dummy_value: self.dummy_value,
        })
    }
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_are_strong_strong_four_segments() {
        let config = Builder::new().build().unwrap();
        assert_eq!(config.initial_capacity(), DEFAULT_INITIAL_CAPACITY);
        assert_eq!(config.num_segments(), DEFAULT_CONCURRENCY_LEVEL);
        assert_eq!(config.key_strength(), Strength::Strong);
        assert_eq!(config.value_strength(), Strength::Strong);
        assert_eq!(config.key_equivalence(), Equivalence::Equals);
        assert!(!config.is_dummy_value());
    }

    #[test]
    fn concurrency_level_rounds_up_to_power_of_two() {
        let config = Builder::new().concurrency_level(5).build().unwrap();
        assert_eq!(config.num_segments(), 8);
    }

    #[test]
    fn concurrency_level_is_clamped() {
        let config = Builder::new().concurrency_level(MAX_SEGMENTS * 4).build().unwrap();
        assert_eq!(config.num_segments(), MAX_SEGMENTS);
    }

    #[test]
    fn initial_capacity_is_clamped() {
        let config = Builder::new().initial_capacity(MAX_CAPACITY * 4).build().unwrap();
        assert_eq!(config.initial_capacity(), MAX_CAPACITY);
    }

    #[test]
    fn weak_keys_default_to_identity_equivalence() {
        let config = Builder::new().key_strength(Strength::Weak).build().unwrap();
        assert_eq!(config.key_equivalence(), Equivalence::Identity);
    }

    #[test]
    fn zero_concurrency_level_is_rejected() {
        let err = Builder::new().concurrency_level(0).build().unwrap_err();
        assert_eq!(err, MapError::zero_concurrency_level());
    }

    #[test]
    fn dummy_value_with_weak_values_is_rejected() {
        let err = Builder::new()
            .dummy_value(true)
            .value_strength(Strength::Weak)
            .build()
            .unwrap_err();
        assert_eq!(err, MapError::dummy_value_requires_strong_values());
    }
}
