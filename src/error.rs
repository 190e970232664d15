//! Error taxonomy for boundary failures.
//!
//! Everything below the boundary (segment operations, the reclamation engine, bulk
//! reads) never produces an error: a stale entry is treated as absent, a queue drain
//! that finds nothing is a no-op, and a resize request past the configured maximum
//! is silently refused. `MapError` only ever surfaces from configuration and from
//! the handful of public entry points that take arguments a caller could get wrong.

use thiserror::Error;

/// Failures that can be observed at the public API boundary.
///
/// Internal state never produces an unchecked failure; see the module docs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MapError {
    /// A configuration value or argument was rejected before any state changed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl MapError {
    pub(crate) fn dummy_value_requires_strong_values() -> Self {
        MapError::InvalidArgument("dummy-value (intern-set) mode requires strong value strength")
    }

    pub(crate) fn zero_concurrency_level() -> Self {
        MapError::InvalidArgument("concurrency_level must be at least 1")
    }
}
