//! The segment layer: a fixed-size array of independently lock-striped
//! segments, each a full bucket-chained sub-map in its own right, plus the
//! public-facing map type built on top of them.

pub mod map;
