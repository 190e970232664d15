//! A segmented, lock-striped concurrent hash map with configurable key and
//! value reference strength.
//!
//! [`ConcurrentMap`] shards its entries across a fixed number of independently
//! lockable [`segment`]s, the same design `java.util.concurrent.ConcurrentHashMap`
//! and Guava's `MapMakerInternalMap` use: a read walks a segment's bucket chain
//! without ever taking a lock, and a write only ever holds the one segment's
//! lock it needs, so writers to different segments never contend and readers
//! never block on anything.
//!
//! Both keys and values can be held [`config::Strength::Strong`] (the map owns
//! a reference for as long as the entry exists) or [`config::Strength::Weak`]
//! (the map only observes liveness via an [`reference::Anchor`] the caller must
//! keep alive elsewhere). A weakly-held field that's been reclaimed is treated
//! as absent by every read path and is pruned the next time the owning
//! segment's reclamation queues are drained — eagerly on every write, and
//! amortized across roughly one in every 64 reads.
//!
//! ```
//! use strand_map::ConcurrentMap;
//!
//! let map: ConcurrentMap<String, i32> = ConcurrentMap::new();
//! map.insert("a".to_string(), 1);
//! map.insert("b".to_string(), 2);
//!
//! assert_eq!(map.get("a"), Some(1));
//! assert_eq!(map.len(), 2);
//! ```
//!
//! Building a map with non-default configuration goes through [`config::Builder`]:
//!
//! ```
//! use strand_map::config::{Builder, Strength};
//! use strand_map::ConcurrentMap;
//!
//! let config = Builder::new()
//!     .concurrency_level(16)
//!     .value_strength(Strength::Weak)
//!     .build()
//!     .unwrap();
//! let map: ConcurrentMap<String, std::sync::Arc<str>> = ConcurrentMap::with_config(config);
//! ```

pub mod config;
pub mod error;
pub mod iter;
pub(crate) mod map;
pub(crate) mod reclaim;
pub mod reference;
pub mod segment;

pub use config::{Builder, Equivalence, MapConfig, Strength};
pub use error::MapError;
pub use iter::{EntryIter, KeyIter, ValueIter};
pub use reference::Anchor;
pub use segment::map::ConcurrentMap;
