//! End-to-end scenarios against the public [`strand_map::ConcurrentMap`] API,
//! covering the concrete scenarios spelled out for this table (basic
//! round-trip, replace semantics, resize correctness, weak-value reclamation,
//! concurrent put/remove, and contains_value convergence under a moving
//! value).

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use strand_map::config::{Builder, Equivalence, Strength};
use strand_map::ConcurrentMap;

/// S1 — basic round-trip: strong/strong map, capacity 16.
#[test]
fn basic_round_trip() {
    let map: ConcurrentMap<String, i32> = ConcurrentMap::new();
    map.insert("a".to_string(), 1);
    map.insert("b".to_string(), 2);

    assert_eq!(map.get("a"), Some(1));
    assert_eq!(map.get("b"), Some(2));
    assert_eq!(map.len(), 2);

    let seen: HashSet<(String, i32)> = map.iter().map(|(k, v)| (k.get().clone(), v)).collect();
    let expected: HashSet<(String, i32)> = [("a".to_string(), 1), ("b".to_string(), 2)].into_iter().collect();
    assert_eq!(seen, expected);
}

/// S2 — replace semantics: compare-and-replace succeeds once, then fails on a
/// stale expectation.
#[test]
fn replace_semantics() {
    let map: ConcurrentMap<&str, i32> = ConcurrentMap::new();
    map.insert("k", 10);

    assert!(map.replace_if("k", &10, 20));
    assert!(!map.replace_if("k", &10, 30));
    assert_eq!(map.get("k"), Some(20));
}

/// S3 — resize correctness: a small initial capacity forces several expands
/// while every inserted key stays retrievable and lands under the resized
/// mask.
#[test]
fn resize_correctness() {
    let config = Builder::new().initial_capacity(4).concurrency_level(1).build().unwrap();
    let map: ConcurrentMap<i32, i32> = ConcurrentMap::with_config(config);

    for i in 0..100 {
        map.insert(i, i * 10);
    }

    for i in 0..100 {
        assert_eq!(map.get(&i), Some(i * 10));
    }

    assert_eq!(map.len(), 100);
    assert_eq!(map.iter().count(), 100);
}

/// S4 — weak-value reclamation: dropping the last anchor must make the entry
/// observably absent, and a bounded number of subsequent reads must
/// physically prune it.
#[test]
fn weak_value_reclamation() {
    let config = Builder::new().value_strength(Strength::Weak).build().unwrap();
    let map: ConcurrentMap<&str, Arc<i32>> = ConcurrentMap::with_config(config);

    let (_, _, value_anchor) = map.insert_full("x", Arc::new(42));
    assert_eq!(map.get("x").map(|v| *v), Some(42));

    drop(value_anchor);
    assert_eq!(map.get("x"), None);

    // Amortized cleanup triggers at most once every 64 reads; run enough reads
    // to guarantee at least one drain opportunity fires.
    for _ in 0..70 {
        let _ = map.get("x");
    }

    assert_eq!(map.len(), 0);
}

/// S4 (key side) — the same guarantee for a weakly-held key. Overrides the
/// default identity equivalence with value equality so the test can poll
/// through the ordinary `get` path rather than needing a still-live anchor.
#[test]
fn weak_key_reclamation() {
    let config = Builder::new()
        .key_strength(Strength::Weak)
        .key_equivalence(Equivalence::Equals)
        .build()
        .unwrap();
    let map: ConcurrentMap<String, i32> = ConcurrentMap::with_config(config);

    let (_, key_anchor, _) = map.insert_full("x".to_string(), 1);
    assert_eq!(map.get("x"), Some(1));

    drop(key_anchor);
    assert_eq!(map.get("x"), None);

    for _ in 0..70 {
        let _ = map.get("x");
    }

    assert_eq!(map.len(), 0);
}

/// Regression: a weak value's reclamation must still be found and pruned after
/// its owning entry has been relocated to a freshly cloned node by `expand()`
/// — reclamation notifications are keyed on the `Tracked` allocation's own
/// identity precisely so a relocation in between "anchor dropped" and "next
/// drain" doesn't strand the notification against a stale node address.
#[test]
fn weak_value_reclamation_survives_relocation_by_expand() {
    let config = Builder::new()
        .initial_capacity(4)
        .concurrency_level(1)
        .value_strength(Strength::Weak)
        .build()
        .unwrap();
    let map: ConcurrentMap<i32, Arc<i32>> = ConcurrentMap::with_config(config);

    let (_, _, target_anchor) = map.insert_full(0, Arc::new(0));

    // Keep every other value's anchor alive, then insert enough of them into a
    // single 4-slot segment to force several `expand()`s, relocating key 0's
    // entry (among everyone else's) into fresh cloned nodes along the way.
    let mut kept_anchors = Vec::new();
    for i in 1..200 {
        let (_, _, anchor) = map.insert_full(i, Arc::new(i));
        kept_anchors.push(anchor);
    }

    assert_eq!(map.get(&0).map(|v| *v), Some(0));

    drop(target_anchor);
    assert_eq!(map.get(&0), None);

    for _ in 0..70 {
        let _ = map.get(&0);
    }

    assert_eq!(map.len(), kept_anchors.len());
    assert_eq!(map.iter().count(), kept_anchors.len());
    assert_eq!(map.get(&199).map(|v| *v), Some(199));
}

/// S5 — concurrent put/remove invariant: disjoint key ranges across threads,
/// final size matches the algebraic insert-count minus remove-count.
#[test]
fn concurrent_put_remove_invariant() {
    const THREADS: usize = 8;
    const OPS_PER_THREAD: i32 = 2_000;

    let map: Arc<ConcurrentMap<i32, i32>> = Arc::new(ConcurrentMap::new());

    let handles: Vec<_> = (0..THREADS as i32)
        .map(|t| {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                let base = t * OPS_PER_THREAD;
                for i in 0..OPS_PER_THREAD {
                    map.insert(base + i, i);
                }
                for i in 0..OPS_PER_THREAD / 2 {
                    map.remove(&(base + i));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let expected = THREADS as i32 * (OPS_PER_THREAD - OPS_PER_THREAD / 2);
    assert_eq!(map.len(), expected as usize);

    let recount = map.iter().count();
    assert_eq!(recount, expected as usize);
}

/// S6 — contains_value convergence: a writer repeatedly moves one value
/// between two keys while a reader polls contains_value; the reader must
/// never spuriously conclude the value is absent while it's continuously
/// present under some key.
#[test]
fn contains_value_convergence_under_moving_value() {
    let map: Arc<ConcurrentMap<&str, i32>> = Arc::new(ConcurrentMap::new());
    map.insert("a", 99);

    let writer_map = Arc::clone(&map);
    let writer = thread::spawn(move || {
        for _ in 0..5_000 {
            writer_map.remove("a");
            writer_map.insert("b", 99);
            writer_map.remove("b");
            writer_map.insert("a", 99);
        }
    });

    // The value is present at every instant except the brief window between a
    // remove and its paired insert; contains_value's retry/mod_count scheme
    // only guarantees no false negative while a value is continuously present,
    // so this just exercises the convergence path without asserting every
    // poll returns true.
    for _ in 0..2_000 {
        let _ = map.contains_value(&99);
    }

    writer.join().unwrap();
    assert!(map.contains_value(&99) || map.len() == 1);
}

/// Boundary: `initial_capacity = 0` still yields a working map.
#[test]
fn zero_initial_capacity_still_works() {
    let config = Builder::new().initial_capacity(0).build().unwrap();
    let map: ConcurrentMap<i32, i32> = ConcurrentMap::with_config(config);

    assert_eq!(map.len(), 0);
    map.insert(1, 1);
    assert_eq!(map.get(&1), Some(1));
}

/// Boundary: `concurrency_level = 1` collapses to a single segment.
#[test]
fn single_segment_concurrency_level() {
    let config = Builder::new().concurrency_level(1).build().unwrap();
    let map: ConcurrentMap<i32, i32> = ConcurrentMap::with_config(config);

    assert_eq!(map.num_segments(), 1);
    for i in 0..50 {
        map.insert(i, i);
    }
    assert_eq!(map.len(), 50);
}

/// `put_if_absent` idempotence: the first call wins, the second is a no-op
/// that reports the existing value.
#[test]
fn put_if_absent_idempotence() {
    let map: ConcurrentMap<&str, i32> = ConcurrentMap::new();

    let (existing, _, _) = map.insert_full_if_absent("k", 1);
    assert_eq!(existing, None);

    let (existing, _, _) = map.insert_full_if_absent("k", 2);
    assert_eq!(existing, Some(1));
    assert_eq!(map.get("k"), Some(1));
}

/// `remove` is idempotent: removing an already-absent key returns `None`.
#[test]
fn remove_is_idempotent() {
    let map: ConcurrentMap<&str, i32> = ConcurrentMap::new();
    map.insert("k", 1);

    assert_eq!(map.remove("k"), Some(1));
    assert_eq!(map.remove("k"), None);
}

/// `get_entry` captures the key's anchor and its value atomically.
#[test]
fn get_entry_returns_value_and_key_anchor() {
    let map: ConcurrentMap<String, i32> = ConcurrentMap::new();
    map.insert("k".to_string(), 7);

    let (anchor, value) = map.get_entry("k").unwrap();
    assert_eq!(value, 7);
    assert_eq!(anchor.get(), "k");
    assert_eq!(map.get_by_anchor(&anchor), Some(7));
}

/// `clear` empties the map and a fresh `put`/`get` behaves as on a new map.
#[test]
fn clear_resets_the_map() {
    let map: ConcurrentMap<&str, i32> = ConcurrentMap::new();
    map.insert("a", 1);
    map.insert("b", 2);

    map.clear();
    assert_eq!(map.len(), 0);
    assert!(map.is_empty());

    map.insert("a", 3);
    assert_eq!(map.get("a"), Some(3));
}
