//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check key derivation, storage round-trips and the
//! eviction bounds of the store.

use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tempfile::tempdir;
use tokio_test::block_on;

use crate::cache::{derive_key, CacheStore, Metadata};

// == Test Configuration ==
const TEST_TTL: Duration = Duration::from_secs(300);

// == Strategies ==
/// Generates avatar-like resource paths
fn path_strategy() -> impl Strategy<Value = String> {
    "[a-f0-9]{1,32}".prop_map(|hash| format!("/avatar/{}", hash))
}

/// Generates whitelisted query parameters with distinct names
fn params_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::hash_map(
        prop::sample::select(vec!["s", "d", "r", "f"]),
        "[a-z0-9]{1,12}",
        0..=4,
    )
    .prop_map(|map| {
        map.into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<Vec<_>>()
    })
}

/// Generates artifact payloads
fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..256)
}

fn to_map(pairs: &[(String, String)]) -> HashMap<String, String> {
    pairs.iter().cloned().collect()
}

fn metadata() -> Metadata {
    Metadata::new(200, HashMap::new())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Parameter insertion order never changes the derived key.
    #[test]
    fn prop_key_order_invariant(path in path_strategy(), params in params_strategy()) {
        let forward = to_map(&params);

        let mut reversed = HashMap::new();
        for (k, v) in params.iter().rev() {
            reversed.insert(k.clone(), v.clone());
        }

        prop_assert_eq!(derive_key(&path, &forward), derive_key(&path, &reversed));
    }

    // Distinct (path, params) inputs map to distinct keys.
    #[test]
    fn prop_key_distinct_inputs(
        inputs in prop::collection::vec((path_strategy(), params_strategy()), 2..20)
    ) {
        let mut seen: HashMap<String, (String, Vec<(String, String)>)> = HashMap::new();

        for (path, params) in inputs {
            let mut canonical = params.clone();
            canonical.sort();
            let key = derive_key(&path, &to_map(&params));

            if let Some((prev_path, prev_params)) = seen.get(&key) {
                prop_assert_eq!(prev_path, &path, "collision on different paths");
                prop_assert_eq!(prev_params, &canonical, "collision on different params");
            }
            seen.insert(key, (path, canonical));
        }
    }
}

// Filesystem-backed properties run fewer cases
proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    // Immediately after `set`, `get` is fresh and `read` returns the same bytes.
    #[test]
    fn prop_roundtrip_storage(path in path_strategy(), payload in payload_strategy()) {
        let dir = tempdir().unwrap();
        let key = derive_key(&path, &HashMap::new());

        let (is_fresh, stored) = block_on(async {
            let store = CacheStore::open(dir.path(), TEST_TTL, 1024 * 1024).await.unwrap();
            store.set(&key, &payload, metadata()).await.unwrap();
            let lookup = store.get(&key).await.unwrap();
            (lookup.is_fresh, store.read(&key).await.unwrap())
        });

        prop_assert!(is_fresh, "entry should be fresh right after set");
        prop_assert_eq!(stored, payload);
    }

    // Overwriting a key keeps one entry and the total tracks the newest payload.
    #[test]
    fn prop_overwrite_semantics(
        path in path_strategy(),
        first in payload_strategy(),
        second in payload_strategy()
    ) {
        let dir = tempdir().unwrap();
        let key = derive_key(&path, &HashMap::new());

        let (len, total, stored) = block_on(async {
            let store = CacheStore::open(dir.path(), TEST_TTL, 1024 * 1024).await.unwrap();
            store.set(&key, &first, metadata()).await.unwrap();
            store.set(&key, &second, metadata()).await.unwrap();
            (store.len().await, store.total_bytes().await, store.read(&key).await.unwrap())
        });

        prop_assert_eq!(len, 1);
        prop_assert_eq!(total, second.len() as u64);
        prop_assert_eq!(stored, second);
    }

    // The running total never exceeds the ceiling by more than the newest
    // entry, and always equals the sum of the surviving entries' sizes.
    #[test]
    fn prop_eviction_bounds(
        sizes in prop::collection::vec(1usize..200, 1..30),
        ceiling in 50u64..600
    ) {
        let dir = tempdir().unwrap();

        let violations = block_on(async {
            let store = CacheStore::open(dir.path(), TEST_TTL, ceiling).await.unwrap();
            let mut violations = Vec::new();
            let mut keys = Vec::new();

            for (i, size) in sizes.iter().enumerate() {
                let key = derive_key(&format!("/avatar/{}", i), &HashMap::new());
                store.set(&key, &vec![0u8; *size], metadata()).await.unwrap();
                keys.push(key);

                let total = store.total_bytes().await;
                if total > ceiling + *size as u64 {
                    violations.push(format!("total {} over ceiling {} + {}", total, ceiling, size));
                }

                let mut sum = 0;
                for k in &keys {
                    if let Some(lookup) = store.get(k).await {
                        sum += lookup.entry.metadata.size;
                    }
                }
                if sum != total {
                    violations.push(format!("total {} != sum of entries {}", total, sum));
                }
            }
            violations
        });

        prop_assert!(violations.is_empty(), "{:?}", violations);
    }

    // When the cache overflows, the least recently touched key goes first.
    #[test]
    fn prop_lru_eviction_order(
        names in prop::collection::hash_set("[a-f0-9]{4,8}", 3..8),
        touched_index in 0usize..100
    ) {
        let names: Vec<String> = names.into_iter().collect();
        let keys: Vec<String> = names
            .iter()
            .map(|n| derive_key(&format!("/avatar/{}", n), &HashMap::new()))
            .collect();
        let unique: HashSet<&String> = keys.iter().collect();
        prop_assume!(unique.len() == keys.len());

        let entry_size = 10usize;
        let ceiling = (keys.len() * entry_size) as u64;
        let touched = touched_index % keys.len();

        let dir = tempdir().unwrap();
        let (present, expected_evicted) = block_on(async {
            let store = CacheStore::open(dir.path(), TEST_TTL, ceiling).await.unwrap();
            for key in &keys {
                store.set(key, &[1u8; 10], metadata()).await.unwrap();
            }

            // Touch one key so it becomes most recently used
            store.read(&keys[touched]).await.unwrap();
            let expected_evicted = if touched == 0 { 1 } else { 0 };

            let newcomer = derive_key("/avatar/newcomer", &HashMap::new());
            store.set(&newcomer, &[2u8; 10], metadata()).await.unwrap();

            let mut present = Vec::new();
            for key in &keys {
                present.push(store.get(key).await.is_some());
            }
            (present, expected_evicted)
        });

        for (i, is_present) in present.iter().enumerate() {
            if i == expected_evicted {
                prop_assert!(!is_present, "key {} should have been evicted", i);
            } else {
                prop_assert!(is_present, "key {} should have survived", i);
            }
        }
    }
}
