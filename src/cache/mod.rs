//! Cache Module
//!
//! Provides a disk-backed artifact cache with TTL freshness, LRU eviction
//! and a persisted index.

mod key;
mod lru;
mod metadata;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use key::{derive_key, is_valid_key, KEY_LENGTH};
pub use lru::LruTracker;
pub use metadata::{canonical_header_name, extract_headers, CacheEntry, Metadata, ALLOWED_HEADERS};
pub use stats::{CacheStats, StatsCounters};
pub use store::{CacheLookup, CacheStore};

// == Public Constants ==
/// File name of the index document inside the cache directory
pub const INDEX_FILE_NAME: &str = "index.json";

/// Suffix appended to a key to name its metadata sidecar
pub const METADATA_SUFFIX: &str = ".meta";
