//! Metadata Module
//!
//! Defines the metadata record persisted next to each cached artifact and
//! the index entry that ties a key to its files.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

// == Allowed Headers ==
/// Upstream response headers that are persisted and replayed. Everything else is dropped.
pub const ALLOWED_HEADERS: [&str; 5] = [
    "Content-Type",
    "ETag",
    "Last-Modified",
    "Cache-Control",
    "Content-Length",
];

/// Looks up `name` in [`ALLOWED_HEADERS`] case-insensitively and returns the
/// canonical spelling.
pub fn canonical_header_name(name: &str) -> Option<&'static str> {
    ALLOWED_HEADERS
        .iter()
        .copied()
        .find(|allowed| allowed.eq_ignore_ascii_case(name))
}

/// Keeps only the allowed header subset, keyed by canonical name.
///
/// Empty values are skipped. For duplicated headers the first value wins.
pub fn extract_headers<'a, I>(headers: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut kept = HashMap::new();
    for (name, value) in headers {
        if value.is_empty() {
            continue;
        }
        if let Some(canonical) = canonical_header_name(name) {
            kept.entry(canonical.to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    kept
}

// == Metadata ==
/// Describes one cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Basis for TTL expiry; refreshed on refetch or origin 304
    pub created_at: DateTime<Utc>,
    /// Last time the artifact bytes were served
    pub last_accessed_at: DateTime<Utc>,
    /// Persisted subset of the origin response headers
    pub headers: HashMap<String, String>,
    /// Origin status code replayed on hits
    pub status_code: u16,
    /// Byte length of the stored artifact
    #[serde(default)]
    pub size: u64,
}

impl Metadata {
    /// Creates metadata for a response fetched right now. `size` is filled in by the store.
    pub fn new(status_code: u16, headers: HashMap<String, String>) -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            last_accessed_at: now,
            headers,
            status_code,
            size: 0,
        }
    }

    /// Stored entity tag, if any.
    pub fn etag(&self) -> Option<&str> {
        self.headers.get("ETag").map(String::as_str)
    }

    /// Stored `Last-Modified` value, if any.
    pub fn last_modified(&self) -> Option<&str> {
        self.headers.get("Last-Modified").map(String::as_str)
    }

    /// Time elapsed since `created_at`, measured on the wall clock.
    pub fn age(&self, now: DateTime<Utc>) -> ChronoDuration {
        now - self.created_at
    }

    /// Returns true while `now - created_at <= ttl`.
    pub fn is_fresh_at(&self, ttl: std::time::Duration, now: DateTime<Utc>) -> bool {
        match ChronoDuration::from_std(ttl) {
            Ok(ttl) => self.age(now) <= ttl,
            // A TTL too large for chrono never expires
            Err(_) => true,
        }
    }

    /// Seconds of freshness left at `now`, floored at zero.
    pub fn remaining_ttl_secs(&self, ttl: std::time::Duration, now: DateTime<Utc>) -> u64 {
        let age_secs = self.age(now).num_seconds().max(0) as u64;
        ttl.as_secs().saturating_sub(age_secs)
    }

    /// Marks the entry as just revalidated: both timestamps move to `now`.
    pub fn refreshed(mut self, now: DateTime<Utc>) -> Self {
        self.created_at = now;
        self.last_accessed_at = now;
        self
    }
}

// == Cache Entry ==
/// Index entry: a key, its metadata and where the artifact bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub file_path: PathBuf,
    pub metadata: Metadata,
}
