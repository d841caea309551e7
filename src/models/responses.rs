//! Response DTOs for the avatar proxy API
//!
//! Defines the JSON bodies of the health, stats and error responses.

use serde::Serialize;

use crate::cache::CacheStats;

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Current number of cached artifacts
    pub entries: usize,
    /// Bytes currently stored
    pub total_bytes: u64,
    /// Configured byte ceiling
    pub max_bytes: u64,
    /// Fresh cache hits
    pub hits: u64,
    /// Absent or stale lookups
    pub misses: u64,
    /// Stale entries confirmed by an upstream 304
    pub revalidations: u64,
    /// Entries removed by LRU eviction
    pub evictions: u64,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            entries: stats.total_entries,
            total_bytes: stats.total_bytes,
            max_bytes: stats.max_bytes,
            hits: stats.hits,
            misses: stats.misses,
            revalidations: stats.revalidations,
            evictions: stats.evictions,
        }
    }
}

/// Response body for the health endpoints (GET /health, GET /healthz)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always "ok" while the process serves requests
    pub status: String,
    /// Current timestamp in RFC 3339 format
    pub timestamp: String,
    /// Seconds since the server started
    pub uptime_secs: u64,
}

impl HealthResponse {
    pub fn ok(uptime_secs: u64) -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_secs,
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
