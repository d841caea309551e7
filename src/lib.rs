//! Avatar Proxy - A disk-backed caching proxy for avatar images
//!
//! Serves avatars from a local cache with TTL freshness, LRU eviction under a
//! byte ceiling and conditional revalidation against the upstream service.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod proxy;

pub use api::{create_router, AppState};
pub use cache::CacheStore;
pub use config::Config;
pub use error::{ProxyError, Result};
