//! Conditional revalidation protocol
//!
//! Decides, for one request, whether to answer 304 from the client's own
//! validators, serve a fresh cached copy, revalidate a stale copy with a
//! conditional GET, or fetch from the origin. Every path ends in exactly one
//! [`ServedResponse`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::{derive_key, CacheEntry, CacheLookup, CacheStore, Metadata};
use crate::error::Result;
use crate::proxy::conditional::ConditionalHeaders;
use crate::proxy::response::{Outcome, ServedResponse};
use crate::proxy::upstream::{Upstream, UpstreamRequest, UpstreamResponse};

/// Headers kept on a 304 sent back to the client.
const NOT_MODIFIED_HEADERS: [&str; 2] = ["ETag", "Last-Modified"];

/// One inbound request as seen by the protocol.
#[derive(Debug, Clone, Default)]
pub struct ResourceRequest {
    /// Canonical resource path, e.g. `/avatar/<hash>`
    pub path: String,
    /// Whitelisted query parameters
    pub params: HashMap<String, String>,
    pub conditional: ConditionalHeaders,
}

/// Drives the protocol against a shared store and an upstream transport.
#[derive(Clone)]
pub struct Revalidator {
    store: Arc<CacheStore>,
    upstream: Arc<dyn Upstream>,
}

impl Revalidator {
    pub fn new(store: Arc<CacheStore>, upstream: Arc<dyn Upstream>) -> Self {
        Self { store, upstream }
    }

    // == Serve ==
    /// Runs the protocol for one request.
    ///
    /// Only upstream failures surface as errors; cache write failures are
    /// logged and the fetched bytes are still served.
    pub async fn serve(&self, request: &ResourceRequest) -> Result<ServedResponse> {
        let key = derive_key(&request.path, &request.params);
        let lookup = self.store.get(&key).await;

        match lookup {
            Some(CacheLookup {
                entry,
                is_fresh: true,
            }) => {
                if request.conditional.matches(&entry.metadata) {
                    debug!(key = %key, "client validators match fresh entry");
                    return Ok(self.not_modified(&entry));
                }

                match self.serve_fresh(&entry).await {
                    Ok(served) => Ok(served),
                    Err(e) => {
                        // Evicted or unreadable since the lookup
                        warn!(key = %key, error = %e, "cached artifact unavailable, refetching");
                        self.fetch_fresh(&key, request).await
                    }
                }
            }
            Some(CacheLookup {
                entry,
                is_fresh: false,
            }) => self.revalidate(&key, request, entry).await,
            None => self.fetch_fresh(&key, request).await,
        }
    }

    // == Client 304 ==
    fn not_modified(&self, entry: &CacheEntry) -> ServedResponse {
        let headers = entry
            .metadata
            .headers
            .iter()
            .filter(|(name, _)| NOT_MODIFIED_HEADERS.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        ServedResponse {
            status: 304,
            headers,
            max_age: entry.metadata.remaining_ttl_secs(self.store.ttl(), Utc::now()),
            body: None,
            outcome: Outcome::ClientNotModified,
        }
    }

    // == Cache Fresh ==
    async fn serve_fresh(&self, entry: &CacheEntry) -> Result<ServedResponse> {
        let body = self.store.read(&entry.key).await?;
        debug!(key = %entry.key, "cache hit");

        Ok(ServedResponse {
            status: entry.metadata.status_code,
            headers: entry.metadata.headers.clone(),
            max_age: entry.metadata.remaining_ttl_secs(self.store.ttl(), Utc::now()),
            body: Some(body),
            outcome: Outcome::CacheFresh,
        })
    }

    // == Cache Stale: Revalidate ==
    async fn revalidate(
        &self,
        key: &str,
        request: &ResourceRequest,
        entry: CacheEntry,
    ) -> Result<ServedResponse> {
        let upstream_request = UpstreamRequest::plain(&request.path, request.params.clone())
            .with_validators(&entry.metadata);

        info!(key, "revalidating stale entry with upstream");
        let response = self.upstream.fetch(upstream_request).await?;

        if !response.is_not_modified() {
            debug!(key, status = response.status, "upstream sent a new representation");
            return Ok(self.store_fetched(key, response).await);
        }

        info!(key, "upstream returned 304, refreshing cache");
        let refreshed = self
            .store
            .refresh_if_unchanged(key, &entry.metadata, Utc::now())
            .await;

        match refreshed {
            Ok(Some((metadata, body))) => {
                self.store.record_revalidation();
                Ok(ServedResponse {
                    status: metadata.status_code,
                    headers: metadata.headers,
                    max_age: self.store.ttl().as_secs(),
                    body: Some(body),
                    outcome: Outcome::Revalidated,
                })
            }
            Ok(None) => {
                // The 304 confirmed a representation that is no longer stored
                info!(key, "entry replaced while revalidating, serving current copy");
                self.serve_current(key, request).await
            }
            Err(e) => {
                warn!(key, error = %e, "revalidated artifact unavailable, refetching");
                self.fetch_fresh(key, request).await
            }
        }
    }

    /// Serves whatever is stored now if it is fresh, else fetches.
    async fn serve_current(&self, key: &str, request: &ResourceRequest) -> Result<ServedResponse> {
        if let Some(CacheLookup {
            entry,
            is_fresh: true,
        }) = self.store.get(key).await
        {
            if let Ok(served) = self.serve_fresh(&entry).await {
                return Ok(served);
            }
        }
        self.fetch_fresh(key, request).await
    }

    // == Cache Absent: Fetch ==
    async fn fetch_fresh(&self, key: &str, request: &ResourceRequest) -> Result<ServedResponse> {
        let upstream_request = UpstreamRequest::plain(&request.path, request.params.clone());

        info!(key, path = %request.path, "fetching from upstream");
        let response = self.upstream.fetch(upstream_request).await?;

        Ok(self.store_fetched(key, response).await)
    }

    /// Caches a full upstream response (best effort) and builds the reply.
    ///
    /// 5xx answers and bodiless 304s are passed through without caching.
    async fn store_fetched(&self, key: &str, response: UpstreamResponse) -> ServedResponse {
        let UpstreamResponse {
            status,
            headers,
            body,
        } = response;

        let metadata = Metadata::new(status, headers);

        if is_cacheable(status) {
            if let Err(e) = self.store.set(key, &body, metadata.clone()).await {
                warn!(key, error = %e, "failed to cache response");
            }
        } else {
            debug!(key, status, "not caching upstream response");
        }

        ServedResponse {
            status,
            headers: metadata.headers,
            max_age: self.store.ttl().as_secs(),
            body: Some(body),
            outcome: Outcome::Fetched,
        }
    }
}

fn is_cacheable(status: u16) -> bool {
    status != 304 && status < 500
}
