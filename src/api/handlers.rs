//! API Handlers
//!
//! HTTP request handlers for the avatar proxy endpoints.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info, warn};

use super::access::{check_access, Access};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::models::{normalize_hash, AvatarQuery, HealthResponse, StatsResponse};
use crate::proxy::{
    ConditionalHeaders, HttpUpstream, ResourceRequest, Revalidator, ServedResponse, Upstream,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Disk-backed artifact cache
    pub store: Arc<CacheStore>,
    /// Protocol driver over `store` and the upstream
    pub revalidator: Revalidator,
    /// Lowercase domains allowed to embed avatars; empty allows all
    pub allowed_origins: Arc<Vec<String>>,
    started_at: Instant,
    request_ids: Arc<AtomicU64>,
}

impl AppState {
    /// Creates a new AppState over an opened store and an upstream transport.
    pub fn new(
        store: Arc<CacheStore>,
        upstream: Arc<dyn Upstream>,
        allowed_origins: Vec<String>,
    ) -> Self {
        let allowed_origins = allowed_origins
            .into_iter()
            .map(|o| o.trim().to_ascii_lowercase())
            .filter(|o| !o.is_empty())
            .collect();

        Self {
            revalidator: Revalidator::new(store.clone(), upstream),
            store,
            allowed_origins: Arc::new(allowed_origins),
            started_at: Instant::now(),
            request_ids: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Opens the cache store and the HTTP upstream described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = CacheStore::open(
            config.cache_dir.clone(),
            config.cache_ttl,
            config.max_cache_bytes,
        )
        .await?;
        let upstream = HttpUpstream::new(&config.upstream_base, config.upstream_timeout)?;

        Ok(Self::new(
            Arc::new(store),
            Arc::new(upstream),
            config.allowed_origins.clone(),
        ))
    }

    fn next_request_id(&self) -> u64 {
        self.request_ids.fetch_add(1, Ordering::Relaxed)
    }
}

/// Handler for GET /avatar/:hash
///
/// Serves an avatar through the cache, revalidating with the upstream
/// service as needed. Every response carries `X-Cache`.
pub async fn avatar_handler(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Response {
    let started = Instant::now();
    let request_id = state.next_request_id();
    let path = format!("/avatar/{}", hash);

    let access = check_access(&state.allowed_origins, &headers);
    if access.is_denied() {
        warn!(request_id, path = %path, "origin not allowed");
        let response = ProxyError::Forbidden("Forbidden".to_string()).into_response();
        log_request(request_id, &Method::GET, &path, response.status(), "DENIED", started);
        return response;
    }

    let query = AvatarQuery::from_pairs(pairs);
    let (mut response, outcome) = match serve_avatar(&state, &hash, query, &headers).await {
        Ok(served) => {
            let outcome = served.outcome.as_str();
            (served.into_response(), outcome)
        }
        Err(e) => {
            if e.status_code().is_server_error() {
                error!(request_id, path = %path, error = %e, "avatar request failed");
            }
            (e.into_response(), "ERROR")
        }
    };

    access.apply(response.headers_mut());
    log_request(request_id, &Method::GET, &path, response.status(), outcome, started);
    response
}

/// Handler for GET /avatar/ with an empty hash segment
pub async fn empty_hash_handler() -> ProxyError {
    ProxyError::InvalidRequest("Invalid hash".to_string())
}

async fn serve_avatar(
    state: &AppState,
    raw_hash: &str,
    query: AvatarQuery,
    headers: &HeaderMap,
) -> Result<ServedResponse> {
    let hash = normalize_hash(raw_hash);
    if hash.is_empty() {
        return Err(ProxyError::InvalidRequest("Invalid hash".to_string()));
    }

    let request = ResourceRequest {
        path: format!("/avatar/{}", hash),
        params: query.into_params(),
        conditional: ConditionalHeaders::from_headers(headers),
    };

    state.revalidator.serve(&request).await
}

/// Handler for OPTIONS /avatar/:hash
///
/// Answers CORS preflight: 200 with the allow headers, or 403.
pub async fn preflight_handler(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    headers: HeaderMap,
) -> Response {
    let started = Instant::now();
    let request_id = state.next_request_id();
    let path = format!("/avatar/{}", hash);

    let access = check_access(&state.allowed_origins, &headers);
    let response = match access {
        Access::Denied => ProxyError::Forbidden("Forbidden".to_string()).into_response(),
        _ => {
            let mut response = StatusCode::OK.into_response();
            access.apply(response.headers_mut());
            response
        }
    };

    log_request(request_id, &Method::OPTIONS, &path, response.status(), "PREFLIGHT", started);
    response
}

/// Handler for GET /stats
///
/// Returns current cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.store.stats().await))
}

/// Handler for GET /health and GET /healthz
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::ok(state.started_at.elapsed().as_secs()))
}

fn log_request(
    request_id: u64,
    method: &Method,
    path: &str,
    status: StatusCode,
    outcome: &str,
    started: Instant,
) {
    info!(
        request_id,
        method = %method,
        path,
        status = status.as_u16(),
        outcome,
        duration_ms = started.elapsed().as_millis() as u64,
        "request served"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{UpstreamRequest, UpstreamResponse};
    use async_trait::async_trait;
    use axum::http::{header, HeaderValue};
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    /// Always answers 200 with a fixed body.
    struct FixedUpstream;

    #[async_trait]
    impl Upstream for FixedUpstream {
        async fn fetch(&self, _request: UpstreamRequest) -> Result<UpstreamResponse> {
            Ok(UpstreamResponse {
                status: 200,
                headers: Default::default(),
                body: b"img".to_vec(),
            })
        }
    }

    async fn test_state(allowed: &[&str]) -> (TempDir, AppState) {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(dir.path(), Duration::from_secs(300), 1024)
            .await
            .unwrap();
        let state = AppState::new(
            Arc::new(store),
            Arc::new(FixedUpstream),
            allowed.iter().map(|s| s.to_string()).collect(),
        );
        (dir, state)
    }

    #[tokio::test]
    async fn test_avatar_handler_miss_then_hit() {
        let (_dir, state) = test_state(&[]).await;

        let response = avatar_handler(
            State(state.clone()),
            Path("ABC".to_string()),
            Query(vec![]),
            HeaderMap::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-cache"], "MISS");

        let response = avatar_handler(
            State(state.clone()),
            Path("abc".to_string()),
            Query(vec![]),
            HeaderMap::new(),
        )
        .await;
        assert_eq!(response.headers()["x-cache"], "HIT");
        assert_eq!(state.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_blank_hash_rejected() {
        let (_dir, state) = test_state(&[]).await;

        let response = avatar_handler(
            State(state.clone()),
            Path("   ".to_string()),
            Query(vec![]),
            HeaderMap::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_denied_origin_skips_cache() {
        let (_dir, state) = test_state(&["example.com"]).await;

        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://evil.net"));

        let response = avatar_handler(
            State(state.clone()),
            Path("abc".to_string()),
            Query(vec![]),
            headers,
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(state.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_preflight_handler() {
        let (_dir, state) = test_state(&["Example.com "]).await;
        assert_eq!(*state.allowed_origins, vec!["example.com".to_string()]);

        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://example.com"));
        let response =
            preflight_handler(State(state.clone()), Path("abc".to_string()), headers).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://example.com"
        );

        let response =
            preflight_handler(State(state), Path("abc".to_string()), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let (_dir, state) = test_state(&[]).await;

        let response = stats_handler(State(state)).await;
        assert_eq!(response.hits, 0);
        assert_eq!(response.misses, 0);
        assert_eq!(response.max_bytes, 1024);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let (_dir, state) = test_state(&[]).await;

        let response = health_handler(State(state)).await;
        assert_eq!(response.status, "ok");
    }
}
