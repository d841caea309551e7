//! API Routes
//!
//! Configures the Axum router with all avatar proxy endpoints.

use axum::{
    http::Method,
    routing::{get, options},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    avatar_handler, empty_hash_handler, health_handler, preflight_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: any origin when no allow-list is configured; otherwise the
///   avatar handlers emit CORS headers themselves
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let open = state.allowed_origins.is_empty();

    let router = Router::new()
        .route(
            "/avatar/:hash",
            get(avatar_handler).options(preflight_handler),
        )
        .route("/avatar/", get(empty_hash_handler).options(empty_hash_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler));

    // A blanket CorsLayer would answer preflights before the allow-list runs
    let router = if open {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers(Any);
        router.layer(cors)
    } else {
        router
    };

    router
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
