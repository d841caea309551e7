//! Avatar Proxy - A disk-backed caching proxy for avatar images
//!
//! Binary entry point: loads configuration, opens the cache and serves HTTP.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use avatar_proxy::{create_router, AppState, Config};

/// Main entry point for the avatar proxy.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the cache store and build the upstream client
/// 4. Create Axum router with all endpoints
/// 5. Start HTTP server on configured port
/// 6. On SIGINT/SIGTERM, drain connections and flush the cache index
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting avatar proxy");

    let config = Config::from_env().context("failed to load configuration")?;
    info!(
        port = config.port,
        cache_dir = %config.cache_dir.display(),
        cache_ttl_secs = config.cache_ttl.as_secs(),
        max_cache_bytes = config.max_cache_bytes,
        upstream = %config.upstream_base,
        allowed_origins = ?config.allowed_origins,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config)
        .await
        .context("failed to initialize cache store")?;
    let store = state.store.clone();
    let (entries, bytes) = (store.len().await, store.total_bytes().await);
    info!(entries, bytes, "Cache store opened");

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Err(e) = store.close().await {
        warn!(error = %e, "failed to flush cache index on shutdown");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Installs the global subscriber; `LOG_FORMAT=json` selects JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "avatar_proxy=info,tower_http=info".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
