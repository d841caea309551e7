//! API Module
//!
//! HTTP handlers and routing for the avatar proxy.
//!
//! # Endpoints
//! - `GET /avatar/:hash` - Serve an avatar through the cache
//! - `OPTIONS /avatar/:hash` - CORS preflight
//! - `GET /stats` - Get cache statistics
//! - `GET /health`, `GET /healthz` - Health check endpoints

pub mod access;
pub mod handlers;
pub mod routes;

pub use access::{check_access, Access};
pub use handlers::*;
pub use routes::create_router;
