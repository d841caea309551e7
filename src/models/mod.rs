//! Request and Response models for the avatar proxy API
//!
//! Query parameters accepted on avatar requests and the JSON bodies of the
//! operational endpoints.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{normalize_hash, AvatarQuery, ALLOWED_PARAMS};
pub use responses::{ErrorResponse, HealthResponse, StatsResponse};
