//! Responses produced by the revalidation protocol.

use std::collections::HashMap;

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::warn;

/// Which branch of the protocol produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Client validators matched a fresh entry; 304 without touching upstream
    ClientNotModified,
    /// Fresh entry served from disk
    CacheFresh,
    /// Stale entry confirmed unchanged by the origin
    Revalidated,
    /// Fetched from the origin (absent entry, or stale entry that changed)
    Fetched,
}

impl Outcome {
    /// Value of the `X-Cache` response header.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::ClientNotModified => "NOT_MODIFIED",
            Outcome::CacheFresh => "HIT",
            Outcome::Revalidated => "REVALIDATED",
            Outcome::Fetched => "MISS",
        }
    }
}

/// A fully decided response: exactly one of these is produced per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedResponse {
    pub status: u16,
    /// Persisted header subset to replay
    pub headers: HashMap<String, String>,
    /// Value for the synthesized `Cache-Control: public, max-age=<n>`
    pub max_age: u64,
    /// Absent for 304
    pub body: Option<Vec<u8>>,
    pub outcome: Outcome,
}

impl ServedResponse {
    /// The `Cache-Control` value sent to clients.
    pub fn cache_control(&self) -> String {
        format!("public, max-age={}", self.max_age)
    }
}

impl IntoResponse for ServedResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::BAD_GATEWAY);
        let cache_control = self.cache_control();
        let mut response = match self.body {
            Some(body) => Response::new(Body::from(body)),
            None => Response::new(Body::empty()),
        };
        *response.status_mut() = status;

        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            // Length comes from the body actually sent
            if name.eq_ignore_ascii_case("Content-Length") {
                continue;
            }
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %name, "dropping unrepresentable header"),
            }
        }

        if let Ok(value) = HeaderValue::from_str(&cache_control) {
            headers.insert(header::CACHE_CONTROL, value);
        }
        headers.insert(
            HeaderName::from_static("x-cache"),
            HeaderValue::from_static(self.outcome.as_str()),
        );

        response
    }
}
