//! Client conditional request headers.

use axum::http::{header, HeaderMap};

use crate::cache::Metadata;

/// `If-None-Match` / `If-Modified-Since` as sent by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalHeaders {
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
}

impl ConditionalHeaders {
    /// Reads both headers, ignoring empty or non-UTF-8 values.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            if_none_match: read(header::IF_NONE_MATCH),
            if_modified_since: read(header::IF_MODIFIED_SINCE),
        }
    }

    /// Returns true if the stored validators satisfy the client's condition.
    ///
    /// The entity tag comparison is an exact, case-sensitive match on the
    /// whole header value. Otherwise the stored `Last-Modified` must not be
    /// after the client's `If-Modified-Since`. Unparseable dates never match.
    /// Freshness is the caller's concern.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        if let (Some(wanted), Some(stored)) = (self.if_none_match.as_deref(), metadata.etag()) {
            if wanted == stored {
                return true;
            }
        }

        if let (Some(since), Some(stored)) =
            (self.if_modified_since.as_deref(), metadata.last_modified())
        {
            if let (Ok(since), Ok(stored)) = (
                httpdate::parse_http_date(since),
                httpdate::parse_http_date(stored),
            ) {
                return stored <= since;
            }
        }

        false
    }
}
