//! Upstream avatar service client

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::cache::{extract_headers, Metadata};
use crate::error::{ProxyError, Result};

/// A GET issued to the upstream service, optionally conditional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamRequest {
    pub path: String,
    pub params: HashMap<String, String>,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
}

impl UpstreamRequest {
    /// Plain GET without validators.
    pub fn plain(path: impl Into<String>, params: HashMap<String, String>) -> Self {
        Self {
            path: path.into(),
            params,
            ..Self::default()
        }
    }

    /// Carries the stored entity tag and last-modified as request validators.
    pub fn with_validators(mut self, metadata: &Metadata) -> Self {
        self.if_none_match = metadata.etag().map(str::to_string);
        self.if_modified_since = metadata.last_modified().map(str::to_string);
        self
    }

    pub fn is_conditional(&self) -> bool {
        self.if_none_match.is_some() || self.if_modified_since.is_some()
    }
}

/// Upstream answer: status, the allowed header subset and the full body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }
}

/// Transport used to reach the origin.
///
/// Implementations own their timeout and report transport failures as
/// [`ProxyError::UpstreamUnavailable`].
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn fetch(&self, request: UpstreamRequest) -> Result<UpstreamResponse>;
}

// == HTTP Upstream ==
/// reqwest-backed upstream rooted at a base URL.
pub struct HttpUpstream {
    client: Client,
    base: Url,
}

impl HttpUpstream {
    /// Create a client for `base` with a per-request timeout.
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base)
            .map_err(|e| ProxyError::Config(format!("invalid upstream base {}: {}", base, e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProxyError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base })
    }

    /// Builds `<base><path>?<params>`, params sorted by name.
    pub fn build_url(&self, path: &str, params: &HashMap<String, String>) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);

        if params.is_empty() {
            url.set_query(None);
        } else {
            let mut pairs: Vec<(&String, &String)> = params.iter().collect();
            pairs.sort();
            url.query_pairs_mut().clear().extend_pairs(pairs);
        }

        url
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let url = self.build_url(&request.path, &request.params);
        debug!(url = %url, conditional = request.is_conditional(), "fetching from upstream");

        let mut builder = self.client.get(url.clone());
        if let Some(etag) = &request.if_none_match {
            builder = builder.header(reqwest::header::IF_NONE_MATCH, etag);
        }
        if let Some(since) = &request.if_modified_since {
            builder = builder.header(reqwest::header::IF_MODIFIED_SINCE, since);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = extract_headers(
            response
                .headers()
                .iter()
                .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?))),
        );
        let body = response.bytes().await?.to_vec();

        debug!(url = %url, status, size = body.len(), "upstream responded");

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
