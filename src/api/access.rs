//! Origin Allow-List
//!
//! Restricts which sites may embed avatars when `ALLOWED_ORIGINS` is set.
//! The `Origin` host is checked first, then the `Referer` host; a host is
//! allowed when it equals a listed domain or is a subdomain of one.

use axum::http::{header, HeaderMap, HeaderValue};
use url::Url;

const ALLOW_METHODS: &str = "GET, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Cache-Control, If-None-Match, If-Modified-Since";

/// Result of checking a request against the allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// No allow-list configured
    Open,
    /// Allowed; carries the request's `Origin` to echo back, if any
    Granted { origin: Option<String> },
    Denied,
}

impl Access {
    pub fn is_denied(&self) -> bool {
        matches!(self, Access::Denied)
    }

    /// Adds the CORS response headers for a granted request.
    pub fn apply(&self, headers: &mut HeaderMap) {
        let Access::Granted { origin } = self else {
            return;
        };

        if let Some(value) = origin.as_deref().and_then(|o| HeaderValue::from_str(o).ok()) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
    }
}

/// Checks the request's `Origin` and `Referer` headers against `allowed`.
///
/// # Arguments
/// * `allowed` - Lowercase domains; empty disables the check
/// * `headers` - Inbound request headers
pub fn check_access(allowed: &[String], headers: &HeaderMap) -> Access {
    if allowed.is_empty() {
        return Access::Open;
    }

    let read = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let origin = read(header::ORIGIN);
    let referer = read(header::REFERER);

    let permitted = [origin, referer]
        .into_iter()
        .flatten()
        .filter_map(host_of)
        .any(|host| is_host_allowed(&host, allowed));

    if permitted {
        Access::Granted {
            origin: origin.map(str::to_string),
        }
    } else {
        Access::Denied
    }
}

/// Lowercase host of an absolute URL such as `https://blog.example.com:8443/x`.
pub fn host_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;
    if host.is_empty() {
        return None;
    }
    Some(host.to_ascii_lowercase())
}

/// Exact or subdomain match against the allow-list.
pub fn is_host_allowed(host: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|domain| {
        let domain = domain.trim().to_ascii_lowercase();
        !domain.is_empty()
            && (host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.')))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        vec!["example.com".to_string(), "blog.test".to_string()]
    }

    fn headers(pairs: &[(header::HeaderName, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://Sub.Example.com:8443/page"), Some("sub.example.com".into()));
        assert_eq!(host_of("http://localhost"), Some("localhost".into()));
        assert_eq!(host_of("example.com"), None);
        assert_eq!(host_of("null"), None);
    }

    #[test]
    fn test_is_host_allowed() {
        let allowed = allowed();
        assert!(is_host_allowed("example.com", &allowed));
        assert!(is_host_allowed("cdn.example.com", &allowed));
        assert!(!is_host_allowed("badexample.com", &allowed));
        assert!(!is_host_allowed("example.com.evil.net", &allowed));
        assert!(!is_host_allowed("evil.net", &allowed));
    }

    #[test]
    fn test_empty_list_is_open() {
        assert_eq!(check_access(&[], &HeaderMap::new()), Access::Open);
    }

    #[test]
    fn test_origin_granted_and_echoed() {
        let map = headers(&[(header::ORIGIN, "https://www.example.com")]);
        let access = check_access(&allowed(), &map);
        assert_eq!(
            access,
            Access::Granted {
                origin: Some("https://www.example.com".into())
            }
        );

        let mut out = HeaderMap::new();
        access.apply(&mut out);
        assert_eq!(out[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://www.example.com");
        assert_eq!(out[header::ACCESS_CONTROL_ALLOW_METHODS], ALLOW_METHODS);
        assert_eq!(out[header::ACCESS_CONTROL_ALLOW_HEADERS], ALLOW_HEADERS);
    }

    #[test]
    fn test_referer_fallback() {
        let map = headers(&[
            (header::ORIGIN, "https://evil.net"),
            (header::REFERER, "https://blog.test/post/1"),
        ]);
        let access = check_access(&allowed(), &map);
        assert!(!access.is_denied());

        let referer_only = headers(&[(header::REFERER, "https://blog.test/post/1")]);
        let access = check_access(&allowed(), &referer_only);
        assert_eq!(access, Access::Granted { origin: None });

        let mut out = HeaderMap::new();
        access.apply(&mut out);
        assert!(out.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        assert!(out.get(header::ACCESS_CONTROL_ALLOW_METHODS).is_some());
    }

    #[test]
    fn test_denied() {
        assert!(check_access(&allowed(), &HeaderMap::new()).is_denied());

        let map = headers(&[(header::ORIGIN, "https://evil.net")]);
        let access = check_access(&allowed(), &map);
        assert!(access.is_denied());

        let mut out = HeaderMap::new();
        access.apply(&mut out);
        assert!(out.is_empty());
    }
}
