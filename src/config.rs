//! Configuration Module
//!
//! Handles loading and managing proxy configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ProxyError, Result};

/// Proxy configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub port: u16,
    /// Directory holding artifacts, metadata sidecars and the index
    pub cache_dir: PathBuf,
    /// Freshness lifetime of a cached artifact
    pub cache_ttl: Duration,
    /// Byte ceiling for all stored artifacts
    pub max_cache_bytes: u64,
    /// Base URL of the upstream avatar service
    pub upstream_base: String,
    /// Domains allowed to embed avatars; empty allows everyone
    pub allowed_origins: Vec<String>,
    /// Timeout applied to every upstream request
    pub upstream_timeout: Duration,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `PORT` - HTTP server port (default: 8080)
    /// - `CACHE_DIR` - Cache directory (default: ./cache)
    /// - `CACHE_TTL` - Duration such as `24h`, `90m` or `1h30m` (default: 24h)
    /// - `MAX_CACHE_BYTES` - Byte ceiling (default: 268435456)
    /// - `UPSTREAM_BASE` - Upstream base URL (default: https://www.gravatar.com)
    /// - `ALLOWED_ORIGINS` - Comma-separated domain list (default: empty)
    /// - `UPSTREAM_TIMEOUT_SECS` - Upstream timeout in seconds (default: 30)
    ///
    /// Malformed `CACHE_TTL` or `MAX_CACHE_BYTES` values are rejected.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let cache_ttl = match non_empty_var("CACHE_TTL") {
            Some(raw) => parse_duration(&raw)?,
            None => defaults.cache_ttl,
        };

        let max_cache_bytes = match non_empty_var("MAX_CACHE_BYTES") {
            Some(raw) => raw.parse().map_err(|_| {
                ProxyError::Config(format!("invalid MAX_CACHE_BYTES: {}", raw))
            })?,
            None => defaults.max_cache_bytes,
        };

        Ok(Self {
            port: non_empty_var("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            cache_dir: non_empty_var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            cache_ttl,
            max_cache_bytes,
            upstream_base: non_empty_var("UPSTREAM_BASE").unwrap_or(defaults.upstream_base),
            allowed_origins: non_empty_var("ALLOWED_ORIGINS")
                .map(|v| parse_origins(&v))
                .unwrap_or_default(),
            upstream_timeout: non_empty_var("UPSTREAM_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.upstream_timeout),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            cache_dir: PathBuf::from("./cache"),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            max_cache_bytes: 256 * 1024 * 1024,
            upstream_base: "https://www.gravatar.com".to_string(),
            allowed_origins: Vec::new(),
            upstream_timeout: Duration::from_secs(30),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Splits a comma-separated origin list, dropping blanks.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// == Duration Parsing ==
/// Parses a duration made of `<number><unit>` segments (`ms`, `s`, `m`, `h`),
/// e.g. `24h`, `1h30m`, `500ms`. A bare integer is read as seconds.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let invalid = || ProxyError::Config(format!("invalid duration: {}", raw));
    let input = raw.trim();

    if input.is_empty() {
        return Err(invalid());
    }

    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = input;

    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit_secs = match &rest[..unit_len] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];

        let segment = Duration::try_from_secs_f64(value * unit_secs).map_err(|_| invalid())?;
        total = total.checked_add(segment).ok_or_else(invalid)?;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.cache_dir, PathBuf::from("./cache"));
        assert_eq!(config.cache_ttl, Duration::from_secs(86_400));
        assert_eq!(config.max_cache_bytes, 268_435_456);
        assert_eq!(config.upstream_base, "https://www.gravatar.com");
        assert!(config.allowed_origins.is_empty());
        assert_eq!(config.upstream_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("90m").unwrap(), Duration::from_secs(5_400));
        assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5_400));
        assert_eq!(parse_duration("600").unwrap(), Duration::from_secs(600));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("10").is_ok());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("ten minutes").is_err());
        assert!(parse_duration("5m3").is_err());
    }

    #[test]
    fn test_parse_duration_overflow_is_config_error() {
        let result = parse_duration("99999999999999999999999h");
        assert!(matches!(result, Err(ProxyError::Config(_))));

        let result = parse_duration("5000000000000000h5000000000000000h");
        assert!(matches!(result, Err(ProxyError::Config(_))));

        assert!(parse_duration("99999999999999999999999").is_err());
    }

    #[test]
    fn test_parse_origins() {
        let origins = parse_origins(" example.com, ,foo.org ,");
        assert_eq!(origins, vec!["example.com".to_string(), "foo.org".to_string()]);
        assert!(parse_origins("").is_empty());
    }
}
