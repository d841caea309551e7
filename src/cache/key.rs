//! Cache Key Module
//!
//! Derives content-addressed cache keys from a resource path and its query parameters.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use url::form_urlencoded;

/// Separator between the path and each `name=value` pair in the canonical form.
const CANONICAL_SEPARATOR: &str = "?";

/// Length of a derived key (hex-encoded SHA-256).
pub const KEY_LENGTH: usize = 64;

// == Derive Key ==
/// Derives the cache key for a resource.
///
/// Parameter names are sorted lexicographically, so insertion order never
/// affects the result. The path, names and values are percent-encoded before
/// joining, so a `?` or `=` inside any of them cannot pass for a separator.
/// The canonical string is hashed with SHA-256 and returned as lowercase hex.
///
/// # Arguments
/// * `path` - Canonical resource path, e.g. `/avatar/<hash>`
/// * `params` - Whitelisted query parameters
pub fn derive_key(path: &str, params: &HashMap<String, String>) -> String {
    let mut names: Vec<&String> = params.keys().collect();
    names.sort();

    let mut canonical = encode(path);
    for name in names {
        canonical.push_str(CANONICAL_SEPARATOR);
        canonical.push_str(&encode(name));
        canonical.push('=');
        canonical.push_str(&encode(&params[name]));
    }

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn encode(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

/// Returns true if `key` looks like a derived key. Keys become file names, so
/// anything else is refused before touching the disk.
pub fn is_valid_key(key: &str) -> bool {
    key.len() == KEY_LENGTH && key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_identical_inputs_same_key() {
        let a = derive_key("/avatar/test", &params(&[("s", "80"), ("d", "identicon")]));
        let b = derive_key("/avatar/test", &params(&[("s", "80"), ("d", "identicon")]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_parameter_order_does_not_matter() {
        let mut first = HashMap::new();
        first.insert("d".to_string(), "identicon".to_string());
        first.insert("s".to_string(), "80".to_string());

        let mut second = HashMap::new();
        second.insert("s".to_string(), "80".to_string());
        second.insert("d".to_string(), "identicon".to_string());

        assert_eq!(derive_key("/avatar/test", &first), derive_key("/avatar/test", &second));
    }

    #[test]
    fn test_different_values_different_keys() {
        let a = derive_key("/avatar/test", &params(&[("s", "80")]));
        let b = derive_key("/avatar/test", &params(&[("s", "100")]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_different_paths_different_keys() {
        let a = derive_key("/avatar/test1", &params(&[("s", "80")]));
        let b = derive_key("/avatar/test2", &params(&[("s", "80")]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_no_params_differs_from_params() {
        let a = derive_key("/avatar/test", &HashMap::new());
        let b = derive_key("/avatar/test", &params(&[("s", "80")]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_separator_inside_value_does_not_collide() {
        let embedded = derive_key("/avatar/test", &params(&[("d", "x?s=1")]));
        let separate = derive_key("/avatar/test", &params(&[("d", "x"), ("s", "1")]));
        assert_ne!(embedded, separate);

        let in_path = derive_key("/avatar/x?s=1", &HashMap::new());
        let as_param = derive_key("/avatar/x", &params(&[("s", "1")]));
        assert_ne!(in_path, as_param);
    }

    #[test]
    fn test_key_format() {
        let key = derive_key("/avatar/test", &HashMap::new());
        assert_eq!(key.len(), KEY_LENGTH);
        assert!(is_valid_key(&key));
    }

    #[test]
    fn test_is_valid_key_rejects_paths() {
        assert!(!is_valid_key("../index.json"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key(&"A".repeat(KEY_LENGTH)));
    }
}
