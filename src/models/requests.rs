//! Request models for the avatar proxy API
//!
//! Defines how the avatar path and query string are interpreted.

use std::collections::HashMap;

/// Query parameters forwarded upstream and folded into the cache key.
///
/// - `s`: size in pixels
/// - `d`: default image
/// - `r`: rating
/// - `f`: force default
pub const ALLOWED_PARAMS: [&str; 4] = ["s", "d", "r", "f"];

/// Whitelisted avatar query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvatarQuery {
    pub s: Option<String>,
    pub d: Option<String>,
    pub r: Option<String>,
    pub f: Option<String>,
}

impl AvatarQuery {
    /// Builds the query from raw pairs; unknown names are dropped and the
    /// first occurrence of a repeated name wins.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut query = Self::default();
        for (name, value) in pairs {
            let slot = match name.as_str() {
                "s" => &mut query.s,
                "d" => &mut query.d,
                "r" => &mut query.r,
                "f" => &mut query.f,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        query
    }

    /// Present parameters keyed by name.
    pub fn into_params(self) -> HashMap<String, String> {
        ALLOWED_PARAMS
            .iter()
            .zip([self.s, self.d, self.r, self.f])
            .filter_map(|(name, value)| Some((name.to_string(), value?)))
            .collect()
    }
}

/// Trims and lowercases an avatar hash taken from the path.
pub fn normalize_hash(raw: &str) -> String {
    raw.trim().to_lowercase()
}
