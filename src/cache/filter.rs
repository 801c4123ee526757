//! Cache Filters
//!
//! Key and entry predicates used by the filtered enumeration and bulk removal
//! operations. Any closure with the right signature is a filter.

use glob::{MatchOptions, Pattern};

use crate::cache::document::normalize_key;
use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

/// Predicate over a stored key.
pub trait KeyFilter: Fn(&str) -> bool + Send + Sync {}

impl<F> KeyFilter for F where F: Fn(&str) -> bool + Send + Sync {}

/// Predicate over a full entry.
pub trait EntryFilter: Fn(&CacheEntry) -> bool + Send + Sync {}

impl<F> EntryFilter for F where F: Fn(&CacheEntry) -> bool + Send + Sync {}

/// Accepts exactly `key`, compared case-insensitively.
pub fn key_equals(key: &str) -> impl KeyFilter {
    let wanted = normalize_key(key);
    move |candidate: &str| normalize_key(candidate) == wanted
}

const KEY_MATCH: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Accepts keys matching a case-insensitive glob (`*`, `?`, `[...]`).
///
/// Fails with [`CacheError::InvalidRequest`] when the pattern does not parse.
pub fn wildcard(pattern: &str) -> Result<impl KeyFilter> {
    let pattern = Pattern::new(pattern)
        .map_err(|err| CacheError::InvalidRequest(format!("invalid key pattern `{pattern}`: {err}")))?;
    Ok(move |candidate: &str| pattern.matches_with(candidate, KEY_MATCH))
}
