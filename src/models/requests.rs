//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::cache::MAX_KEY_LENGTH;

/// Request body for the SET operation (PUT /set)
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: Any JSON value
/// - `life_span_ms`: Optional life span in milliseconds; absent or 0 never expires
/// - `idle_time_ms`: Optional idle time in milliseconds; accepted, not enforced
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub life_span_ms: Option<u64>,
    #[serde(default)]
    pub idle_time_ms: Option<u64>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.trim().is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {MAX_KEY_LENGTH} characters"
            ));
        }
        None
    }

    pub fn life_span(&self) -> Option<Duration> {
        self.life_span_ms.map(Duration::from_millis)
    }

    pub fn idle_time(&self) -> Option<Duration> {
        self.idle_time_ms.map(Duration::from_millis)
    }
}

/// Query string accepted by the enumeration and bulk removal endpoints.
///
/// `pattern` is a case-insensitive glob (`*`, `?`); absent means every key.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterQuery {
    #[serde(default)]
    pub pattern: Option<String>,
}

impl FilterQuery {
    pub fn pattern(&self) -> &str {
        self.pattern.as_deref().unwrap_or("*")
    }
}
