//! Cache Entry Module
//!
//! The caller-facing view of a stored document: decoded value plus metadata.

use serde::Serialize;

use crate::cache::codec::{Value, ValueCodec};
use crate::cache::CacheDocument;
use crate::error::{CacheError, Result};

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub key: String,
    /// The decoded value
    pub value: Value,
    /// Creation timestamp (Unix milliseconds)
    pub created_on: i64,
    pub last_updated: i64,
    pub last_accessed: i64,
    /// Lifetime in milliseconds, 0 = never expires
    pub life_span: i64,
    /// Reserved idle time in milliseconds
    pub idle_time: i64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<i64>,
    /// Accesses to this entry, reads and writes alike
    pub hits: i64,
}

impl CacheEntry {
    // == Constructor ==
    /// Decodes a stored document into an entry.
    pub fn from_document(document: &CacheDocument, codec: &dyn ValueCodec) -> Result<Self> {
        let value = codec.decode(&document.data).map_err(|err| CacheError::Decode {
            key: document.key.clone(),
            reason: err.to_string(),
        })?;

        Ok(Self {
            key: document.key.clone(),
            value,
            created_on: document.created_on,
            last_updated: document.last_updated,
            last_accessed: document.last_accessed,
            life_span: document.life_span,
            idle_time: document.time_idle,
            expires_at: (document.expires > 0).then_some(document.expires),
            hits: document.hits,
        })
    }
}
