//! Value Codec Module
//!
//! Turns application values into the opaque payload stored in `data`, and back.

use std::fmt::Debug;

use thiserror::Error;

/// Application value held by the cache.
pub type Value = serde_json::Value;

/// A value could not be encoded or decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CodecError(pub String);

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError(err.to_string())
    }
}

// == Value Codec ==
/// Serialization capability the engine calls into; it never inspects payloads
/// itself.
pub trait ValueCodec: Send + Sync + Debug {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

/// Stores values as UTF-8 JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl ValueCodec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
