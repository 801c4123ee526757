//! Request and Response models for the cache server API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{FilterQuery, SetRequest};
pub use responses::{
    ContainsResponse, DeleteResponse, EntriesResponse, ErrorResponse, GetResponse,
    HealthResponse, KeysResponse, RemovedResponse, SetResponse, ValuesResponse,
};
