//! API Module
//!
//! HTTP handlers and routing for the cache server REST API.
//!
//! # Endpoints
//! - `PUT /set` - Store a JSON value with optional life span
//! - `GET /get/:key` - Retrieve a value by key
//! - `GET /entry/:key` - Retrieve a value with its entry metadata
//! - `GET /contains/:key` - Check whether a live entry exists
//! - `DELETE /del/:key` - Delete a key
//! - `GET /keys`, `GET /values`, `GET /entries` - Enumerate, optionally by `?pattern=`
//! - `DELETE /keys` - Delete every key matching `?pattern=`
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Store reachability check

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
