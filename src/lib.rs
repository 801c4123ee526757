//! Mongo Cache - A durable TTL-aware key/value cache
//!
//! Entries live as documents in a MongoDB collection, expire after an optional
//! life span, and are reclaimed lazily on lookup and periodically in the
//! background.

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use backend::{DocumentStore, MemoryStore, MongoStore};
pub use cache::{DocumentCache, Value};
pub use config::{Config, StoreBackend};
pub use error::{CacheError, Result};
pub use tasks::{spawn_reclaim_task, ReclaimTask};
