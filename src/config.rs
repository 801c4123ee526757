//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which document store backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    MongoDb,
    /// In-process collection; nothing survives a restart
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(StoreBackend::MongoDb),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown cache backend `{other}`")),
        }
    }
}

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: StoreBackend,
    /// MongoDB connection string
    pub mongo_uri: String,
    pub database: String,
    pub collection: String,
    /// When false the collection is dropped at startup
    pub persist: bool,
    /// HTTP server port
    pub server_port: u16,
    /// Seconds between expired-document sweeps
    pub reclaim_interval_secs: u64,
    /// Upper bound for any single store call, in milliseconds
    pub store_timeout_ms: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_BACKEND` - `mongodb` or `memory` (default: mongodb)
    /// - `MONGO_URI` - Connection string (default: mongodb://localhost:27017)
    /// - `CACHE_DATABASE` - Database name (default: cache)
    /// - `CACHE_COLLECTION` - Collection name (default: entries)
    /// - `CACHE_PERSIST` - Keep entries across restarts (default: true)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `RECLAIM_INTERVAL` - Sweep frequency in seconds (default: 100)
    /// - `STORE_TIMEOUT_MS` - Store call timeout (default: 5000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend: parse_env("CACHE_BACKEND").unwrap_or(defaults.backend),
            mongo_uri: env::var("MONGO_URI").unwrap_or(defaults.mongo_uri),
            database: env::var("CACHE_DATABASE").unwrap_or(defaults.database),
            collection: env::var("CACHE_COLLECTION").unwrap_or(defaults.collection),
            persist: parse_env("CACHE_PERSIST").unwrap_or(defaults.persist),
            server_port: parse_env("SERVER_PORT").unwrap_or(defaults.server_port),
            reclaim_interval_secs: parse_env("RECLAIM_INTERVAL")
                .unwrap_or(defaults.reclaim_interval_secs),
            store_timeout_ms: parse_env("STORE_TIMEOUT_MS").unwrap_or(defaults.store_timeout_ms),
        }
    }

    /// Period of the reclamation task; never zero.
    pub fn reclaim_period(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs.max(1))
    }

    /// Bound applied to every store call; never zero.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms.max(1))
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: StoreBackend::MongoDb,
            mongo_uri: "mongodb://localhost:27017".to_string(),
            database: "cache".to_string(),
            collection: "entries".to_string(),
            persist: true,
            server_port: 3000,
            reclaim_interval_secs: 100,
            store_timeout_ms: 5000,
        }
    }
}
