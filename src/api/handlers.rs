//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::debug;

use crate::cache::{wildcard, CacheEntry, CacheInfo, DocumentCache};
use crate::error::{CacheError, Result};
use crate::models::{
    ContainsResponse, DeleteResponse, EntriesResponse, FilterQuery, GetResponse, HealthResponse,
    KeysResponse, RemovedResponse, SetRequest, SetResponse, ValuesResponse,
};

/// Application state shared across all handlers.
///
/// The cache engine is lock-free; handlers share it through an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<DocumentCache>,
}

impl AppState {
    pub fn new(cache: Arc<DocumentCache>) -> Self {
        Self { cache }
    }
}

/// Handler for PUT /set
///
/// Stores a JSON value with optional life span and idle time.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    state
        .cache
        .put(&req.key, &req.value, req.idle_time(), req.life_span())
        .await?;

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state.cache.get_value(&key).await?;
    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for GET /entry/:key
///
/// Same lookup as `/get`, returning the entry metadata with the value.
pub async fn entry_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<CacheEntry>> {
    Ok(Json(state.cache.get_entry(&key).await?))
}

/// Handler for GET /contains/:key
pub async fn contains_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ContainsResponse>> {
    let exists = state.cache.contains(&key).await?;
    Ok(Json(ContainsResponse::new(key, exists)))
}

/// Handler for DELETE /del/:key
///
/// Responds 404 when no document was stored under the key.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    if !state.cache.remove(&key).await? {
        return Err(CacheError::NotFound(key));
    }
    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for GET /keys?pattern=
pub async fn keys_handler(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<KeysResponse>> {
    let keys = state.cache.keys_matching(wildcard(query.pattern())?).await?;
    Ok(Json(keys.into()))
}

/// Handler for GET /values?pattern=
pub async fn values_handler(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<ValuesResponse>> {
    let values = state.cache.values_matching(wildcard(query.pattern())?).await?;
    Ok(Json(values.into()))
}

/// Handler for GET /entries?pattern=
pub async fn entries_handler(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<EntriesResponse>> {
    let entries = state
        .cache
        .entries_matching(wildcard(query.pattern())?)
        .await?;
    Ok(Json(entries.into()))
}

/// Handler for DELETE /keys?pattern=
///
/// Removes every key matching the pattern; without a pattern, every key.
pub async fn remove_keys_handler(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<RemovedResponse>> {
    let removed = state
        .cache
        .remove_matching(wildcard(query.pattern())?)
        .await?;
    debug!(pattern = query.pattern(), removed, "bulk removal");
    Ok(Json(RemovedResponse { removed }))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<CacheInfo>> {
    Ok(Json(state.cache.info().await?))
}

/// Handler for GET /health
///
/// Healthy only while the backing store answers a ping.
pub async fn health_handler(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    state.cache.ping().await?;
    Ok(Json(HealthResponse::healthy()))
}
