//! Backing Store Module
//!
//! Collection-scoped access to the document store that holds cache entries.
//! The store carries no cache semantics: it finds, replaces, touches and
//! deletes records selected by a [`Selector`].
//!
//! # Implementations
//! - [`MongoStore`] - a MongoDB collection
//! - [`MemoryStore`] - an in-process collection for local runs and tests

mod memory;
mod mongo;

use std::fmt::Debug;

use async_trait::async_trait;
use futures::stream::BoxStream;
use mongodb::bson::{doc, Bson, Document};
use thiserror::Error;

use crate::cache::field;

pub use memory::{IndexSpec, MemoryStore};
pub use mongo::MongoStore;

// == Store Error ==
/// Failure reported by a backing store call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or refused the credentials
    #[error("connection failed: {0}")]
    Connection(String),

    /// The store was reachable but rejected or failed the operation
    #[error("operation failed: {0}")]
    Operation(String),

    /// The call did not complete within the configured bound
    #[error("timed out: {0}")]
    Timeout(String),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        match err.kind.as_ref() {
            ErrorKind::Authentication { .. }
            | ErrorKind::Io(_)
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::ConnectionPoolCleared { .. } => StoreError::Connection(err.to_string()),
            _ => StoreError::Operation(err.to_string()),
        }
    }
}

/// Convenience Result type for store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Records streamed back from a `find`.
pub type RecordStream = BoxStream<'static, StoreResult<Document>>;

// == Selector ==
/// Which records a store call applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Every record in the collection
    All,
    /// Records whose `key` equals the given (already normalized) key
    Key(String),
    /// Records with `0 < expires < now`, optionally restricted to one key
    Expired { key: Option<String>, now: i64 },
    /// The record for `key` unless it is expired at `now`
    Live { key: String, now: i64 },
}

impl Selector {
    /// Builds the MongoDB filter document for this selector.
    pub fn to_filter(&self) -> Document {
        let mut filter = Document::new();
        match self {
            Selector::All => {}
            Selector::Key(key) => {
                filter.insert(field::KEY, key.as_str());
            }
            Selector::Expired { key, now } => {
                if let Some(key) = key {
                    filter.insert(field::KEY, key.as_str());
                }
                filter.insert(field::EXPIRES, doc! { "$gt": 0_i64, "$lt": *now });
            }
            Selector::Live { key, now } => {
                filter.insert(field::KEY, key.as_str());
                let mut unbounded = Document::new();
                unbounded.insert(field::EXPIRES, 0_i64);
                let mut pending = Document::new();
                pending.insert(field::EXPIRES, doc! { "$gte": *now });
                filter.insert("$or", vec![Bson::Document(unbounded), Bson::Document(pending)]);
            }
        }
        filter
    }

    /// Evaluates this selector against a record held in memory.
    ///
    /// Must agree with the filter produced by [`Selector::to_filter`].
    pub fn matches(&self, record: &Document) -> bool {
        match self {
            Selector::All => true,
            Selector::Key(key) => key_is(record, key),
            Selector::Expired { key, now } => {
                key.as_deref().map_or(true, |key| key_is(record, key))
                    && matches!(expires_of(record), Some(expires) if is_past(expires, *now))
            }
            Selector::Live { key, now } => {
                key_is(record, key)
                    && matches!(expires_of(record), Some(expires) if !is_past(expires, *now))
            }
        }
    }
}

/// The one expiry predicate: a zero `expires` never ages out.
pub fn is_past(expires: i64, now: i64) -> bool {
    expires > 0 && expires < now
}

fn key_is(record: &Document, key: &str) -> bool {
    matches!(record.get(field::KEY), Some(Bson::String(stored)) if stored == key)
}

fn expires_of(record: &Document) -> Option<i64> {
    match record.get(field::EXPIRES) {
        Some(Bson::Int64(value)) => Some(*value),
        Some(Bson::Int32(value)) => Some(i64::from(*value)),
        _ => None,
    }
}

// == Projection ==
/// Which fields a `find` should bring back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    Key,
    Data,
    KeyData,
    Full,
}

impl Projection {
    fn fields(&self) -> &'static [&'static str] {
        match self {
            Projection::Key => &[field::KEY],
            Projection::Data => &[field::DATA],
            Projection::KeyData => &[field::KEY, field::DATA],
            Projection::Full => &[],
        }
    }

    /// MongoDB projection document, or `None` for the whole record.
    pub fn to_document(&self) -> Option<Document> {
        if *self == Projection::Full {
            return None;
        }
        let mut projection = Document::new();
        for name in self.fields() {
            projection.insert(*name, 1_i32);
        }
        projection.insert("_id", 0_i32);
        Some(projection)
    }

    /// Applies the projection to an in-memory record.
    pub fn apply(&self, record: &Document) -> Document {
        if *self == Projection::Full {
            return record.clone();
        }
        self.fields()
            .iter()
            .filter_map(|name| record.get(*name).map(|value| (name.to_string(), value.clone())))
            .collect()
    }
}

// == Document Store ==
/// Collection-scoped operations the cache engine needs from its store.
///
/// Every method is a single round trip. `upsert` and `touch` must be atomic
/// per record on the store side.
#[async_trait]
pub trait DocumentStore: Send + Sync + Debug + 'static {
    /// Checks that the store is reachable.
    async fn ping(&self) -> StoreResult<()>;

    /// Streams the records matching `selector`, projected.
    async fn find(&self, selector: &Selector, projection: Projection) -> StoreResult<RecordStream>;

    /// Returns the first full record matching `selector`.
    async fn find_one(&self, selector: &Selector) -> StoreResult<Option<Document>>;

    /// Counts the records matching `selector`.
    async fn count(&self, selector: &Selector) -> StoreResult<u64>;

    /// Replaces the record stored under `key`, inserting it when absent.
    async fn upsert(&self, key: &str, record: Document) -> StoreResult<()>;

    /// Refreshes `lastAccessed`/`lastUpdated` and bumps `hits` on the record
    /// stored under `key`. Never inserts. Returns whether a record matched.
    async fn touch(&self, key: &str, at: i64) -> StoreResult<bool>;

    /// Deletes the first record matching `selector`; returns 0 or 1.
    async fn delete_one(&self, selector: &Selector) -> StoreResult<u64>;

    /// Deletes every record matching `selector`; returns the count.
    async fn delete_many(&self, selector: &Selector) -> StoreResult<u64>;

    /// Creates an ascending index on `field`.
    async fn create_index(&self, field: &str, unique: bool) -> StoreResult<()>;

    /// Drops the whole collection.
    async fn drop_collection(&self) -> StoreResult<()>;
}
