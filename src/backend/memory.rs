//! In-process document store
//!
//! Keeps the collection in a `Vec<Document>` behind a tokio `RwLock`. Record
//! selection goes through [`Selector::matches`], so expiry is evaluated the
//! same way the MongoDB filters evaluate it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use mongodb::bson::{Bson, Document};
use tokio::sync::RwLock;

use super::{DocumentStore, Projection, RecordStream, Selector, StoreError, StoreResult};
use crate::cache::field;

/// An index registered through `create_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub field: String,
    pub unique: bool,
}

// == Memory Store ==
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<Document>>,
    indexes: RwLock<Vec<IndexSpec>>,
    unavailable: AtomicBool,
    latency: Option<Duration>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// While set, every call fails with [`StoreError::Connection`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Appends a record as-is, bypassing the cache document layout.
    pub async fn insert_raw(&self, record: Document) {
        self.records.write().await.push(record);
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Indexes created so far.
    pub async fn indexes(&self) -> Vec<IndexSpec> {
        self.indexes.read().await.clone()
    }

    async fn check(&self, op: &str) -> StoreResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Connection(format!(
                "memory store offline during {op}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.check("ping").await
    }

    async fn find(&self, selector: &Selector, projection: Projection) -> StoreResult<RecordStream> {
        self.check("find").await?;
        let snapshot: Vec<Document> = self
            .records
            .read()
            .await
            .iter()
            .filter(|record| selector.matches(record))
            .map(|record| projection.apply(record))
            .collect();
        Ok(stream::iter(snapshot.into_iter().map(Ok)).boxed())
    }

    async fn find_one(&self, selector: &Selector) -> StoreResult<Option<Document>> {
        self.check("find_one").await?;
        let records = self.records.read().await;
        Ok(records.iter().find(|record| selector.matches(record)).cloned())
    }

    async fn count(&self, selector: &Selector) -> StoreResult<u64> {
        self.check("count").await?;
        let records = self.records.read().await;
        Ok(records.iter().filter(|record| selector.matches(record)).count() as u64)
    }

    async fn upsert(&self, key: &str, record: Document) -> StoreResult<()> {
        self.check("upsert").await?;
        let selector = Selector::Key(key.to_string());
        let mut records = self.records.write().await;
        match records.iter_mut().find(|existing| selector.matches(existing)) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Ok(())
    }

    async fn touch(&self, key: &str, at: i64) -> StoreResult<bool> {
        self.check("touch").await?;
        let selector = Selector::Key(key.to_string());
        let mut records = self.records.write().await;
        let Some(record) = records.iter_mut().find(|existing| selector.matches(existing)) else {
            return Ok(false);
        };

        let hits = match record.get(field::HITS) {
            Some(Bson::Int64(hits)) => *hits,
            Some(Bson::Int32(hits)) => i64::from(*hits),
            _ => 0,
        };
        record.insert(field::LAST_ACCESSED, at);
        record.insert(field::LAST_UPDATED, at);
        record.insert(field::HITS, hits + 1);
        Ok(true)
    }

    async fn delete_one(&self, selector: &Selector) -> StoreResult<u64> {
        self.check("delete_one").await?;
        let mut records = self.records.write().await;
        match records.iter().position(|record| selector.matches(record)) {
            Some(index) => {
                records.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_many(&self, selector: &Selector) -> StoreResult<u64> {
        self.check("delete_many").await?;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|record| !selector.matches(record));
        Ok((before - records.len()) as u64)
    }

    async fn create_index(&self, field: &str, unique: bool) -> StoreResult<()> {
        self.check("create_index").await?;
        if unique {
            let records = self.records.read().await;
            let mut seen = std::collections::HashSet::new();
            for value in records.iter().filter_map(|record| record.get(field)) {
                if !seen.insert(value.to_string()) {
                    return Err(StoreError::Operation(format!(
                        "duplicate value {value} for unique index on `{field}`"
                    )));
                }
            }
        }

        let spec = IndexSpec {
            field: field.to_string(),
            unique,
        };
        let mut indexes = self.indexes.write().await;
        if !indexes.contains(&spec) {
            indexes.push(spec);
        }
        Ok(())
    }

    async fn drop_collection(&self) -> StoreResult<()> {
        self.check("drop_collection").await?;
        self.records.write().await.clear();
        self.indexes.write().await.clear();
        Ok(())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use mongodb::bson::doc;

    fn record(key: &str, expires: i64) -> Document {
        doc! { "key": key, "data": "x", "expires": expires, "hits": 0_i64 }
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_replaces() {
        let store = MemoryStore::new();

        store.upsert("a", record("a", 0)).await.unwrap();
        store.upsert("a", doc! { "key": "a", "data": "y" }).await.unwrap();

        assert_eq!(store.len().await, 1);
        let found = store.find_one(&Selector::Key("a".into())).await.unwrap().unwrap();
        assert_eq!(found.get_str("data").unwrap(), "y");
    }

    #[tokio::test]
    async fn test_touch_bumps_hits_without_inserting() {
        let store = MemoryStore::new();
        store.upsert("a", record("a", 0)).await.unwrap();

        assert!(store.touch("a", 42).await.unwrap());
        assert!(!store.touch("missing", 42).await.unwrap());

        let found = store.find_one(&Selector::Key("a".into())).await.unwrap().unwrap();
        assert_eq!(found.get_i64("hits").unwrap(), 1);
        assert_eq!(found.get_i64("lastAccessed").unwrap(), 42);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_many_expired() {
        let store = MemoryStore::new();
        store.upsert("a", record("a", 0)).await.unwrap();
        store.upsert("b", record("b", 10)).await.unwrap();
        store.upsert("c", record("c", 5000)).await.unwrap();

        let removed = store
            .delete_many(&Selector::Expired { key: None, now: 100 })
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_find_projects_fields() {
        let store = MemoryStore::new();
        store.upsert("a", record("a", 0)).await.unwrap();

        let found: Vec<Document> = store
            .find(&Selector::All, Projection::Key)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(found, vec![doc! { "key": "a" }]);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_calls() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        let err = store.count(&Selector::All).await.unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));

        store.set_unavailable(false);
        assert_eq!(store.count(&Selector::All).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unique_index_rejects_duplicates() {
        let store = MemoryStore::new();
        store.insert_raw(record("a", 0)).await;
        store.insert_raw(record("a", 0)).await;

        assert!(store.create_index("key", true).await.is_err());
        assert!(store.create_index("expires", false).await.is_ok());
        assert_eq!(
            store.indexes().await,
            vec![IndexSpec {
                field: "expires".to_string(),
                unique: false
            }]
        );
    }

    #[tokio::test]
    async fn test_drop_collection_clears_everything() {
        let store = MemoryStore::new();
        store.upsert("a", record("a", 0)).await.unwrap();
        store.create_index("key", true).await.unwrap();

        store.drop_collection().await.unwrap();

        assert!(store.is_empty().await);
        assert!(store.indexes().await.is_empty());
    }
}
