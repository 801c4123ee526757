//! Cache Engine Module
//!
//! Implements the cache contract on top of a [`DocumentStore`]. All shared
//! state lives in the store; the engine itself only holds process-local
//! hit/miss counters, so it needs no locks and is shared behind an `Arc`.
//!
//! Expiry is enforced twice: lazily, by deleting a key's expired document
//! before it is looked up, and eagerly, by the reclamation task calling
//! [`DocumentCache::reclaim_expired`]. Enumeration does neither, so documents
//! that expired since the last sweep can still be listed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use mongodb::bson::Document;
use tracing::{debug, info, warn};

use crate::backend::{
    DocumentStore, Projection, RecordStream, Selector, StoreError, StoreResult,
};
use crate::cache::clock::{Clock, SystemClock};
use crate::cache::codec::{JsonCodec, Value, ValueCodec};
use crate::cache::document::{field, normalize_key, record_data, record_key, CacheDocument};
use crate::cache::filter::{EntryFilter, KeyFilter};
use crate::cache::stats::{CacheInfo, CacheStats, StatsSnapshot};
use crate::cache::CacheEntry;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_reclaim_task, ReclaimTask};

/// Indexes created at startup: `(field, unique)`.
const INDEXES: [(&str, bool); 3] = [
    (field::KEY, true),
    (field::LIFE_SPAN, false),
    (field::EXPIRES, false),
];

// == Document Cache ==
/// TTL-aware key/value cache stored in a document collection.
#[derive(Debug)]
pub struct DocumentCache {
    store: Arc<dyn DocumentStore>,
    codec: Arc<dyn ValueCodec>,
    clock: Arc<dyn Clock>,
    stats: CacheStats,
    /// Bound applied to every store call
    op_timeout: Duration,
    database: String,
    collection: String,
    persist: bool,
}

impl DocumentCache {
    // == Constructor ==
    /// Creates an engine over `store` using the JSON codec and the system clock.
    ///
    /// The store is used as-is; call [`DocumentCache::open`] to prepare the
    /// collection and start reclamation.
    pub fn new(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        Self {
            store,
            codec: Arc::new(JsonCodec),
            clock: Arc::new(SystemClock),
            stats: CacheStats::new(),
            op_timeout: config.store_timeout(),
            database: config.database.clone(),
            collection: config.collection.clone(),
            persist: config.persist,
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn ValueCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // == Lifecycle ==
    /// Prepares the collection: drops it when persistence is off, then creates
    /// the `key` (unique), `lifeSpan` and `expires` indexes.
    pub async fn initialize(&self) -> Result<()> {
        if !self.persist {
            info!(
                "Persistence disabled, dropping {}.{}",
                self.database, self.collection
            );
            self.guarded("drop_collection", self.store.drop_collection())
                .await?;
        }

        for (name, unique) in INDEXES {
            self.guarded("create_index", self.store.create_index(name, unique))
                .await?;
        }
        info!("Indexes ready on {}.{}", self.database, self.collection);
        Ok(())
    }

    /// Initializes the collection and starts the reclamation task.
    ///
    /// Nothing is started unless initialization succeeded. The task stops when
    /// the returned handle is dropped or when the cache itself is dropped.
    pub async fn open(self, reclaim_period: Duration) -> Result<(Arc<Self>, ReclaimTask)> {
        self.initialize().await?;
        let cache = Arc::new(self);
        let reclaimer = spawn_reclaim_task(&cache, reclaim_period);
        Ok((cache, reclaimer))
    }

    /// Checks that the backing store answers.
    pub async fn ping(&self) -> Result<()> {
        self.guarded("ping", self.store.ping()).await
    }

    // == Read Path ==
    /// Returns whether a non-expired entry exists for `key`.
    ///
    /// An expired document for `key` is deleted first, the same way
    /// [`DocumentCache::get_entry`] does, so `contains` never reports an entry
    /// that the next lookup would miss.
    pub async fn contains(&self, key: &str) -> Result<bool> {
        let key = normalize_key(key);
        self.evict_expired(Some(&key)).await?;
        let now = self.clock.now_ms();
        let live = self
            .guarded("count", self.store.count(&Selector::Live { key, now }))
            .await?;
        Ok(live > 0)
    }

    /// Looks up `key`, recording a hit or a miss.
    ///
    /// On a hit the document is touched (`hits`, `lastAccessed`,
    /// `lastUpdated`) in the store and the touched entry is returned.
    pub async fn get_entry(&self, key: &str) -> Result<CacheEntry> {
        let key = normalize_key(key);
        self.evict_expired(Some(&key)).await?;

        let now = self.clock.now_ms();
        let found = self
            .guarded(
                "find_one",
                self.store.find_one(&Selector::Live {
                    key: key.clone(),
                    now,
                }),
            )
            .await?;

        let Some(record) = found else {
            return Err(self.miss(key));
        };

        let mut document = CacheDocument::from_record(&record)?;
        // Removed between the lookup and the touch
        if !self.guarded("touch", self.store.touch(&key, now)).await? {
            return Err(self.miss(key));
        }
        self.stats.record_hit();
        document.touch(now);
        debug!(key = %key, hits = document.hits, "cache hit");

        CacheEntry::from_document(&document, self.codec.as_ref())
    }

    /// Like [`DocumentCache::get_entry`], but a missing key yields `default`.
    pub async fn get_entry_or(&self, key: &str, default: CacheEntry) -> Result<CacheEntry> {
        match self.get_entry(key).await {
            Err(CacheError::NotFound(_)) => Ok(default),
            other => other,
        }
    }

    /// Returns the decoded value stored under `key`.
    pub async fn get_value(&self, key: &str) -> Result<Value> {
        Ok(self.get_entry(key).await?.value)
    }

    /// Like [`DocumentCache::get_value`], but a missing key yields `default`.
    /// Decode and store failures are still reported.
    pub async fn get_value_or(&self, key: &str, default: Value) -> Result<Value> {
        match self.get_value(key).await {
            Err(CacheError::NotFound(_)) => Ok(default),
            other => other,
        }
    }

    // == Write Path ==
    /// Stores `value` under `key`, replacing any existing document.
    ///
    /// `life_span` of `None` or zero means the entry never expires. `idle_time`
    /// is accepted but not enforced. Nothing is written when encoding fails.
    pub async fn put(
        &self,
        key: &str,
        value: &Value,
        idle_time: Option<Duration>,
        life_span: Option<Duration>,
    ) -> Result<()> {
        let key = normalize_key(key);
        let data = self.codec.encode(value).map_err(|err| CacheError::Encode {
            key: key.clone(),
            reason: err.to_string(),
        })?;

        if let Some(idle) = idle_time {
            debug!(key = %key, idle_ms = duration_ms(idle), "idle time is not enforced");
        }

        let now = self.clock.now_ms();
        let mut document = CacheDocument::new(&key, data, life_span.map_or(0, duration_ms), now);
        document.touch(now);

        self.guarded("upsert", self.store.upsert(&key, document.to_record()))
            .await?;
        debug!(key = %key, expires = document.expires, "cache put");
        Ok(())
    }

    // == Removal Path ==
    /// Deletes the document for `key`; returns whether one was deleted.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.delete_key(normalize_key(key)).await? > 0)
    }

    /// Deletes every document whose key passes `filter`; returns the count.
    ///
    /// Keys are streamed from the store and tested one at a time. If a store
    /// call fails midway, documents already deleted stay deleted and the count
    /// is logged with the error.
    pub async fn remove_matching<F: KeyFilter>(&self, filter: F) -> Result<u64> {
        const OP: &str = "remove_matching";
        let mut records = self.open_scan(OP, Projection::Key).await?;
        let mut removed = 0;
        loop {
            let record = match self.next_record(OP, &mut records).await {
                Ok(Some(record)) => record,
                Ok(None) => return Ok(removed),
                Err(err) => return Err(self.interrupted(OP, removed, err)),
            };
            let Some(key) = self.quarantine(record_key(&record)) else {
                continue;
            };
            if filter(key.as_str()) {
                match self.delete_key(key).await {
                    Ok(count) => removed += count,
                    Err(err) => return Err(self.interrupted(OP, removed, err)),
                }
            }
        }
    }

    /// Deletes every document whose entry passes `filter`; returns the count.
    pub async fn remove_where<F: EntryFilter>(&self, filter: F) -> Result<u64> {
        const OP: &str = "remove_where";
        let mut records = self.open_scan(OP, Projection::Full).await?;
        let mut removed = 0;
        loop {
            let record = match self.next_record(OP, &mut records).await {
                Ok(Some(record)) => record,
                Ok(None) => return Ok(removed),
                Err(err) => return Err(self.interrupted(OP, removed, err)),
            };
            let Some(entry) = self.read_entry(&record) else {
                continue;
            };
            if filter(&entry) {
                match self.delete_key(entry.key).await {
                    Ok(count) => removed += count,
                    Err(err) => return Err(self.interrupted(OP, removed, err)),
                }
            }
        }
    }

    /// Deletes every document expired at the current time.
    pub async fn reclaim_expired(&self) -> Result<u64> {
        self.evict_expired(None).await
    }

    // == Enumeration ==
    /// All stored keys. Expired documents not yet swept are included.
    pub async fn keys(&self) -> Result<Vec<String>> {
        self.scan("keys", Projection::Key, |record| {
            self.quarantine(record_key(&record))
        })
        .await
    }

    pub async fn keys_matching<F: KeyFilter>(&self, filter: F) -> Result<Vec<String>> {
        self.scan("keys_matching", Projection::Key, |record| {
            self.quarantine(record_key(&record))
                .filter(|key| filter(key.as_str()))
        })
        .await
    }

    pub async fn keys_where<F: EntryFilter>(&self, filter: F) -> Result<Vec<String>> {
        self.scan("keys_where", Projection::Full, |record| {
            self.read_entry(&record)
                .filter(|entry| filter(entry))
                .map(|entry| entry.key)
        })
        .await
    }

    /// All stored values. Undecodable payloads are skipped.
    pub async fn values(&self) -> Result<Vec<Value>> {
        self.scan("values", Projection::KeyData, |record| {
            let key = self.quarantine(record_key(&record))?;
            self.quarantine(record_data(&record).and_then(|data| self.decode_value(&key, &data)))
        })
        .await
    }

    pub async fn values_matching<F: KeyFilter>(&self, filter: F) -> Result<Vec<Value>> {
        self.scan("values_matching", Projection::KeyData, |record| {
            let key = self.quarantine(record_key(&record))?;
            if !filter(key.as_str()) {
                return None;
            }
            self.quarantine(record_data(&record).and_then(|data| self.decode_value(&key, &data)))
        })
        .await
    }

    pub async fn values_where<F: EntryFilter>(&self, filter: F) -> Result<Vec<Value>> {
        self.scan("values_where", Projection::Full, |record| {
            self.read_entry(&record)
                .filter(|entry| filter(entry))
                .map(|entry| entry.value)
        })
        .await
    }

    /// All stored entries. Malformed records are skipped.
    pub async fn entries(&self) -> Result<Vec<CacheEntry>> {
        self.scan("entries", Projection::Full, |record| self.read_entry(&record))
            .await
    }

    pub async fn entries_matching<F: KeyFilter>(&self, filter: F) -> Result<Vec<CacheEntry>> {
        self.scan("entries_matching", Projection::Full, |record| {
            let key = self.quarantine(record_key(&record))?;
            if !filter(key.as_str()) {
                return None;
            }
            self.read_entry(&record)
        })
        .await
    }

    pub async fn entries_where<F: EntryFilter>(&self, filter: F) -> Result<Vec<CacheEntry>> {
        self.scan("entries_where", Projection::Full, |record| {
            self.read_entry(&record).filter(|entry| filter(entry))
        })
        .await
    }

    // == Statistics ==
    /// Successful lookups since this engine was created.
    pub fn hit_count(&self) -> u64 {
        self.stats.hits()
    }

    /// Failed lookups since this engine was created.
    pub fn miss_count(&self) -> u64 {
        self.stats.misses()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Counters plus collection details.
    pub async fn info(&self) -> Result<CacheInfo> {
        let total_entries = self
            .guarded("count", self.store.count(&Selector::All))
            .await?;
        let stats = self.stats.snapshot();

        Ok(CacheInfo {
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            hit_rate: stats.hit_rate(),
            total_entries,
            database: self.database.clone(),
            collection: self.collection.clone(),
            persist: self.persist,
        })
    }

    // == Internals ==
    /// Runs a store call under the configured timeout.
    async fn guarded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = StoreResult<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.op_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                let limit = self.op_timeout.as_millis();
                warn!(op, limit_ms = limit as u64, "store call timed out");
                Err(StoreError::Timeout(format!("{op} exceeded {limit} ms")).into())
            }
        }
    }

    async fn evict_expired(&self, key: Option<&str>) -> Result<u64> {
        let selector = Selector::Expired {
            key: key.map(str::to_string),
            now: self.clock.now_ms(),
        };
        let evicted = self
            .guarded("delete_many", self.store.delete_many(&selector))
            .await?;

        self.stats.record_evictions(evicted);
        if evicted > 0 {
            debug!(evicted, key = key.unwrap_or("*"), "evicted expired documents");
        }
        Ok(evicted)
    }

    /// Streams the whole collection through `visit`, keeping what it returns.
    async fn scan<T, M>(&self, op: &'static str, projection: Projection, mut visit: M) -> Result<Vec<T>>
    where
        T: Send,
        M: FnMut(Document) -> Option<T> + Send,
    {
        let mut records = self.open_scan(op, projection).await?;
        let mut found = Vec::new();
        while let Some(record) = self.next_record(op, &mut records).await? {
            if let Some(item) = visit(record) {
                found.push(item);
            }
        }
        Ok(found)
    }

    // Each round trip gets its own timeout.
    async fn open_scan(&self, op: &'static str, projection: Projection) -> Result<RecordStream> {
        self.guarded(op, self.store.find(&Selector::All, projection))
            .await
    }

    async fn next_record(
        &self,
        op: &'static str,
        records: &mut RecordStream,
    ) -> Result<Option<Document>> {
        self.guarded(op, async { records.next().await.transpose() })
            .await
    }

    async fn delete_key(&self, key: String) -> Result<u64> {
        self.guarded("delete_one", self.store.delete_one(&Selector::Key(key)))
            .await
    }

    fn interrupted(&self, op: &'static str, removed: u64, err: CacheError) -> CacheError {
        warn!(op, removed, error = %err, "bulk removal stopped early");
        err
    }

    fn miss(&self, key: String) -> CacheError {
        self.stats.record_miss();
        debug!(key = %key, "cache miss");
        CacheError::NotFound(key)
    }

    fn read_entry(&self, record: &Document) -> Option<CacheEntry> {
        self.quarantine(
            CacheDocument::from_record(record)
                .and_then(|document| CacheEntry::from_document(&document, self.codec.as_ref())),
        )
    }

    fn decode_value(&self, key: &str, data: &[u8]) -> Result<Value> {
        self.codec.decode(data).map_err(|err| CacheError::Decode {
            key: key.to_string(),
            reason: err.to_string(),
        })
    }

    /// Skips a record that cannot be read, so one bad record never aborts a scan.
    fn quarantine<T>(&self, parsed: Result<T>) -> Option<T> {
        match parsed {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(collection = %self.collection, error = %err, "skipping unreadable cache record");
                None
            }
        }
    }
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{IndexSpec, MemoryStore};
    use crate::cache::clock::ManualClock;
    use crate::cache::codec::CodecError;
    use mongodb::bson::doc;
    use serde_json::json;

    #[derive(Debug)]
    struct RejectingCodec;

    impl ValueCodec for RejectingCodec {
        fn encode(&self, _: &Value) -> std::result::Result<Vec<u8>, CodecError> {
            Err(CodecError("value is not serializable".into()))
        }

        fn decode(&self, _: &[u8]) -> std::result::Result<Value, CodecError> {
            Err(CodecError("payload is corrupt".into()))
        }
    }

    fn fixture() -> (Arc<MemoryStore>, Arc<ManualClock>, DocumentCache) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = DocumentCache::new(store.clone(), &Config::default()).with_clock(clock.clone());
        (store, clock, cache)
    }

    async fn stored(store: &MemoryStore, key: &str) -> CacheDocument {
        let record = store
            .find_one(&Selector::Key(key.to_string()))
            .await
            .unwrap()
            .unwrap();
        CacheDocument::from_record(&record).unwrap()
    }

    #[tokio::test]
    async fn test_put_writes_touched_document() {
        let (store, _, cache) = fixture();

        cache
            .put("Key", &json!("v"), None, Some(Duration::from_millis(250)))
            .await
            .unwrap();

        let document = stored(&store, "key").await;
        assert_eq!(document.created_on, 1_000);
        assert_eq!(document.last_accessed, 1_000);
        assert_eq!(document.life_span, 250);
        assert_eq!(document.expires, 1_250);
        assert_eq!(document.hits, 1);
    }

    #[tokio::test]
    async fn test_get_touches_stored_document() {
        let (store, clock, cache) = fixture();
        cache.put("k", &json!(1), None, None).await.unwrap();

        clock.advance(500);
        let entry = cache.get_entry("k").await.unwrap();

        assert_eq!(entry.hits, 2);
        assert_eq!(entry.last_accessed, 1_500);
        let document = stored(&store, "k").await;
        assert_eq!(document.hits, 2);
        assert_eq!(document.last_updated, 1_500);
        assert_eq!(document.created_on, 1_000);
    }

    #[tokio::test]
    async fn test_keys_are_case_insensitive() {
        let (_, _, cache) = fixture();
        cache.put("MixedCase", &json!("v"), None, None).await.unwrap();

        assert_eq!(cache.get_value("MIXEDCASE").await.unwrap(), json!("v"));
        assert!(cache.contains("mixedcase").await.unwrap());
        assert_eq!(cache.keys().await.unwrap(), vec!["mixedcase".to_string()]);
    }

    #[tokio::test]
    async fn test_encode_failure_writes_nothing() {
        let (store, _, cache) = fixture();
        let cache = cache.with_codec(Arc::new(RejectingCodec));

        let err = cache.put("k", &json!("v"), None, None).await.unwrap_err();

        assert!(matches!(err, CacheError::Encode { .. }));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_decode_failure_is_not_defaulted() {
        let (store, _, cache) = fixture();
        cache.put("k", &json!("v"), None, None).await.unwrap();
        let cache = DocumentCache::new(store.clone(), &Config::default())
            .with_codec(Arc::new(RejectingCodec));

        let err = cache.get_value("k").await.unwrap_err();
        assert!(matches!(err, CacheError::Decode { .. }));

        let err = cache.get_value_or("k", json!("fallback")).await.unwrap_err();
        assert!(matches!(err, CacheError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_get_value_or_default_counts_one_miss() {
        let (_, _, cache) = fixture();

        let value = cache.get_value_or("absent", json!(7)).await.unwrap();

        assert_eq!(value, json!(7));
        assert_eq!(cache.miss_count(), 1);
        assert_eq!(cache.hit_count(), 0);
    }

    #[tokio::test]
    async fn test_get_entry_or_default() {
        let (_, _, cache) = fixture();
        cache.put("present", &json!("x"), None, None).await.unwrap();
        let default = cache.get_entry("present").await.unwrap();

        let entry = cache.get_entry_or("absent", default.clone()).await.unwrap();
        assert_eq!(entry, default);
    }

    #[tokio::test]
    async fn test_contains_evicts_expired_document() {
        let (store, clock, cache) = fixture();
        cache
            .put("k", &json!("v"), None, Some(Duration::from_millis(100)))
            .await
            .unwrap();

        clock.advance(101);

        assert!(!cache.contains("k").await.unwrap());
        assert!(store.is_empty().await);
        assert_eq!(cache.stats().evictions, 1);
        // contains is not a lookup
        assert_eq!(cache.miss_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_records_are_skipped_in_scans() {
        let (store, _, cache) = fixture();
        cache.put("good", &json!("v"), None, None).await.unwrap();
        store.insert_raw(doc! { "key": "broken" }).await;
        store.insert_raw(doc! { "data": "no key" }).await;

        assert_eq!(cache.entries().await.unwrap().len(), 1);
        assert_eq!(cache.values().await.unwrap(), vec![json!("v")]);
        assert_eq!(
            cache.keys().await.unwrap(),
            vec!["good".to_string(), "broken".to_string()]
        );
    }

    #[tokio::test]
    async fn test_values_read_key_with_payload() {
        let (store, _, cache) = fixture();
        cache.put("good", &json!("v"), None, None).await.unwrap();
        let mut orphan = CacheDocument::new("orphan", b"\"lost\"".to_vec(), 0, 0).to_record();
        orphan.remove(field::KEY);
        store.insert_raw(orphan).await;

        // A decodable payload without a key is still skipped
        assert_eq!(cache.values().await.unwrap(), vec![json!("v")]);
    }

    #[tokio::test]
    async fn test_malformed_record_lookup_fails() {
        let (store, _, cache) = fixture();
        store
            .insert_raw(doc! { "key": "broken", "expires": 0_i64 })
            .await;

        let err = cache.get_entry("broken").await.unwrap_err();
        assert!(matches!(err, CacheError::MalformedRecord(_)));
    }

    #[tokio::test]
    async fn test_enumeration_includes_unswept_expired_documents() {
        let (_, clock, cache) = fixture();
        cache
            .put("stale", &json!("old"), None, Some(Duration::from_millis(10)))
            .await
            .unwrap();
        clock.advance(1_000);

        assert_eq!(cache.keys().await.unwrap(), vec!["stale".to_string()]);
        assert_eq!(cache.values().await.unwrap(), vec![json!("old")]);
    }

    #[tokio::test]
    async fn test_filtered_enumeration() {
        let (_, _, cache) = fixture();
        cache.put("user:1", &json!({"age": 30}), None, None).await.unwrap();
        cache.put("user:2", &json!({"age": 12}), None, None).await.unwrap();
        cache.put("session:1", &json!({"age": 99}), None, None).await.unwrap();

        let users = cache
            .keys_matching(|key: &str| key.starts_with("user:"))
            .await
            .unwrap();
        assert_eq!(users, vec!["user:1".to_string(), "user:2".to_string()]);

        let adults = cache
            .keys_where(|entry: &CacheEntry| entry.value["age"].as_i64() >= Some(18))
            .await
            .unwrap();
        assert_eq!(adults, vec!["user:1".to_string(), "session:1".to_string()]);

        let values = cache
            .values_matching(|key: &str| key == "user:2")
            .await
            .unwrap();
        assert_eq!(values, vec![json!({"age": 12})]);

        let values = cache
            .values_where(|entry: &CacheEntry| entry.key.starts_with("session"))
            .await
            .unwrap();
        assert_eq!(values, vec![json!({"age": 99})]);

        let entries = cache
            .entries_matching(|key: &str| key.ends_with(":1"))
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);

        let entries = cache
            .entries_where(|entry: &CacheEntry| entry.value["age"] == json!(12))
            .await
            .unwrap();
        assert_eq!(entries[0].key, "user:2");
    }

    #[tokio::test]
    async fn test_remove_where_counts_deletions() {
        let (store, _, cache) = fixture();
        cache.put("a", &json!(1), None, None).await.unwrap();
        cache.put("b", &json!(2), None, None).await.unwrap();
        cache.put("c", &json!(3), None, None).await.unwrap();

        let removed = cache
            .remove_where(|entry: &CacheEntry| entry.value.as_i64().unwrap_or(0) >= 2)
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_idle_time_is_accepted_but_not_stored() {
        let (store, clock, cache) = fixture();
        cache
            .put("k", &json!("v"), Some(Duration::from_millis(10)), None)
            .await
            .unwrap();

        clock.advance(60_000);

        assert_eq!(stored(&store, "k").await.time_idle, 0);
        assert!(cache.contains("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_failure_is_reported_not_counted() {
        let (store, _, cache) = fixture();
        store.set_unavailable(true);

        let err = cache.get_value("k").await.unwrap_err();

        assert!(matches!(
            err,
            CacheError::StoreUnavailable(StoreError::Connection(_))
        ));
        assert_eq!(cache.miss_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(200)));
        let config = Config {
            store_timeout_ms: 20,
            ..Config::default()
        };
        let cache = DocumentCache::new(store, &config);

        let err = cache.contains("k").await.unwrap_err();
        assert!(matches!(
            err,
            CacheError::StoreUnavailable(StoreError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_bulk_operations_bound_each_store_call() {
        // 15 ms per call: every call fits the 100 ms bound, the whole sweep does not
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(15)));
        let config = Config {
            store_timeout_ms: 100,
            ..Config::default()
        };
        let cache = DocumentCache::new(store.clone(), &config);
        for n in 0..10 {
            cache.put(&format!("k{n}"), &json!(n), None, None).await.unwrap();
        }

        assert_eq!(cache.keys().await.unwrap().len(), 10);
        assert_eq!(cache.values().await.unwrap().len(), 10);

        let removed = cache
            .remove_where(|entry: &CacheEntry| entry.value.as_i64() < Some(5))
            .await
            .unwrap();
        assert_eq!(removed, 5);

        let removed = cache.remove_matching(|_: &str| true).await.unwrap();
        assert_eq!(removed, 5);
        assert!(store.is_empty().await);
    }

    /// Deletes the record instead of touching it, as if another client
    /// removed it between the lookup and the touch.
    #[derive(Debug, Default)]
    struct VanishingStore {
        inner: MemoryStore,
    }

    #[async_trait::async_trait]
    impl DocumentStore for VanishingStore {
        async fn ping(&self) -> StoreResult<()> {
            self.inner.ping().await
        }

        async fn find(
            &self,
            selector: &Selector,
            projection: Projection,
        ) -> StoreResult<RecordStream> {
            self.inner.find(selector, projection).await
        }

        async fn find_one(&self, selector: &Selector) -> StoreResult<Option<Document>> {
            self.inner.find_one(selector).await
        }

        async fn count(&self, selector: &Selector) -> StoreResult<u64> {
            self.inner.count(selector).await
        }

        async fn upsert(&self, key: &str, record: Document) -> StoreResult<()> {
            self.inner.upsert(key, record).await
        }

        async fn touch(&self, key: &str, _at: i64) -> StoreResult<bool> {
            self.inner.delete_one(&Selector::Key(key.to_string())).await?;
            Ok(false)
        }

        async fn delete_one(&self, selector: &Selector) -> StoreResult<u64> {
            self.inner.delete_one(selector).await
        }

        async fn delete_many(&self, selector: &Selector) -> StoreResult<u64> {
            self.inner.delete_many(selector).await
        }

        async fn create_index(&self, field: &str, unique: bool) -> StoreResult<()> {
            self.inner.create_index(field, unique).await
        }

        async fn drop_collection(&self) -> StoreResult<()> {
            self.inner.drop_collection().await
        }
    }

    #[tokio::test]
    async fn test_document_removed_before_touch_is_a_miss() {
        let store = Arc::new(VanishingStore::default());
        let cache = DocumentCache::new(store.clone(), &Config::default());
        store
            .upsert("k", CacheDocument::new("k", b"1".to_vec(), 0, 0).to_record())
            .await
            .unwrap();

        let err = cache.get_value("k").await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(cache.hit_count(), 0);
        assert_eq!(cache.miss_count(), 1);
    }

    #[tokio::test]
    async fn test_initialize_creates_indexes() {
        let (store, _, cache) = fixture();
        cache.put("kept", &json!("v"), None, None).await.unwrap();

        cache.initialize().await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.indexes().await,
            vec![
                IndexSpec {
                    field: "key".to_string(),
                    unique: true
                },
                IndexSpec {
                    field: "lifeSpan".to_string(),
                    unique: false
                },
                IndexSpec {
                    field: "expires".to_string(),
                    unique: false
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_initialize_without_persistence_clears_collection() {
        let store = Arc::new(MemoryStore::new());
        let config = Config {
            persist: false,
            ..Config::default()
        };
        DocumentCache::new(store.clone(), &Config::default())
            .put("old", &json!("v"), None, None)
            .await
            .unwrap();

        DocumentCache::new(store.clone(), &config)
            .initialize()
            .await
            .unwrap();

        assert!(store.is_empty().await);
        assert_eq!(store.indexes().await.len(), 3);
    }

    #[tokio::test]
    async fn test_open_fails_loudly_when_store_is_down() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);

        let result = DocumentCache::new(store.clone(), &Config::default())
            .open(Duration::from_secs(100))
            .await;

        assert!(result.is_err());
        assert!(store.indexes().await.is_empty());
    }

    #[tokio::test]
    async fn test_info_reports_collection_and_counters() {
        let (_, _, cache) = fixture();
        cache.put("a", &json!(1), None, None).await.unwrap();
        cache.get_value("a").await.unwrap();
        let _ = cache.get_value("b").await;

        let info = cache.info().await.unwrap();
        assert_eq!(info.hits, 1);
        assert_eq!(info.misses, 1);
        assert_eq!(info.hit_rate, 0.5);
        assert_eq!(info.total_entries, 1);
        assert_eq!(info.database, "cache");
        assert_eq!(info.collection, "entries");
        assert!(info.persist);
    }
}
