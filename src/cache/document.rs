//! Cache Document Module
//!
//! The stored form of one cache entry and its translation to and from the
//! schemaless records held by the backing store.

use mongodb::bson::{spec::BinarySubtype, Binary, Bson, Document};

use crate::error::{CacheError, Result};

/// Field names of a stored cache record.
pub mod field {
    pub const KEY: &str = "key";
    pub const DATA: &str = "data";
    pub const CREATED_ON: &str = "createdOn";
    pub const LAST_UPDATED: &str = "lastUpdated";
    pub const LAST_ACCESSED: &str = "lastAccessed";
    pub const LIFE_SPAN: &str = "lifeSpan";
    pub const EXPIRES: &str = "expires";
    pub const HITS: &str = "hits";
    /// Reserved; idle-based eviction is not enforced.
    pub const TIME_IDLE: &str = "timeIdle";
}

// == Cache Document ==
/// One cache entry as persisted. Timestamps are Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDocument {
    /// Lowercased key, unique per collection
    pub key: String,
    /// Encoded payload, never interpreted here
    pub data: Vec<u8>,
    pub created_on: i64,
    pub last_updated: i64,
    pub last_accessed: i64,
    /// Lifetime in milliseconds, 0 = never expires
    pub life_span: i64,
    /// Absolute expiry, 0 = no expiry
    pub expires: i64,
    pub hits: i64,
    pub time_idle: i64,
}

impl CacheDocument {
    // == Constructor ==
    /// Creates a fresh document created at `now`.
    ///
    /// Negative life spans are treated as 0.
    pub fn new(key: &str, data: Vec<u8>, life_span: i64, now: i64) -> Self {
        let life_span = life_span.max(0);
        Self {
            key: normalize_key(key),
            data,
            created_on: now,
            last_updated: now,
            last_accessed: now,
            life_span,
            expires: expiry_for(now, life_span),
            hits: 0,
            time_idle: 0,
        }
    }

    // == Touch ==
    /// Records an access at `now`.
    pub fn touch(&mut self, now: i64) {
        self.last_accessed = now;
        self.last_updated = now;
        self.hits += 1;
    }

    // == Record Conversion ==
    /// Reads a full record.
    ///
    /// `key` and `data` are required; `timeIdle` defaults to 0 when absent.
    /// Every other numeric field must be present as an integer.
    pub fn from_record(record: &Document) -> Result<Self> {
        Ok(Self {
            key: record_key(record)?,
            data: record_data(record)?,
            created_on: int_field(record, field::CREATED_ON)?,
            last_updated: int_field(record, field::LAST_UPDATED)?,
            last_accessed: int_field(record, field::LAST_ACCESSED)?,
            life_span: int_field(record, field::LIFE_SPAN)?,
            expires: int_field(record, field::EXPIRES)?,
            hits: int_field(record, field::HITS)?,
            time_idle: match record.get(field::TIME_IDLE) {
                None | Some(Bson::Null) => 0,
                Some(_) => int_field(record, field::TIME_IDLE)?,
            },
        })
    }

    /// Builds the record written by an upsert.
    pub fn to_record(&self) -> Document {
        let mut record = Document::new();
        record.insert(field::KEY, self.key.as_str());
        record.insert(
            field::DATA,
            Binary {
                subtype: BinarySubtype::Generic,
                bytes: self.data.clone(),
            },
        );
        record.insert(field::CREATED_ON, self.created_on);
        record.insert(field::LAST_UPDATED, self.last_updated);
        record.insert(field::LAST_ACCESSED, self.last_accessed);
        record.insert(field::LIFE_SPAN, self.life_span);
        record.insert(field::EXPIRES, self.expires);
        record.insert(field::HITS, self.hits);
        record.insert(field::TIME_IDLE, self.time_idle);
        record
    }
}

// == Utility Functions ==
/// Keys are case-insensitive and stored lowercased.
pub fn normalize_key(key: &str) -> String {
    key.to_lowercase()
}

/// `created_on + life_span`, or 0 when the entry never expires.
pub fn expiry_for(created_on: i64, life_span: i64) -> i64 {
    if life_span > 0 {
        created_on.saturating_add(life_span)
    } else {
        0
    }
}

/// Reads the `key` field of a (possibly projected) record.
pub fn record_key(record: &Document) -> Result<String> {
    match record.get(field::KEY) {
        Some(Bson::String(key)) => Ok(key.clone()),
        Some(other) => Err(CacheError::MalformedRecord(format!(
            "`{}` is {:?}, expected a string",
            field::KEY,
            other.element_type()
        ))),
        None => Err(CacheError::MalformedRecord(format!(
            "missing `{}`",
            field::KEY
        ))),
    }
}

/// Reads the `data` field of a (possibly projected) record.
pub fn record_data(record: &Document) -> Result<Vec<u8>> {
    match record.get(field::DATA) {
        Some(Bson::Binary(binary)) => Ok(binary.bytes.clone()),
        Some(other) => Err(CacheError::MalformedRecord(format!(
            "`{}` is {:?}, expected binary",
            field::DATA,
            other.element_type()
        ))),
        None => Err(CacheError::MalformedRecord(format!(
            "missing `{}`",
            field::DATA
        ))),
    }
}

fn int_field(record: &Document, name: &str) -> Result<i64> {
    match record.get(name) {
        Some(Bson::Int64(value)) => Ok(*value),
        Some(Bson::Int32(value)) => Ok(i64::from(*value)),
        Some(other) => Err(CacheError::MalformedRecord(format!(
            "`{name}` is {:?}, expected an integer",
            other.element_type()
        ))),
        None => Err(CacheError::MalformedRecord(format!("missing `{name}`"))),
    }
}
