//! Cache Module
//!
//! Provides a TTL-aware key/value cache whose entries live as documents in a
//! backing store collection.

mod clock;
mod codec;
mod document;
mod engine;
mod entry;
mod filter;
mod stats;


// Re-export public types
pub use clock::{current_timestamp_ms, Clock, ManualClock, SystemClock};
pub use codec::{CodecError, JsonCodec, Value, ValueCodec};
pub use document::{field, normalize_key, CacheDocument};
pub use engine::DocumentCache;
pub use entry::CacheEntry;
pub use filter::{key_equals, wildcard, EntryFilter, KeyFilter};
pub use stats::{CacheInfo, CacheStats, StatsSnapshot};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
