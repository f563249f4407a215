//! The unified cache entry type backing the LRU core.
//!
//! Every entry tracked by `crate::lru::LruCache` carries its key (so it can
//! be found again once it reaches the tail of the recency list), a payload,
//! a tracked byte size, the facade-level type/quality tags, access
//! bookkeeping, and a compression ratio. This is the concrete record
//! described by the cache entry data model: "sum of entry sizes equals the
//! cache's tracked current size; the entry order in the map reflects
//! access recency."

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::meta::{CacheEntryMeta, EntryType, Quality};

/// The payload a cache entry holds: either opaque bytes (the common case
/// for renders, thumbnails, and compressed text) or an already-decoded
/// structured value (used for in-process metadata snapshots that are never
/// compressed).
#[derive(Debug, Clone)]
pub enum Payload {
    /// Opaque bytes, possibly compressed — see `CacheEntryMeta::compression_ratio`.
    Bytes(Vec<u8>),
    /// A decoded structured value, sized via a JSON-serialization estimator.
    Decoded(Value),
}

impl Payload {
    /// Size in bytes. For `Bytes`, the exact length. For `Decoded`, a
    /// platform-specific estimator (JSON serialization length) since the
    /// in-memory representation has no single canonical byte size.
    pub fn size_bytes(&self) -> u64 {
        match self {
            Payload::Bytes(b) => b.len() as u64,
            Payload::Decoded(v) => serde_json::to_vec(v).map(|b| b.len()).unwrap_or(0) as u64,
        }
    }

    /// Borrows the raw bytes, if this payload is byte-shaped.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Bytes(b) => Some(b),
            Payload::Decoded(_) => None,
        }
    }
}

/// A single cache entry: key, payload, tracked size, and facade metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cache key this entry was stored under.
    pub key: String,
    /// The stored payload.
    pub payload: Payload,
    /// Tracked size in bytes, as computed at insertion time.
    pub size: u64,
    /// Facade-level metadata: content type, quality, compression ratio.
    pub meta: CacheEntryMeta,
    /// Number of times this entry has been retrieved via `get`.
    pub access_count: u64,
    /// Timestamp of the most recent `get` that returned this entry.
    pub last_access: DateTime<Utc>,
    /// Timestamp this entry was first inserted.
    pub created: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates a new entry with the given key, payload, and facade metadata.
    /// `size` is computed from the payload at construction.
    pub fn new(key: String, payload: Payload, meta: CacheEntryMeta) -> Self {
        let now = Utc::now();
        let size = payload.size_bytes();
        Self {
            key,
            payload,
            size,
            meta,
            access_count: 0,
            last_access: now,
            created: now,
        }
    }

    pub fn entry_type(&self) -> EntryType {
        self.meta.entry_type
    }

    pub fn quality(&self) -> Quality {
        self.meta.quality
    }

    /// Records an access: bumps the access counter and refreshes `last_access`.
    pub fn touch(&mut self) {
        self.access_count += 1;
        self.last_access = Utc::now();
    }

    /// Age of the entry since creation, in seconds.
    pub fn age_secs(&self) -> i64 {
        (Utc::now() - self.created).num_seconds().max(0)
    }

    /// Time since the last access, in seconds.
    pub fn idle_secs(&self) -> i64 {
        (Utc::now() - self.last_access).num_seconds().max(0)
    }
}

impl fmt::Display for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheEntry(key={}, type={}, quality={}, size={}B)",
            self.key, self.meta.entry_type, self.meta.quality, self.size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_payload_size_is_exact_length() {
        let p = Payload::Bytes(vec![0u8; 128]);
        assert_eq!(p.size_bytes(), 128);
    }

    #[test]
    fn decoded_payload_size_is_json_estimate() {
        let p = Payload::Decoded(serde_json::json!({"a": 1}));
        assert!(p.size_bytes() > 0);
    }

    #[test]
    fn new_entry_has_zero_access_count() {
        let e = CacheEntry::new(
            "k".into(),
            Payload::Bytes(vec![1, 2, 3]),
            CacheEntryMeta::default(),
        );
        assert_eq!(e.access_count, 0);
        assert_eq!(e.size, 3);
    }

    #[test]
    fn touch_increments_access_count() {
        let mut e = CacheEntry::new(
            "k".into(),
            Payload::Bytes(vec![1]),
            CacheEntryMeta::default(),
        );
        e.touch();
        e.touch();
        assert_eq!(e.access_count, 2);
    }
}
