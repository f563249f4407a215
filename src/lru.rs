//! LRU cache core (component B): an insertion-order keyed map with
//! size- and count-bounded eviction and an optional compression hook.
//!
//! Backed by the intrusive doubly linked list in [`crate::list`] for O(1)
//! promotion and eviction, and a `HashMap<String, *mut list::Entry<_>>` for
//! O(1) lookup — the same split the teacher's `LruSegment` uses, adapted to
//! a single concrete entry type instead of being generic over `K, V`.
//!
//! All operations are serialized by a single mutex; this cache does not
//! attempt lock striping (see §5 of the design: "the cache is in-process
//! and does not attempt lock striping").

use std::collections::HashMap;
use std::num::NonZeroUsize;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use std::io::{Read, Write};

use crate::entry::{CacheEntry, Payload};
use crate::list::{Entry as ListEntry, List};
use crate::meta::{CacheEntryMeta, EntryType, Quality};

/// Payloads below this size are never compressed, even if requested.
const COMPRESSION_MIN_BYTES: usize = 1024;
/// A compression attempt is only kept if it shrinks the payload by at
/// least this fraction.
const COMPRESSION_MIN_RATIO_GAIN: f64 = 0.20;

/// Statistics surfaced by the LRU cache core.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LruStats {
    pub hits: u64,
    pub misses: u64,
    pub size_evictions: u64,
    pub count_evictions: u64,
    pub compressions: u64,
    pub decompressions: u64,
}

impl LruStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Inner {
    list: List<CacheEntry>,
    map: HashMap<String, *mut ListEntry<CacheEntry>>,
    max_bytes: u64,
    current_size: u64,
    stats: LruStats,
}

// SAFETY: all raw pointers in `map` point exclusively into `list`, which is
// owned by the same `Inner`; every access to either goes through the outer
// `Mutex`, so there is no concurrent mutation of the pointee.
unsafe impl Send for Inner {}

/// A size- and count-bounded LRU cache with an opaque compression hook.
///
/// # Invariants (see §8 testable properties)
///
/// - `sum(entry.size) == current_size`
/// - `len(entries) <= max_entries` and `current_size <= max_bytes`
#[derive(Debug)]
pub struct LruCache {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("len", &self.map.len())
            .field("current_size", &self.current_size)
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}

impl LruCache {
    /// Creates a cache bounded by `max_bytes` total content size and, if
    /// `max_entries` is `Some`, by entry count as well.
    pub fn new(max_bytes: u64, max_entries: Option<usize>) -> Self {
        let cap = max_entries
            .and_then(NonZeroUsize::new)
            .unwrap_or_else(|| NonZeroUsize::new(usize::MAX).unwrap());
        Self {
            inner: Mutex::new(Inner {
                list: List::new(cap),
                map: HashMap::new(),
                max_bytes,
                current_size: 0,
                stats: LruStats::default(),
            }),
        }
    }

    /// Looks up `key`, promoting it to most-recent on a hit.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut inner = self.inner.lock();
        let Some(&node) = inner.map.get(key) else {
            inner.stats.misses += 1;
            return None;
        };
        // SAFETY: node was obtained from `map`, which only ever holds
        // pointers into `inner.list`; the mutex excludes concurrent access.
        unsafe {
            inner.list.move_to_front(node);
            let value = (*node).get_value_mut();
            value.touch();
            let out = value.clone();
            inner.stats.hits += 1;
            Some(out)
        }
    }

    /// Inserts or replaces `key`. Returns the entry `key` previously held,
    /// if any — a replacement does not count as an eviction.
    pub fn put(
        &self,
        key: String,
        payload: Payload,
        entry_type: EntryType,
        quality: Quality,
        compress: bool,
    ) -> Option<CacheEntry> {
        let mut inner = self.inner.lock();

        let (payload, compression_ratio) = if compress {
            Self::maybe_compress(payload, &mut inner.stats)
        } else {
            (payload, 1.0)
        };

        let mut meta = CacheEntryMeta::new(entry_type, quality);
        meta.compression_ratio = compression_ratio;
        let size = payload.size_bytes();
        let entry = CacheEntry::new(key.clone(), payload, meta);

        if let Some(&node) = inner.map.get(&key) {
            // Replacement path: subtract the old size, evict around the
            // updated entry if it alone grew past the byte budget, then
            // swap the value in place.
            // SAFETY: `node` was obtained from `map`, which only holds
            // pointers into `inner.list`.
            unsafe {
                inner.list.move_to_front(node);
                let old_size = (*node).get_value().size;
                inner.current_size = inner.current_size.saturating_sub(old_size);
            }
            while inner.map.len() > 1 && inner.current_size + size > inner.max_bytes {
                if Self::evict_lru(&mut inner).is_some() {
                    inner.stats.size_evictions += 1;
                } else {
                    break;
                }
            }
            // SAFETY: node is still valid; it was never detached above.
            let old = unsafe { inner.list.update(node, entry, true).0 };
            inner.current_size += size;
            return old;
        }

        // Fresh-key path: evict until there's room, then append.
        while !inner.map.is_empty()
            && (inner.current_size + size > inner.max_bytes
                || inner.map.len() >= inner.list.cap().get())
        {
            let size_over = inner.current_size + size > inner.max_bytes;
            if Self::evict_lru(&mut inner).is_some() {
                if size_over {
                    inner.stats.size_evictions += 1;
                } else {
                    inner.stats.count_evictions += 1;
                }
            } else {
                break;
            }
        }

        if let Some(node) = inner.list.add(entry) {
            inner.map.insert(key, node);
            inner.current_size += size;
        }

        None
    }

    fn maybe_compress(payload: Payload, stats: &mut LruStats) -> (Payload, f64) {
        let Some(bytes) = payload.as_bytes() else {
            return (payload, 1.0);
        };
        if bytes.len() < COMPRESSION_MIN_BYTES {
            return (payload, 1.0);
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        if encoder.write_all(bytes).is_err() {
            return (payload, 1.0);
        }
        let Ok(compressed) = encoder.finish() else {
            return (payload, 1.0);
        };
        let ratio = compressed.len() as f64 / bytes.len() as f64;
        if ratio <= 1.0 - COMPRESSION_MIN_RATIO_GAIN {
            stats.compressions += 1;
            (Payload::Bytes(compressed), ratio)
        } else {
            (payload, 1.0)
        }
    }

    /// Decompresses a payload previously stored with `compress=true` and a
    /// `compression_ratio < 1.0`. Callers that requested compressed storage
    /// own this step (§4.B: "callers that requested compressed storage are
    /// responsible for decompression when reading").
    pub fn decompress(&self, bytes: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(bytes);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        self.inner.lock().stats.decompressions += 1;
        Ok(out)
    }

    fn evict_lru(inner: &mut Inner) -> Option<CacheEntry> {
        let boxed = inner.list.remove_last()?;
        // SAFETY: `boxed` owns a detached, non-sigil entry produced by
        // `remove_last`; reading its value before drop is sound.
        let value = unsafe { boxed.get_value().clone() };
        inner.map.remove(&value.key);
        inner.current_size = inner.current_size.saturating_sub(value.size);
        Some(value)
    }

    /// Removes `key` unconditionally. Not counted as an eviction.
    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        let mut inner = self.inner.lock();
        let node = inner.map.remove(key)?;
        // SAFETY: node came from `map`, which only holds pointers into `list`.
        let boxed = unsafe { inner.list.remove(node) }?;
        let value = unsafe { boxed.get_value().clone() };
        inner.current_size = inner.current_size.saturating_sub(value.size);
        Some(value)
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.list.clear();
        inner.map.clear();
        inner.current_size = 0;
    }

    /// Drops the least-recently-used `ratio` fraction of entries (clamped
    /// to `[0, 1]`), oldest first. `ratio = 1.0` is equivalent to [`clear`](Self::clear).
    /// Returns the number of entries dropped. Not counted against the
    /// eviction statistics, since this is a deliberate bulk operation
    /// rather than a capacity-driven eviction.
    pub fn evict_fraction(&self, ratio: f64) -> usize {
        let ratio = ratio.clamp(0.0, 1.0);
        let mut inner = self.inner.lock();
        let target = ((inner.map.len() as f64) * ratio).round() as usize;
        let mut dropped = 0;
        for _ in 0..target {
            if Self::evict_lru(&mut inner).is_none() {
                break;
            }
            dropped += 1;
        }
        dropped
    }

    /// Removes every entry whose type tag matches `t`.
    pub fn purge_by_type(&self, t: EntryType) -> usize {
        self.purge_where(|e| e.entry_type() == t)
    }

    /// Removes every entry whose quality tag matches `q`.
    pub fn purge_by_quality(&self, q: Quality) -> usize {
        self.purge_where(|e| e.quality() == q)
    }

    /// Removes every entry at or above quality `q` (used when the facade
    /// drops to a lower quality mode and must recover space from finer
    /// tiers).
    pub fn purge_quality_at_least(&self, q: Quality) -> usize {
        self.purge_where(|e| e.quality() >= q)
    }

    fn purge_where(&self, pred: impl Fn(&CacheEntry) -> bool) -> usize {
        let mut inner = self.inner.lock();
        let keys: Vec<String> = inner
            .map
            .keys()
            .filter(|k| {
                let node = inner.map[*k];
                // SAFETY: node points into `inner.list`.
                pred(unsafe { (*node).get_value() })
            })
            .cloned()
            .collect();
        let mut removed = 0;
        for key in keys {
            if let Some(node) = inner.map.remove(&key) {
                // SAFETY: node came from `map`.
                if let Some(boxed) = unsafe { inner.list.remove(node) } {
                    let value = unsafe { boxed.get_value().clone() };
                    inner.current_size = inner.current_size.saturating_sub(value.size);
                    removed += 1;
                }
            }
        }
        removed
    }

    pub fn stats(&self) -> LruStats {
        self.inner.lock().stats
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current_size(&self) -> u64 {
        self.inner.lock().current_size
    }

    pub fn utilization(&self) -> f64 {
        let inner = self.inner.lock();
        if inner.max_bytes == 0 {
            0.0
        } else {
            inner.current_size as f64 / inner.max_bytes as f64
        }
    }

    /// Snapshot of keys in recency order, head (most recent) first. Test-only
    /// helper for asserting LRU ordering invariants.
    #[cfg(test)]
    fn order_snapshot(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut out = Vec::new();
        let mut node = inner.list.front();
        while let Some(n) = node {
            // SAFETY: walking the live list under the mutex.
            unsafe {
                out.push((*n).get_value().key.clone());
                node = inner.list.next(n);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_bytes(cache: &LruCache, key: &str, bytes: Vec<u8>) {
        cache.put(
            key.to_string(),
            Payload::Bytes(bytes),
            EntryType::PageRender,
            Quality::Medium,
            false,
        );
    }

    #[test]
    fn scenario_s1_size_bounded_eviction() {
        let cache = LruCache::new(3, None);
        put_bytes(&cache, "a", vec![0]);
        put_bytes(&cache, "b", vec![0]);
        put_bytes(&cache, "c", vec![0]);
        put_bytes(&cache, "d", vec![0]);

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert!(cache.get("d").is_some());
        assert_eq!(cache.stats().size_evictions, 1);
    }

    #[test]
    fn get_promotes_past_every_other_present_key() {
        let cache = LruCache::new(1024, None);
        put_bytes(&cache, "a", vec![1]);
        put_bytes(&cache, "b", vec![1]);
        put_bytes(&cache, "c", vec![1]);
        cache.get("a");
        let order = cache.order_snapshot();
        assert_eq!(order.first(), Some(&"a".to_string()));
    }

    #[test]
    fn replacing_an_existing_key_is_not_an_eviction() {
        let cache = LruCache::new(1024, None);
        put_bytes(&cache, "a", vec![1, 2, 3]);
        let before = cache.stats();
        put_bytes(&cache, "a", vec![9, 9]);
        let after = cache.stats();
        assert_eq!(before.size_evictions, after.size_evictions);
        assert_eq!(before.count_evictions, after.count_evictions);
        assert_eq!(cache.current_size(), 2);
    }

    #[test]
    fn idempotent_put_leaves_state_unchanged() {
        let cache = LruCache::new(1024, None);
        put_bytes(&cache, "a", vec![1, 2, 3]);
        put_bytes(&cache, "a", vec![1, 2, 3]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 3);
    }

    #[test]
    fn current_size_matches_sum_of_entry_sizes() {
        let cache = LruCache::new(1024, None);
        put_bytes(&cache, "a", vec![0; 10]);
        put_bytes(&cache, "b", vec![0; 20]);
        assert_eq!(cache.current_size(), 30);
    }

    #[test]
    fn compression_kicks_in_for_large_compressible_payloads() {
        let cache = LruCache::new(1024 * 1024, None);
        let payload = vec![b'x'; 4096];
        cache.put(
            "big".into(),
            Payload::Bytes(payload),
            EntryType::PageText,
            Quality::Lossless,
            true,
        );
        assert_eq!(cache.stats().compressions, 1);
        let entry = cache.get("big").unwrap();
        assert!(entry.meta.compression_ratio < 1.0);
    }

    #[test]
    fn small_payloads_are_never_compressed() {
        let cache = LruCache::new(1024 * 1024, None);
        cache.put(
            "small".into(),
            Payload::Bytes(vec![b'x'; 8]),
            EntryType::PageText,
            Quality::Lossless,
            true,
        );
        assert_eq!(cache.stats().compressions, 0);
    }

    #[test]
    fn purge_by_type_removes_only_matching_entries() {
        let cache = LruCache::new(1024, None);
        cache.put(
            "render".into(),
            Payload::Bytes(vec![1]),
            EntryType::PageRender,
            Quality::Medium,
            false,
        );
        cache.put(
            "text".into(),
            Payload::Bytes(vec![1]),
            EntryType::PageText,
            Quality::Medium,
            false,
        );
        let n = cache.purge_by_type(EntryType::PageRender);
        assert_eq!(n, 1);
        assert!(cache.get("render").is_none());
        assert!(cache.get("text").is_some());
    }

    #[test]
    fn evict_fraction_drops_the_oldest_half() {
        let cache = LruCache::new(1024, None);
        put_bytes(&cache, "a", vec![1]);
        put_bytes(&cache, "b", vec![1]);
        put_bytes(&cache, "c", vec![1]);
        put_bytes(&cache, "d", vec![1]);
        let dropped = cache.evict_fraction(0.5);
        assert_eq!(dropped, 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
        assert!(cache.get("d").is_some());
    }

    #[test]
    fn evict_fraction_one_clears_everything() {
        let cache = LruCache::new(1024, None);
        put_bytes(&cache, "a", vec![1]);
        put_bytes(&cache, "b", vec![1]);
        assert_eq!(cache.evict_fraction(1.0), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn count_bound_evicts_even_with_size_headroom() {
        let cache = LruCache::new(u64::MAX, Some(2));
        put_bytes(&cache, "a", vec![1]);
        put_bytes(&cache, "b", vec![1]);
        put_bytes(&cache, "c", vec![1]);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.stats().count_evictions, 1);
    }
}
