//! Cache facade (component D): typed keys and per-type storage policies
//! layered over the [`LruCache`] core, wired to the prefetch planner.

use crate::entry::{CacheEntry, Payload};
use crate::lru::LruCache;
use crate::meta::{EntryType, Quality};
use crate::prefetch::PrefetchPlanner;

/// Builds the canonical cache key for a rendered page at a given quality.
pub fn render_key(page: u64, quality: Quality) -> String {
    format!("page_render:{page}:{quality}")
}

/// Builds the canonical cache key for extracted page text.
pub fn text_key(page: u64) -> String {
    format!("page_text:{page}")
}

/// Builds the canonical cache key for page metadata.
pub fn metadata_key(page: u64) -> String {
    format!("page_metadata:{page}")
}

/// Builds the canonical cache key for a thumbnail of the given dimensions.
pub fn thumbnail_key(page: u64, width: u32, height: u32) -> String {
    format!("thumbnail:{page}:{width}x{height}")
}

/// Per-type storage policy: whether payloads are compressed and what
/// quality tag they carry.
struct Policy {
    entry_type: EntryType,
    quality: Quality,
    compress: bool,
}

fn policy_for(entry_type: EntryType, requested_quality: Quality) -> Policy {
    match entry_type {
        EntryType::PageRender => Policy {
            entry_type,
            quality: requested_quality,
            compress: true,
        },
        EntryType::PageText | EntryType::PageMetadata => Policy {
            entry_type,
            quality: Quality::Lossless,
            compress: true,
        },
        EntryType::Thumbnail => Policy {
            entry_type,
            quality: Quality::Medium,
            compress: true,
        },
        EntryType::SearchIndex => Policy {
            entry_type,
            quality: Quality::Lossless,
            compress: true,
        },
    }
}

/// Event emitted when the facade loads an entry so a caller can decide
/// whether to kick off prefetch work.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrefetchHint {
    pub page: u64,
    pub candidates: usize,
}

/// Combines the LRU cache core with prefetch learning and typed accessors.
#[derive(Debug)]
pub struct CacheFacade {
    cache: LruCache,
    prefetch: PrefetchPlanner,
}

impl CacheFacade {
    pub fn new(max_bytes: u64, max_entries: Option<usize>, prefetch_window: usize, max_candidates: usize) -> Self {
        Self {
            cache: LruCache::new(max_bytes, max_entries),
            prefetch: PrefetchPlanner::new(prefetch_window, max_candidates),
        }
    }

    /// Fetches a rendered page at the given quality. On a hit, records the
    /// access for prefetch learning and returns a hint with the resulting
    /// candidate queue size.
    pub fn get_render(&self, page: u64, quality: Quality) -> (Option<CacheEntry>, PrefetchHint) {
        let key = render_key(page, quality);
        let hit = self.cache.get(&key);
        if hit.is_some() {
            self.prefetch.record_access(page);
        }
        let hint = PrefetchHint {
            page,
            candidates: self.prefetch.queue().len(),
        };
        (hit, hint)
    }

    pub fn put_render(&self, page: u64, quality: Quality, payload: Payload) -> Option<CacheEntry> {
        let policy = policy_for(EntryType::PageRender, quality);
        self.cache.put(render_key(page, quality), payload, policy.entry_type, policy.quality, policy.compress)
    }

    pub fn get_text(&self, page: u64) -> Option<CacheEntry> {
        let hit = self.cache.get(&text_key(page));
        if hit.is_some() {
            self.prefetch.record_access(page);
        }
        hit
    }

    pub fn put_text(&self, page: u64, payload: Payload) -> Option<CacheEntry> {
        let policy = policy_for(EntryType::PageText, Quality::Lossless);
        self.cache.put(text_key(page), payload, policy.entry_type, policy.quality, policy.compress)
    }

    pub fn get_metadata(&self, page: u64) -> Option<CacheEntry> {
        let hit = self.cache.get(&metadata_key(page));
        if hit.is_some() {
            self.prefetch.record_access(page);
        }
        hit
    }

    pub fn put_metadata(&self, page: u64, payload: Payload) -> Option<CacheEntry> {
        let policy = policy_for(EntryType::PageMetadata, Quality::Lossless);
        self.cache.put(metadata_key(page), payload, policy.entry_type, policy.quality, policy.compress)
    }

    pub fn get_thumbnail(&self, page: u64, width: u32, height: u32) -> Option<CacheEntry> {
        let hit = self.cache.get(&thumbnail_key(page, width, height));
        if hit.is_some() {
            self.prefetch.record_access(page);
        }
        hit
    }

    pub fn put_thumbnail(&self, page: u64, width: u32, height: u32, payload: Payload) -> Option<CacheEntry> {
        let policy = policy_for(EntryType::Thumbnail, Quality::Medium);
        self.cache
            .put(thumbnail_key(page, width, height), payload, policy.entry_type, policy.quality, policy.compress)
    }

    /// Drops every cached render at or above `quality` (used when a quality
    /// mode change makes higher tiers stale).
    pub fn purge_quality_at_least(&self, quality: Quality) -> usize {
        self.cache.purge_quality_at_least(quality)
    }

    /// Switches the facade's working quality mode. Dropping into `Low` or
    /// `Medium` purges everything cached at `High` or `Lossless` to
    /// recover space, since those tiers have no use once the mode demands
    /// less fidelity (§4.D: "Quality-mode changes at the facade may purge
    /// higher-quality entries").
    pub fn set_quality_mode(&self, quality: Quality) -> usize {
        match quality {
            Quality::Low | Quality::Medium => self.cache.purge_quality_at_least(Quality::High),
            Quality::High | Quality::Lossless => 0,
        }
    }

    pub fn prefetch_queue(&self) -> Vec<crate::prefetch::Candidate> {
        self.prefetch.queue()
    }

    pub fn stats(&self) -> crate::lru::LruStats {
        self.cache.stats()
    }

    pub fn utilization(&self) -> f64 {
        self.cache.utilization()
    }

    /// Drops `ratio` (clamped to `[0, 1]`) of the cache, oldest first.
    /// `ratio = 1.0` (the default per §6) also resets the prefetch planner;
    /// a partial clear leaves prefetch history intact since it reflects
    /// access patterns rather than cache contents.
    pub fn clear(&self, ratio: f64) -> usize {
        let ratio = ratio.clamp(0.0, 1.0);
        if ratio >= 1.0 {
            let dropped = self.cache.len();
            self.cache.clear();
            self.prefetch.clear();
            return dropped;
        }
        self.cache.evict_fraction(ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Quality;

    #[test]
    fn typed_keys_follow_the_documented_format() {
        assert_eq!(render_key(3, Quality::High), "page_render:3:high");
        assert_eq!(text_key(3), "page_text:3");
        assert_eq!(metadata_key(3), "page_metadata:3");
        assert_eq!(thumbnail_key(3, 100, 150), "thumbnail:3:100x150");
    }

    #[test]
    fn put_then_get_render_round_trips() {
        let facade = CacheFacade::new(1_000_000, None, 10, 5);
        facade.put_render(1, Quality::High, Payload::Bytes(vec![1, 2, 3]));
        let (hit, hint) = facade.get_render(1, Quality::High);
        assert!(hit.is_some());
        assert_eq!(hint.page, 1);
    }

    #[test]
    fn get_render_feeds_the_prefetch_planner() {
        let facade = CacheFacade::new(1_000_000, None, 10, 5);
        facade.put_render(5, Quality::Medium, Payload::Bytes(vec![0; 10]));
        let _ = facade.get_render(5, Quality::Medium);
        let queue = facade.prefetch_queue();
        assert!(queue.iter().any(|c| c.page == 6));
    }

    #[test]
    fn get_render_miss_does_not_feed_the_prefetch_planner() {
        let facade = CacheFacade::new(1_000_000, None, 10, 5);
        let _ = facade.get_render(5, Quality::Medium);
        assert!(facade.prefetch_queue().is_empty());
    }

    #[test]
    fn every_get_hit_feeds_the_prefetch_planner() {
        let facade = CacheFacade::new(1_000_000, None, 10, 5);

        facade.put_text(10, Payload::Bytes(b"hello".to_vec()));
        let _ = facade.get_text(10);
        assert!(facade.prefetch_queue().iter().any(|c| c.page == 11));

        facade.put_metadata(20, Payload::Bytes(b"{}".to_vec()));
        let _ = facade.get_metadata(20);
        assert!(facade.prefetch_queue().iter().any(|c| c.page == 21));

        facade.put_thumbnail(30, 100, 100, Payload::Bytes(vec![0; 10]));
        let _ = facade.get_thumbnail(30, 100, 100);
        assert!(facade.prefetch_queue().iter().any(|c| c.page == 31));
    }

    #[test]
    fn purge_quality_at_least_drops_matching_entries_only() {
        let facade = CacheFacade::new(1_000_000, None, 10, 5);
        facade.put_render(1, Quality::High, Payload::Bytes(vec![0; 10]));
        facade.put_render(2, Quality::Low, Payload::Bytes(vec![0; 10]));
        let purged = facade.purge_quality_at_least(Quality::High);
        assert_eq!(purged, 1);
        assert!(facade.get_render(1, Quality::High).0.is_none());
        assert!(facade.get_render(2, Quality::Low).0.is_some());
    }

    #[test]
    fn entering_low_quality_mode_purges_high_and_lossless() {
        let facade = CacheFacade::new(1_000_000, None, 10, 5);
        facade.put_render(1, Quality::High, Payload::Bytes(vec![0; 10]));
        facade.put_text(1, Payload::Bytes(b"lossless text".to_vec()));
        facade.put_render(2, Quality::Low, Payload::Bytes(vec![0; 10]));

        let dropped = facade.set_quality_mode(Quality::Low);
        assert_eq!(dropped, 2);
        assert!(facade.get_render(1, Quality::High).0.is_none());
        assert!(facade.get_text(1).is_none());
        assert!(facade.get_render(2, Quality::Low).0.is_some());
    }

    #[test]
    fn entering_high_quality_mode_purges_nothing() {
        let facade = CacheFacade::new(1_000_000, None, 10, 5);
        facade.put_render(1, Quality::High, Payload::Bytes(vec![0; 10]));
        assert_eq!(facade.set_quality_mode(Quality::Lossless), 0);
        assert!(facade.get_render(1, Quality::High).0.is_some());
    }

    #[test]
    fn clear_with_ratio_one_drops_everything_and_resets_prefetch() {
        let facade = CacheFacade::new(1_000_000, None, 10, 5);
        facade.put_render(1, Quality::High, Payload::Bytes(vec![0; 10]));
        let _ = facade.get_render(1, Quality::High);
        let dropped = facade.clear(1.0);
        assert_eq!(dropped, 1);
        assert!(facade.get_render(1, Quality::High).0.is_none());
        assert!(facade.prefetch_queue().is_empty());
    }

    #[test]
    fn clear_with_partial_ratio_drops_the_oldest_fraction() {
        let facade = CacheFacade::new(1_000_000, None, 10, 5);
        facade.put_render(1, Quality::Medium, Payload::Bytes(vec![0; 10]));
        facade.put_render(2, Quality::Medium, Payload::Bytes(vec![0; 10]));
        let dropped = facade.clear(0.5);
        assert_eq!(dropped, 1);
        assert!(facade.get_render(1, Quality::Medium).0.is_none());
        assert!(facade.get_render(2, Quality::Medium).0.is_some());
    }
}
