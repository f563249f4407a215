//! Per-entry metadata for the render/metadata cache.
//!
//! The LRU core (`crate::lru`) is oblivious to what it stores; the facade
//! (`crate::facade`) layers a content-type tag, a quality tier, and
//! compression bookkeeping on top of each entry. These types are the shape
//! of that per-entry metadata, matching the cache entry fields from the
//! data model: type tag, quality tag, and compression ratio (1.0 when
//! stored uncompressed).

use std::fmt;

/// Content-type tag attached to a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// A rendered page image.
    PageRender,
    /// Extracted page text.
    PageText,
    /// Per-page metadata snapshot.
    PageMetadata,
    /// A page thumbnail.
    Thumbnail,
    /// A search index fragment.
    SearchIndex,
}

impl EntryType {
    /// Stable string form, used as a component of cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::PageRender => "page_render",
            EntryType::PageText => "page_text",
            EntryType::PageMetadata => "page_metadata",
            EntryType::Thumbnail => "thumbnail",
            EntryType::SearchIndex => "search_index",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality tier tag. Ordered low to lossless so the facade can compare
/// tiers when deciding what to purge on a quality-mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Quality {
    Low,
    Medium,
    High,
    Lossless,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
            Quality::Lossless => "lossless",
        }
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality::Medium
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-entry cache-facade metadata layered onto a `CacheEntry`.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntryMeta {
    /// Content-type tag.
    pub entry_type: EntryType,
    /// Quality tier.
    pub quality: Quality,
    /// Ratio of compressed size to original size; 1.0 if stored uncompressed.
    pub compression_ratio: f64,
}

impl Default for CacheEntryMeta {
    fn default() -> Self {
        Self {
            entry_type: EntryType::PageMetadata,
            quality: Quality::Medium,
            compression_ratio: 1.0,
        }
    }
}

impl CacheEntryMeta {
    pub fn new(entry_type: EntryType, quality: Quality) -> Self {
        Self {
            entry_type,
            quality,
            compression_ratio: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_type_as_str_round_trips_through_display() {
        assert_eq!(EntryType::PageRender.as_str(), "page_render");
        assert_eq!(format!("{}", EntryType::Thumbnail), "thumbnail");
    }

    #[test]
    fn quality_orders_low_to_lossless() {
        assert!(Quality::Low < Quality::Medium);
        assert!(Quality::Medium < Quality::High);
        assert!(Quality::High < Quality::Lossless);
    }

    #[test]
    fn default_meta_is_uncompressed_medium() {
        let meta = CacheEntryMeta::default();
        assert_eq!(meta.quality, Quality::Medium);
        assert_eq!(meta.compression_ratio, 1.0);
    }
}
