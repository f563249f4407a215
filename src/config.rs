//! Engine-wide configuration surface.
//!
//! Mirrors the source's `MetadataConfig` / `ExtractorConfig` / `PerformanceConfig`
//! validators: every documented default from the external-interfaces section
//! lives here, and cross-field constraints (confidence weights summing to 1.0)
//! are checked at construction rather than deferred to first use.

use crate::error::{EngineError, Result};
use std::collections::HashMap;
use std::time::Duration;

/// Confidence scoring weights; must sum to 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceWeights {
    /// Weight of the extraction-method reliability factor.
    pub extraction_method: f64,
    /// Weight of the data-quality factor.
    pub data_quality: f64,
    /// Weight of the validation-result factor.
    pub validation_result: f64,
    /// Weight of the source-reliability factor.
    pub source_reliability: f64,
    /// Weight of the internal-consistency factor.
    pub consistency_check: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            extraction_method: 0.25,
            data_quality: 0.30,
            validation_result: 0.20,
            source_reliability: 0.15,
            consistency_check: 0.10,
        }
    }
}

impl ConfidenceWeights {
    /// Validates that the weights sum to 1.0 within a small tolerance.
    pub fn validate(&self) -> Result<()> {
        let total = self.extraction_method
            + self.data_quality
            + self.validation_result
            + self.source_reliability
            + self.consistency_check;
        if (total - 1.0).abs() > 1e-6 {
            return Err(EngineError::Configuration(format!(
                "confidence weights must sum to 1.0, got {total}"
            )));
        }
        Ok(())
    }
}

/// Top-level engine configuration, covering every documented default.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cache size budget, in megabytes. Default 200.
    pub cache_size_mb: u64,
    /// Maximum number of cache entries; `None` means unbounded by count.
    pub cache_max_entries: Option<usize>,
    /// Maximum pages the prefetch planner will queue. Default 5.
    pub max_preload_pages: usize,
    /// Memory pressure threshold fraction. Default 0.8.
    pub memory_pressure_threshold: f64,
    /// Small pool block size in bytes. Default 64 KiB.
    pub small_pool_block_size: u64,
    /// Medium pool block size in bytes. Default 1 MiB.
    pub medium_pool_block_size: u64,
    /// Large pool block size in bytes. Default 4 MiB.
    pub large_pool_block_size: u64,
    /// Per-pool block capacity (count of reusable blocks held).
    pub pool_capacity: usize,
    /// Metrics sampling interval. Default 1s.
    pub metrics_interval: Duration,
    /// Scheduled memory cleanup interval. Default 30s.
    pub scheduled_cleanup_interval: Duration,
    /// Per-extractor timeout. Default 30s.
    pub extractor_timeout: Duration,
    /// Retry attempts after the first failure. Default 3.
    pub retry_attempts: u32,
    /// Exponential backoff base, in seconds. Default 2.
    pub retry_backoff_base_secs: f64,
    /// Confidence scoring weights.
    pub confidence_weights: ConfidenceWeights,
    /// Maximum number of elements a merge may combine. Default 50.
    pub max_merge_elements: usize,
    /// Minimum text length eligible for split. Default 10.
    pub min_split_text_length: usize,
    /// Minimum segment length before a split warns. Default 5.
    pub min_segment_length: usize,
    /// Maximum concurrent extraction tasks. Default 4.
    pub max_workers: usize,
    /// Whether the extraction engine caches schemas by document+selection.
    pub extraction_cache_enabled: bool,
    /// Whether extractors run concurrently (vs. sequentially).
    pub enable_parallel_extraction: bool,
    /// Free-form custom settings, threaded through extractor configs.
    pub custom_settings: HashMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_size_mb: 200,
            cache_max_entries: None,
            max_preload_pages: 5,
            memory_pressure_threshold: 0.8,
            small_pool_block_size: 64 * 1024,
            medium_pool_block_size: 1024 * 1024,
            large_pool_block_size: 4 * 1024 * 1024,
            pool_capacity: 64,
            metrics_interval: Duration::from_secs(1),
            scheduled_cleanup_interval: Duration::from_secs(30),
            extractor_timeout: Duration::from_secs(30),
            retry_attempts: 3,
            retry_backoff_base_secs: 2.0,
            confidence_weights: ConfidenceWeights::default(),
            max_merge_elements: 50,
            min_split_text_length: 10,
            min_segment_length: 5,
            max_workers: 4,
            extraction_cache_enabled: true,
            enable_parallel_extraction: true,
            custom_settings: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Validates cross-field constraints; called by every constructor that
    /// accepts a caller-supplied configuration.
    pub fn validate(&self) -> Result<()> {
        self.confidence_weights.validate()?;
        if self.cache_size_mb == 0 {
            return Err(EngineError::Configuration(
                "cache_size_mb must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.memory_pressure_threshold) {
            return Err(EngineError::Configuration(
                "memory_pressure_threshold must be in [0, 1]".into(),
            ));
        }
        if self.max_workers == 0 {
            return Err(EngineError::Configuration(
                "max_workers must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Cache size budget in bytes.
    pub fn cache_size_bytes(&self) -> u64 {
        self.cache_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn bad_weights_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.confidence_weights.extraction_method = 0.9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_workers_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.max_workers = 0;
        assert!(cfg.validate().is_err());
    }
}
