//! Metadata extraction engine (components H and I): the `Extractor`
//! contract, a registry of extractors, and the engine that fans out
//! extraction across them with caching, timeouts, and retries.

mod engine;
mod registry;

pub use engine::{ExtractionEngine, ExtractionOutcome};
pub use registry::ExtractorRegistry;

use std::time::Duration;

use async_trait::async_trait;

use crate::document::DocumentView;
use crate::error::{EngineError, Result};
use crate::schema::{ExtractionMethod, MetadataSchema, ValidationResult};

/// Caller-supplied context for one extraction run (glossary: "extraction
/// context"). `options` carries processing hints such as `source_quality`
/// (`"high"` / `"low"`), consumed by the confidence scorer's
/// source-reliability factor.
#[derive(Debug, Clone, Default)]
pub struct ExtractionContext {
    pub requested_pages: Option<Vec<u32>>,
    pub options: std::collections::HashMap<String, String>,
    /// Names of extractors already chained ahead of this run (e.g. through
    /// a prior incremental pass); an empty chain means this is the first.
    pub extractor_chain: Vec<String>,
}

impl ExtractionContext {
    /// The `source_quality` processing hint, if the caller supplied one.
    pub fn source_quality_hint(&self) -> crate::confidence::SourceQuality {
        match self.options.get("source_quality").map(String::as_str) {
            Some("high") => crate::confidence::SourceQuality::High,
            Some("low") => crate::confidence::SourceQuality::Low,
            _ => crate::confidence::SourceQuality::Normal,
        }
    }
}

/// A pluggable metadata extractor.
///
/// Implementations provide `extract` and `validate`; the base-provided
/// `extract_with_validation` and `extract_with_retry` wrap those with the
/// timeout/backoff policy shared by every extractor (§4.H).
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Stable, unique extractor name.
    fn name(&self) -> &str;

    /// Extraction method this extractor reports for confidence scoring.
    fn method(&self) -> ExtractionMethod;

    /// Whether this extractor currently participates in extraction runs.
    fn enabled(&self) -> bool {
        true
    }

    /// Upper bound on how long a single `extract` call may run.
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    /// Maximum retry attempts after the first failure.
    fn retry_attempts(&self) -> u32 {
        3
    }

    /// Runs extraction against `document`.
    async fn extract(&self, document: &dyn DocumentView, context: &ExtractionContext) -> Result<MetadataSchema>;

    /// Validates a schema this extractor (or a downstream combiner) produced.
    fn validate(&self, schema: &MetadataSchema) -> ValidationResult {
        let mut result = ValidationResult::ok(1.0);
        if let Some(doc) = &schema.document {
            result.merge(crate::schema::validate_document(doc));
        }
        for page in &schema.pages {
            result.merge(crate::schema::validate_page(page));
        }
        for element in &schema.elements {
            result.merge(crate::schema::validate_element(element));
        }
        result
    }

    /// Runs `extract`, enforcing this extractor's timeout.
    async fn extract_with_validation(
        &self,
        document: &dyn DocumentView,
        context: &ExtractionContext,
    ) -> Result<MetadataSchema> {
        let fut = self.extract(document, context);
        match tokio::time::timeout(self.timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::ExtractionTimeout {
                name: self.name().to_string(),
                timeout_secs: self.timeout().as_secs_f64(),
            }),
        }
    }

    /// Runs `extract_with_validation`, retrying on failure with exponential
    /// backoff (`base^attempt` seconds) up to `retry_attempts()` times.
    async fn extract_with_retry(
        &self,
        document: &dyn DocumentView,
        context: &ExtractionContext,
        backoff_base_secs: f64,
    ) -> Result<MetadataSchema> {
        let mut last_err = None;
        for attempt in 0..=self.retry_attempts() {
            match self.extract_with_validation(document, context).await {
                Ok(schema) => return Ok(schema),
                Err(err) => {
                    last_err = Some(err);
                    if attempt < self.retry_attempts() {
                        // delay = base^attempt seconds, counting the just-failed
                        // attempt from 1 (so the first retry waits `base`
                        // seconds, the second `base^2`, and so on) (§4.H, S4).
                        let backoff = backoff_base_secs.powi(attempt as i32 + 1);
                        tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| EngineError::Validation("extraction failed with no error recorded".into())))
    }
}
