//! Extraction engine (component I): dispatches across registered
//! extractors, combines their output into one schema, and caches results.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::confidence::{self, AggregationMode, ConsistencyChecks, RecordKind, ScoringContext, ValidationEvidence};
use crate::config::{ConfidenceWeights, EngineConfig};
use crate::document::DocumentView;
use crate::metrics::{MetricType, MetricsStore};
use crate::schema::{self, MetadataSchema};

use super::{ExtractionContext, Extractor, ExtractorRegistry};

/// Result of one `extract` call: the combined schema plus any
/// per-extractor failures that were tolerated rather than fatal.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub schema: MetadataSchema,
    pub failures: HashMap<String, String>,
}

/// Upper bound on cached schemas; when exceeded, the oldest 100 entries are
/// dropped at once rather than evicting one at a time (§4.I cache policy).
const CACHE_CAPACITY: usize = 1000;
const CACHE_EVICT_BATCH: usize = 100;

struct CacheEntry {
    key: String,
    outcome: ExtractionOutcome,
}

/// Fans extraction out across registered extractors and combines the
/// results into a single schema.
pub struct ExtractionEngine {
    registry: Arc<ExtractorRegistry>,
    max_workers: usize,
    parallel: bool,
    retry_backoff_base_secs: f64,
    confidence_weights: crate::config::ConfidenceWeights,
    cache_enabled: bool,
    cache: Mutex<VecDeque<CacheEntry>>,
    metrics: Option<Arc<MetricsStore>>,
}

impl std::fmt::Debug for ExtractionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionEngine")
            .field("max_workers", &self.max_workers)
            .field("parallel", &self.parallel)
            .field("cached_schemas", &self.cache.lock().len())
            .finish()
    }
}

impl ExtractionEngine {
    pub fn new(registry: Arc<ExtractorRegistry>, config: &EngineConfig, metrics: Option<Arc<MetricsStore>>) -> Self {
        Self {
            registry,
            max_workers: config.max_workers,
            parallel: config.enable_parallel_extraction,
            retry_backoff_base_secs: config.retry_backoff_base_secs,
            confidence_weights: config.confidence_weights.clone(),
            cache_enabled: config.extraction_cache_enabled,
            cache: Mutex::new(VecDeque::new()),
            metrics,
        }
    }

    fn cache_key(document_id: &str, requested: &Option<Vec<String>>) -> String {
        match requested {
            Some(names) => {
                let mut sorted = names.clone();
                sorted.sort();
                format!("{document_id}:{}", sorted.join(","))
            }
            None => format!("{document_id}:all"),
        }
    }

    fn cached(&self, key: &str) -> Option<ExtractionOutcome> {
        self.cache
            .lock()
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.outcome.clone())
    }

    fn insert_cache(&self, key: String, outcome: ExtractionOutcome) {
        let mut cache = self.cache.lock();
        cache.push_back(CacheEntry { key, outcome });
        if cache.len() > CACHE_CAPACITY {
            for _ in 0..CACHE_EVICT_BATCH {
                cache.pop_front();
            }
        }
    }

    /// Extracts metadata for `document`, selecting extractors by
    /// `requested_names` (or every enabled extractor if `None`).
    pub async fn extract(
        &self,
        document: &dyn DocumentView,
        context: &ExtractionContext,
        requested_names: Option<Vec<String>>,
    ) -> ExtractionOutcome {
        let key = Self::cache_key(document.document_id(), &requested_names);
        if self.cache_enabled {
            if let Some(hit) = self.cached(&key) {
                debug!(document_id = document.document_id(), "extraction cache hit");
                return hit;
            }
        }

        let extractors: Vec<Arc<dyn Extractor>> = match &requested_names {
            Some(names) => names
                .iter()
                .filter_map(|n| self.registry.get(n))
                .filter(|e| e.enabled())
                .collect(),
            None => self.registry.enabled(),
        };

        let start = std::time::Instant::now();
        let (schemas, failures) = if self.parallel {
            self.run_parallel(&extractors, document, context).await
        } else {
            self.run_sequential(&extractors, document, context).await
        };
        let elapsed = start.elapsed();

        if let Some(metrics) = &self.metrics {
            metrics.register("extraction_duration_ms", MetricType::Timing, "ms");
            metrics.record("extraction_duration_ms", elapsed.as_secs_f64() * 1000.0, HashMap::new());
            metrics.register("extraction_success_count", MetricType::System, "count");
            metrics.record("extraction_success_count", schemas.len() as f64, HashMap::new());
        }

        let schema = self.combine(schemas, context);
        let outcome = ExtractionOutcome { schema, failures };

        if self.cache_enabled {
            self.insert_cache(key, outcome.clone());
        }
        outcome
    }

    async fn run_sequential(
        &self,
        extractors: &[Arc<dyn Extractor>],
        document: &dyn DocumentView,
        context: &ExtractionContext,
    ) -> (Vec<(String, MetadataSchema)>, HashMap<String, String>) {
        let mut schemas = Vec::new();
        let mut failures = HashMap::new();
        for extractor in extractors {
            match extractor
                .extract_with_retry(document, context, self.retry_backoff_base_secs)
                .await
            {
                Ok(schema) => schemas.push((extractor.name().to_string(), schema)),
                Err(err) => {
                    warn!(extractor = extractor.name(), error = %err, "extractor failed");
                    failures.insert(extractor.name().to_string(), err.to_string());
                }
            }
        }
        (schemas, failures)
    }

    async fn run_parallel(
        &self,
        extractors: &[Arc<dyn Extractor>],
        document: &dyn DocumentView,
        context: &ExtractionContext,
    ) -> (Vec<(String, MetadataSchema)>, HashMap<String, String>) {
        let semaphore = Arc::new(Semaphore::new(self.max_workers.max(1)));
        let mut handles = Vec::new();

        // `document` and `context` are borrowed for the duration of this
        // call, so extraction tasks run on the current task rather than
        // being spawned onto the runtime; the semaphore caps how many run
        // their extract() body concurrently. The permit must be acquired
        // *inside* the future, as its first action when `join_all` polls
        // it — acquiring it here, before the future exists, would block
        // this loop on the 5th iteration (default max_workers=4) with no
        // in-flight future yet around to release one.
        for extractor in extractors {
            let sem = semaphore.clone();
            let extractor = extractor.clone();
            let backoff = self.retry_backoff_base_secs;
            handles.push(async move {
                let _permit = sem.acquire_owned().await.expect("semaphore is never closed");
                let result = extractor.extract_with_retry(document, context, backoff).await;
                (extractor.name().to_string(), result)
            });
        }

        let results = futures::future::join_all(handles).await;
        let mut schemas = Vec::new();
        let mut failures = HashMap::new();
        for (name, result) in results {
            match result {
                Ok(schema) => schemas.push((name, schema)),
                Err(err) => {
                    warn!(extractor = %name, error = %err, "extractor failed");
                    failures.insert(name, err.to_string());
                }
            }
        }
        (schemas, failures)
    }

    /// Combines multiple per-extractor schemas into one, re-scoring every
    /// record through the confidence scorer using its validation outcome
    /// and the originating extractor's name, then aggregating the result.
    fn combine(&self, schemas: Vec<(String, MetadataSchema)>, context: &ExtractionContext) -> MetadataSchema {
        let mut combined = MetadataSchema::default();
        let mut records: Vec<(RecordKind, f64)> = Vec::new();
        let chain_len = context.extractor_chain.len().max(1);
        let quality_hint = context.source_quality_hint();

        for (extractor_name, schema) in schemas {
            let MetadataSchema {
                document,
                pages,
                mut elements,
                mut relationships,
                ..
            } = schema;

            if let Some(mut doc) = document {
                rescore_document(&mut doc, &extractor_name, chain_len, quality_hint, &self.confidence_weights);
                records.push((RecordKind::Document, doc.confidence.value()));
                combined.document = Some(doc);
            }
            for mut page in pages {
                rescore_page(&mut page, &extractor_name, chain_len, quality_hint, &self.confidence_weights);
                records.push((RecordKind::Page, page.confidence.value()));
                combined.pages.push(page);
            }
            for element in elements.iter_mut() {
                rescore_element(element, &extractor_name, chain_len, quality_hint, &self.confidence_weights);
                records.push((RecordKind::Element, element.confidence.value()));
            }
            combined.elements.append(&mut elements);
            for rel in relationships.iter_mut() {
                rescore_relationship(rel, &extractor_name, chain_len, quality_hint, &self.confidence_weights);
                records.push((RecordKind::Relationship, rel.strength));
            }
            combined.relationships.append(&mut relationships);
        }

        combined.reconcile_counts();
        combined.aggregate_confidence = confidence::aggregate(&records, AggregationMode::WeightedAverage);
        combined
    }

    /// Re-extracts only the extractors relevant to `changed_pages`, merging
    /// the result into `previous` and reporting which pages were recomputed.
    ///
    /// `relevant_extractors` names the extractors the caller has determined
    /// are relevant to this change set (§4.I: "select only extractors
    /// relevant to those changes"); `None` falls back to every enabled
    /// extractor. Regardless of that selection, the fresh result is filtered
    /// down to `changed_pages` before merging, so an extractor that ignores
    /// `requested_pages` and returns whole-document output cannot duplicate
    /// the unchanged records already retained from `previous`.
    pub async fn extract_incremental(
        &self,
        document: &dyn DocumentView,
        context: &ExtractionContext,
        previous: MetadataSchema,
        changed_pages: &[u32],
        relevant_extractors: Option<Vec<String>>,
    ) -> (ExtractionOutcome, Vec<u32>) {
        let scoped_context = ExtractionContext {
            requested_pages: Some(changed_pages.to_vec()),
            options: context.options.clone(),
            extractor_chain: context.extractor_chain.clone(),
        };
        let fresh = self.extract(document, &scoped_context, relevant_extractors).await;

        let mut merged = previous;
        merged.pages.retain(|p| !changed_pages.contains(&p.page_number));
        merged
            .pages
            .extend(fresh.schema.pages.iter().filter(|p| changed_pages.contains(&p.page_number)).cloned());
        merged.elements.retain(|e| {
            e.page_number
                .map(|n| !changed_pages.contains(&n))
                .unwrap_or(true)
        });
        merged.elements.extend(
            fresh
                .schema
                .elements
                .iter()
                .filter(|e| e.page_number.map(|n| changed_pages.contains(&n)).unwrap_or(true))
                .cloned(),
        );
        merged.reconcile_counts();

        (
            ExtractionOutcome {
                schema: merged,
                failures: fresh.failures,
            },
            changed_pages.to_vec(),
        )
    }

    /// Scores a single evidence context without running a full extraction;
    /// used by callers assembling records outside the combine step (e.g.
    /// incremental merges).
    pub fn score_context(&self, ctx: &ScoringContext) -> f64 {
        confidence::score(ctx, &self.confidence_weights)
    }
}

fn validation_evidence(v: &schema::ValidationResult) -> ValidationEvidence {
    ValidationEvidence {
        is_valid: v.is_valid,
        confidence: v.confidence,
        error_count: v.errors.len(),
        warning_count: v.warnings.len(),
    }
}

fn rescore_document(
    doc: &mut schema::DocumentRecord,
    extractor_name: &str,
    chain_len: usize,
    quality_hint: crate::confidence::SourceQuality,
    weights: &ConfidenceWeights,
) {
    let validation = schema::validate_document(doc);
    let fields_present = [
        doc.title.is_some(),
        doc.author.is_some(),
        doc.subject.is_some(),
        doc.creator.is_some(),
        doc.producer.is_some(),
        doc.language.is_some(),
        doc.encoding.is_some(),
        doc.format.is_some(),
    ]
    .iter()
    .filter(|present| **present)
    .count();
    let document_count_mismatch = (doc.page_count > 0 && doc.total_elements == 0)
        || (doc.total_elements > 0 && doc.page_count == 0);

    let ctx = ScoringContext {
        method: None,
        extractor_name: extractor_name.to_string(),
        expected_field_empty: doc.title.as_deref().unwrap_or("").is_empty(),
        non_empty_field_ratio: fields_present as f64 / 8.0,
        own_confidence: doc.confidence.value(),
        validation: Some(validation_evidence(&validation)),
        extractor_chain_len: chain_len,
        source_quality_hint: quality_hint,
        timestamp_diff_secs: Some(0.0),
        consistency: ConsistencyChecks {
            document_count_mismatch,
            ..Default::default()
        },
    };
    doc.confidence = schema::Confidence::new(confidence::score(&ctx, weights));
}

fn rescore_page(
    page: &mut schema::PageRecord,
    extractor_name: &str,
    chain_len: usize,
    quality_hint: crate::confidence::SourceQuality,
    weights: &ConfidenceWeights,
) {
    let validation = schema::validate_page(page);
    let typed_total: u32 = page.element_counts.values().sum();

    let ctx = ScoringContext {
        method: None,
        extractor_name: extractor_name.to_string(),
        expected_field_empty: page.width.is_none() || page.height.is_none(),
        non_empty_field_ratio: if page.width.is_some() && page.height.is_some() {
            1.0
        } else {
            0.6
        },
        own_confidence: page.confidence.value(),
        validation: Some(validation_evidence(&validation)),
        extractor_chain_len: chain_len,
        source_quality_hint: quality_hint,
        timestamp_diff_secs: Some(0.0),
        consistency: ConsistencyChecks {
            page_typed_counts_exceed_total: typed_total > page.element_count,
            ..Default::default()
        },
    };
    page.confidence = schema::Confidence::new(confidence::score(&ctx, weights));
}

fn rescore_element(
    element: &mut schema::ElementRecord,
    extractor_name: &str,
    chain_len: usize,
    quality_hint: crate::confidence::SourceQuality,
    weights: &ConfidenceWeights,
) {
    let validation = schema::validate_element(element);
    let ctx = ScoringContext {
        method: element.detection_method,
        extractor_name: extractor_name.to_string(),
        expected_field_empty: element.text.as_deref().unwrap_or("").trim().is_empty(),
        non_empty_field_ratio: if element.text.is_some() { 1.0 } else { 0.5 },
        own_confidence: element.confidence.value(),
        validation: Some(validation_evidence(&validation)),
        extractor_chain_len: chain_len,
        source_quality_hint: quality_hint,
        timestamp_diff_secs: Some(0.0),
        consistency: ConsistencyChecks::default(),
    };
    element.confidence = schema::Confidence::new(confidence::score(&ctx, weights));
}

fn rescore_relationship(
    rel: &mut schema::RelationshipRecord,
    extractor_name: &str,
    chain_len: usize,
    quality_hint: crate::confidence::SourceQuality,
    weights: &ConfidenceWeights,
) {
    let validation = schema::validate_relationship(rel);
    let ctx = ScoringContext {
        method: None,
        extractor_name: extractor_name.to_string(),
        expected_field_empty: false,
        non_empty_field_ratio: 1.0,
        own_confidence: rel.strength,
        validation: Some(validation_evidence(&validation)),
        extractor_chain_len: chain_len,
        source_quality_hint: quality_hint,
        timestamp_diff_secs: Some(0.0),
        consistency: ConsistencyChecks::default(),
    };
    rel.strength = confidence::score(&ctx, weights);
}
