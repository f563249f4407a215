//! Confidence scorer (component J): weighted multi-factor scoring for
//! extracted records, plus aggregation across a whole schema.
//!
//! Every factor below follows the literal table in §4.J rather than a
//! qualitative approximation of it, since the numbers themselves (not just
//! their relative ordering) are part of the contract callers can depend on.

use crate::config::ConfidenceWeights;
use crate::schema::ExtractionMethod;

/// The five factors that feed a single confidence score.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceFactors {
    pub extraction_method: f64,
    pub data_quality: f64,
    pub validation_result: f64,
    pub source_reliability: f64,
    pub consistency_check: f64,
}

/// A hint about the overall quality of the originating source, supplied by
/// the caller through `ExtractionContext::options` (§4.J source_reliability:
/// "·1.1 if the context hints high-quality source; ·0.8 if low-quality").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceQuality {
    High,
    #[default]
    Normal,
    Low,
}

/// Outcome of running a record through `validate()`, as consumed by the
/// validation factor.
#[derive(Debug, Clone)]
pub struct ValidationEvidence {
    pub is_valid: bool,
    pub confidence: f64,
    pub error_count: usize,
    pub warning_count: usize,
}

/// Cross-field checks specific to the record's type (§4.J consistency
/// factor: "record-specific cross-field checks").
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsistencyChecks {
    /// Document: `page_count > 0` with `total_elements == 0`, or vice versa.
    pub document_count_mismatch: bool,
    /// Page: the sum of typed element counts exceeds `element_count`.
    pub page_typed_counts_exceed_total: bool,
}

/// Evidence used to derive [`ConfidenceFactors`] for one record.
#[derive(Debug, Clone)]
pub struct ScoringContext {
    /// Extraction method used to produce the record, if known.
    pub method: Option<ExtractionMethod>,
    /// Name of the extractor that produced the record; feeds the
    /// source-reliability table, which keys partly by method and partly by
    /// the extractor's self-described role (§4.J).
    pub extractor_name: String,
    /// Whether an expected textual field (e.g. a title or author) on this
    /// record is empty.
    pub expected_field_empty: bool,
    /// Ratio of non-empty fields to total fields on the record, in `[0, 1]`.
    pub non_empty_field_ratio: f64,
    /// The record's own confidence *before* this scoring pass (an
    /// extractor-reported self-confidence, or 0.0 if none was set).
    pub own_confidence: f64,
    /// The record's validation outcome, if validation was performed.
    pub validation: Option<ValidationEvidence>,
    /// Length of the extractor chain that produced this record so far.
    pub extractor_chain_len: usize,
    /// Caller-supplied source-quality hint.
    pub source_quality_hint: SourceQuality,
    /// Absolute difference, in seconds, between this record's extraction
    /// timestamp and the extraction context's timestamp, if both are known.
    pub timestamp_diff_secs: Option<f64>,
    /// Record-type-specific cross-field checks.
    pub consistency: ConsistencyChecks,
}

impl Default for ScoringContext {
    fn default() -> Self {
        Self {
            method: None,
            extractor_name: String::new(),
            expected_field_empty: false,
            non_empty_field_ratio: 1.0,
            own_confidence: 1.0,
            validation: None,
            extractor_chain_len: 1,
            source_quality_hint: SourceQuality::Normal,
            timestamp_diff_secs: Some(0.0),
            consistency: ConsistencyChecks::default(),
        }
    }
}

/// extraction_method lookup table (§4.J): direct=0.95, rule=0.85,
/// hybrid=0.80, ml=0.75, heuristic=0.70, ocr=0.60, else 0.50.
fn method_score(method: Option<ExtractionMethod>) -> f64 {
    match method {
        Some(ExtractionMethod::DirectParse) => 0.95,
        Some(ExtractionMethod::RuleBased) => 0.85,
        Some(ExtractionMethod::Hybrid) => 0.80,
        Some(ExtractionMethod::Ml) => 0.75,
        Some(ExtractionMethod::Heuristic) => 0.70,
        Some(ExtractionMethod::Ocr) => 0.60,
        None => 0.50,
    }
}

/// data_quality factor (§4.J): starts at 1.0, ·0.9 if an expected textual
/// field is empty, scaled by the non-empty-field ratio mapped into
/// `[0.5, 1.0]`, ·0.7 if the record's own confidence is below 0.3.
fn data_quality_score(ctx: &ScoringContext) -> f64 {
    let mut score = 1.0;
    if ctx.expected_field_empty {
        score *= 0.9;
    }
    score *= 0.5 + 0.5 * ctx.non_empty_field_ratio.clamp(0.0, 1.0);
    if ctx.own_confidence < 0.3 {
        score *= 0.7;
    }
    score.clamp(0.0, 1.0)
}

/// validation factor (§4.J): neutral 0.5 with no validation, 0.2 if
/// invalid, else the validation's own confidence reduced by 0.1 per error
/// (capped at 0.3 total) and 0.02 per warning (capped at 0.1 total).
fn validation_score(ctx: &ScoringContext) -> f64 {
    match &ctx.validation {
        None => 0.5,
        Some(v) if !v.is_valid => 0.2,
        Some(v) => {
            let error_reduction = (0.1 * v.error_count as f64).min(0.3);
            let warning_reduction = (0.02 * v.warning_count as f64).min(0.1);
            (v.confidence - error_reduction - warning_reduction).clamp(0.0, 1.0)
        }
    }
}

/// source_reliability base table (§4.J), keyed by the extractor's
/// self-described name: document 0.90, page 0.85, element 0.80,
/// heuristic 0.70, ocr 0.65, else 0.75. Method-typed extractors
/// (heuristic/ocr) take priority over the record-role buckets, matching
/// the source table's own ordering.
fn source_reliability_base(extractor_name: &str) -> f64 {
    let lower = extractor_name.to_ascii_lowercase();
    if lower.contains("heuristic") {
        0.70
    } else if lower.contains("ocr") {
        0.65
    } else if lower.contains("document") {
        0.90
    } else if lower.contains("page") {
        0.85
    } else if lower.contains("element") {
        0.80
    } else {
        0.75
    }
}

/// source_reliability factor (§4.J): the name-keyed base, ·0.9 if the
/// extractor chain is longer than 3, ·1.1 if the context hints a
/// high-quality source, ·0.8 if it hints a low-quality one.
fn source_reliability_score(ctx: &ScoringContext) -> f64 {
    let mut score = source_reliability_base(&ctx.extractor_name);
    if ctx.extractor_chain_len > 3 {
        score *= 0.9;
    }
    match ctx.source_quality_hint {
        SourceQuality::High => score *= 1.1,
        SourceQuality::Low => score *= 0.8,
        SourceQuality::Normal => {}
    }
    score.clamp(0.0, 1.0)
}

/// consistency factor (§4.J): 1.0, ·0.9 if the record's extraction
/// timestamp differs from the context timestamp by more than 60s, ·0.8 if
/// the record's own confidence is below 0.1 or above 0.99, plus
/// record-specific cross-field checks.
fn consistency_score(ctx: &ScoringContext) -> f64 {
    let mut score: f64 = 1.0;
    if let Some(diff) = ctx.timestamp_diff_secs {
        if diff.abs() > 60.0 {
            score *= 0.9;
        }
    }
    if ctx.own_confidence < 0.1 || ctx.own_confidence > 0.99 {
        score *= 0.8;
    }
    if ctx.consistency.document_count_mismatch {
        score *= 0.7;
    }
    if ctx.consistency.page_typed_counts_exceed_total {
        score *= 0.6;
    }
    score.clamp(0.0, 1.0)
}

/// Computes the five weighted factors for a scoring context.
pub fn compute_factors(ctx: &ScoringContext) -> ConfidenceFactors {
    ConfidenceFactors {
        extraction_method: method_score(ctx.method),
        data_quality: data_quality_score(ctx),
        validation_result: validation_score(ctx),
        source_reliability: source_reliability_score(ctx),
        consistency_check: consistency_score(ctx),
    }
}

/// Combines factors with the configured weights into a single clamped score.
pub fn weighted_score(factors: &ConfidenceFactors, weights: &ConfidenceWeights) -> f64 {
    let raw = factors.extraction_method * weights.extraction_method
        + factors.data_quality * weights.data_quality
        + factors.validation_result * weights.validation_result
        + factors.source_reliability * weights.source_reliability
        + factors.consistency_check * weights.consistency_check;
    raw.clamp(0.0, 1.0)
}

/// Scores one record's evidence end to end.
pub fn score(ctx: &ScoringContext, weights: &ConfidenceWeights) -> f64 {
    weighted_score(&compute_factors(ctx), weights)
}

/// How per-record confidences combine into one aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    /// Weighted average, weighting each record by its record-type weight
    /// (document=1.0, page=0.8, element=0.6, relationship=0.4).
    WeightedAverage,
    Minimum,
    HarmonicMean,
}

/// Record-type weight used by [`AggregationMode::WeightedAverage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Document,
    Page,
    Element,
    Relationship,
}

impl RecordKind {
    fn weight(self) -> f64 {
        match self {
            RecordKind::Document => 1.0,
            RecordKind::Page => 0.8,
            RecordKind::Element => 0.6,
            RecordKind::Relationship => 0.4,
        }
    }
}

/// Aggregates a set of (kind, confidence) pairs into one score.
pub fn aggregate(records: &[(RecordKind, f64)], mode: AggregationMode) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    match mode {
        AggregationMode::WeightedAverage => {
            let total_weight: f64 = records.iter().map(|(k, _)| k.weight()).sum();
            if total_weight == 0.0 {
                return 0.0;
            }
            records.iter().map(|(k, c)| k.weight() * c).sum::<f64>() / total_weight
        }
        AggregationMode::Minimum => records
            .iter()
            .map(|(_, c)| *c)
            .fold(f64::INFINITY, f64::min),
        AggregationMode::HarmonicMean => {
            let n = records.len() as f64;
            let denom: f64 = records.iter().map(|(_, c)| 1.0 / c.max(1e-9)).sum();
            if denom == 0.0 {
                0.0
            } else {
                n / denom
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_weights() -> ConfidenceWeights {
        ConfidenceWeights::default()
    }

    #[test]
    fn method_table_matches_spec_ordering() {
        assert!(method_score(Some(ExtractionMethod::DirectParse)) > method_score(Some(ExtractionMethod::RuleBased)));
        assert!(method_score(Some(ExtractionMethod::RuleBased)) > method_score(Some(ExtractionMethod::Hybrid)));
        assert!(method_score(Some(ExtractionMethod::Hybrid)) > method_score(Some(ExtractionMethod::Ml)));
        assert!(method_score(Some(ExtractionMethod::Ml)) > method_score(Some(ExtractionMethod::Heuristic)));
        assert!(method_score(Some(ExtractionMethod::Heuristic)) > method_score(Some(ExtractionMethod::Ocr)));
        assert!(method_score(Some(ExtractionMethod::Ocr)) > method_score(None));
    }

    #[test]
    fn direct_parse_scores_higher_than_ocr() {
        let w = default_weights();
        let direct = ScoringContext {
            method: Some(ExtractionMethod::DirectParse),
            ..Default::default()
        };
        let ocr = ScoringContext {
            method: Some(ExtractionMethod::Ocr),
            ..Default::default()
        };
        assert!(score(&direct, &w) > score(&ocr, &w));
    }

    #[test]
    fn failed_validation_lowers_score() {
        let w = default_weights();
        let mut ctx = ScoringContext {
            method: Some(ExtractionMethod::DirectParse),
            validation: Some(ValidationEvidence {
                is_valid: true,
                confidence: 1.0,
                error_count: 0,
                warning_count: 0,
            }),
            ..Default::default()
        };
        let passing = score(&ctx, &w);
        ctx.validation = Some(ValidationEvidence {
            is_valid: false,
            confidence: 1.0,
            error_count: 0,
            warning_count: 0,
        });
        let failing = score(&ctx, &w);
        assert!(failing < passing);
    }

    #[test]
    fn validation_errors_and_warnings_reduce_but_cap() {
        let base = ValidationEvidence {
            is_valid: true,
            confidence: 1.0,
            error_count: 0,
            warning_count: 0,
        };
        assert_eq!(
            validation_score(&ScoringContext {
                validation: Some(base.clone()),
                ..Default::default()
            }),
            1.0
        );
        let many_errors = ValidationEvidence {
            error_count: 10,
            ..base.clone()
        };
        assert_eq!(
            validation_score(&ScoringContext {
                validation: Some(many_errors),
                ..Default::default()
            }),
            0.7 // reduction capped at 0.3
        );
    }

    #[test]
    fn longer_extractor_chain_lowers_source_reliability() {
        let ctx_short = ScoringContext {
            extractor_name: "page_extractor".into(),
            extractor_chain_len: 1,
            ..Default::default()
        };
        let ctx_long = ScoringContext {
            extractor_name: "page_extractor".into(),
            extractor_chain_len: 4,
            ..Default::default()
        };
        assert!(source_reliability_score(&ctx_short) > source_reliability_score(&ctx_long));
    }

    #[test]
    fn source_quality_hint_scales_reliability() {
        let normal = ScoringContext {
            extractor_name: "element_extractor".into(),
            ..Default::default()
        };
        let high = ScoringContext {
            source_quality_hint: SourceQuality::High,
            ..normal.clone()
        };
        let low = ScoringContext {
            source_quality_hint: SourceQuality::Low,
            ..normal.clone()
        };
        assert!(source_reliability_score(&high) > source_reliability_score(&normal));
        assert!(source_reliability_score(&low) < source_reliability_score(&normal));
    }

    #[test]
    fn stale_timestamp_and_extreme_confidence_lower_consistency() {
        let fresh = ScoringContext::default();
        let stale = ScoringContext {
            timestamp_diff_secs: Some(120.0),
            ..Default::default()
        };
        assert!(consistency_score(&stale) < consistency_score(&fresh));

        let extreme = ScoringContext {
            own_confidence: 0.999,
            ..Default::default()
        };
        assert!(consistency_score(&extreme) < consistency_score(&fresh));
    }

    #[test]
    fn document_count_mismatch_penalizes_consistency() {
        let clean = ScoringContext::default();
        let mismatched = ScoringContext {
            consistency: ConsistencyChecks {
                document_count_mismatch: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!((consistency_score(&mismatched) - consistency_score(&clean) * 0.7).abs() < 1e-9);
    }

    #[test]
    fn weighted_average_respects_record_kind_weights() {
        let records = vec![(RecordKind::Document, 1.0), (RecordKind::Relationship, 0.0)];
        let agg = aggregate(&records, AggregationMode::WeightedAverage);
        // document weight 1.0 dominates relationship weight 0.4
        assert!(agg > 0.5);
    }

    #[test]
    fn minimum_mode_returns_the_lowest_confidence() {
        let records = vec![(RecordKind::Page, 0.9), (RecordKind::Element, 0.2)];
        assert_eq!(aggregate(&records, AggregationMode::Minimum), 0.2);
    }

    #[test]
    fn harmonic_mean_is_pulled_down_by_low_outliers() {
        let records = vec![(RecordKind::Page, 0.9), (RecordKind::Element, 0.1)];
        let harmonic = aggregate(&records, AggregationMode::HarmonicMean);
        let arithmetic = (0.9 + 0.1) / 2.0;
        assert!(harmonic < arithmetic);
    }

    #[test]
    fn score_is_always_clamped_to_unit_interval() {
        let w = default_weights();
        let ctx = ScoringContext {
            method: Some(ExtractionMethod::DirectParse),
            ..Default::default()
        };
        let s = score(&ctx, &w);
        assert!((0.0..=1.0).contains(&s));
    }
}
