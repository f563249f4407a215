//! Split operation (component M): partitions one element into several,
//! with an optional search for natural split points.

use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::schema::{BoundingBox, Confidence, ElementRecord};

/// Confidence is multiplied by this factor per split segment, reflecting
/// the added uncertainty of a derived record (§4.M).
const SPLIT_CONFIDENCE_DECAY: f64 = 0.95;

/// Outcome of validating a proposed split before executing it.
#[derive(Debug, Clone, Default)]
pub struct SplitPreconditions {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Checks the preconditions for splitting `element` at `split_points`
/// (character offsets into its text): the text must be at least
/// `min_text_length` characters, the element type must be splittable, and
/// split points must be sorted, unique, and strictly within the text
/// bounds. Segments shorter than `min_segment_length` produce a warning
/// rather than an error.
pub fn validate_split(
    element: &ElementRecord,
    split_points: &[usize],
    min_text_length: usize,
    min_segment_length: usize,
) -> SplitPreconditions {
    let mut result = SplitPreconditions {
        is_valid: true,
        ..Default::default()
    };

    let text_len = element.text_len();
    if text_len < min_text_length {
        result
            .errors
            .push(format!("text is shorter than the minimum of {min_text_length} characters"));
        result.is_valid = false;
    }
    if !element.element_type.is_splittable() {
        result.errors.push("element type is not splittable".into());
        result.is_valid = false;
    }
    if split_points.is_empty() {
        result.errors.push("at least one split point is required".into());
        result.is_valid = false;
    }

    let mut sorted = split_points.to_vec();
    sorted.sort_unstable();
    if sorted != split_points {
        result.errors.push("split points must be sorted ascending".into());
        result.is_valid = false;
    }
    let mut dedup = sorted.clone();
    dedup.dedup();
    if dedup.len() != sorted.len() {
        result.errors.push("split points must be unique".into());
        result.is_valid = false;
    }
    if sorted.iter().any(|&p| p >= text_len) {
        result
            .errors
            .push("split points must be strictly within the text bounds".into());
        result.is_valid = false;
    }

    if !result.is_valid {
        return result;
    }

    let mut boundaries = vec![0];
    boundaries.extend(sorted.iter().copied());
    boundaries.push(text_len);
    for window in boundaries.windows(2) {
        if window[1] - window[0] < min_segment_length {
            result.warnings.push(format!(
                "segment [{}, {}) is shorter than the minimum of {min_segment_length} characters",
                window[0], window[1]
            ));
        }
    }

    result
}

/// A completed split, recording enough to reverse it.
#[derive(Debug, Clone)]
pub struct SplitResult {
    pub segments: Vec<ElementRecord>,
    pub original: ElementRecord,
}

/// Executes a split of `element` (already validated) at `split_points`.
///
/// Steps (§4.M): partition the text at the split points, discarding
/// whitespace-only segments; assign each surviving segment a fresh id
/// inheriting the source type; partition the bounding box into equal-width
/// vertical strips along the x axis; decay confidence by
/// [`SPLIT_CONFIDENCE_DECAY`] per segment; and inherit page, detection
/// method, and parent id from the source.
pub fn execute_split(element: &ElementRecord, split_points: &[usize]) -> SplitResult {
    let text = element.text.clone().unwrap_or_default();
    let byte_offsets = char_to_byte_offsets(&text);
    let char_len = byte_offsets.len() - 1;

    let mut boundaries = vec![0usize];
    boundaries.extend(split_points.iter().copied());
    boundaries.push(char_len);

    let raw_segments: Vec<&str> = boundaries
        .windows(2)
        .map(|w| &text[byte_offsets[w[0]]..byte_offsets[w[1]]])
        .collect();
    let kept: Vec<&str> = raw_segments
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .collect();

    let n = kept.len().max(1);
    let segments = kept
        .iter()
        .enumerate()
        .map(|(i, segment_text)| {
            let bounding_box = element.bounding_box.map(|bbox| split_bbox(&bbox, i, n));
            ElementRecord {
                element_id: format!("split-{}", Uuid::new_v4()),
                element_type: element.element_type,
                page_number: element.page_number,
                bounding_box,
                reading_order: element.reading_order,
                text: Some(segment_text.trim().to_string()),
                heading_level: element.heading_level,
                list_item_level: element.list_item_level,
                parent_id: element.parent_id.clone(),
                detection_method: element.detection_method,
                confidence: Confidence::new(element.confidence.value() * SPLIT_CONFIDENCE_DECAY),
            }
        })
        .collect();

    SplitResult {
        segments,
        original: element.clone(),
    }
}

/// Byte offset of each character in `text`, indexed by character position,
/// plus a final entry for `text.len()` — so a character offset `p` (as used
/// by split points throughout this module) slices safely via
/// `text[offsets[p]..]` even when `text` contains multi-byte characters.
fn char_to_byte_offsets(text: &str) -> Vec<usize> {
    let mut offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
    offsets.push(text.len());
    offsets
}

/// Converts a byte offset (as produced by `regex`'s match positions) to the
/// character offset at the same position in `text`.
fn byte_to_char_offset(text: &str, byte_offset: usize) -> usize {
    text[..byte_offset].chars().count()
}

/// Divides `bbox` into `n` equal-width vertical strips along the x axis
/// and returns the `i`th strip. This is an intentional simplification: a
/// true layout-aware split would follow the text flow, but an even
/// horizontal partition is a reasonable default when no finer-grained
/// layout information is available.
fn split_bbox(bbox: &BoundingBox, i: usize, n: usize) -> BoundingBox {
    let width = bbox.width() / n as f64;
    BoundingBox::new(
        bbox.x1 + width * i as f64,
        bbox.y1,
        bbox.x1 + width * (i as f64 + 1.0),
        bbox.y2,
    )
}

/// Reverses a split, restoring the original element.
pub fn rollback_split(result: &SplitResult) -> ElementRecord {
    result.original.clone()
}

/// Sentence-ending punctuation followed by whitespace then an uppercase
/// letter; the split point sits immediately after the punctuation (§4.M).
fn sentence_boundary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?](?=\s+[A-Z])").unwrap())
}

fn paragraph_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n").unwrap())
}

/// Finds the split point closest to `target_position` among sentence
/// boundaries and paragraph breaks in `text`, deduplicated and sorted.
/// Returns `None` if no natural boundary exists.
pub fn find_optimal_split_point(text: &str, target_position: usize) -> Option<usize> {
    let char_len = text.chars().count();
    let mut candidates: Vec<usize> = sentence_boundary_re()
        .find_iter(text)
        .map(|m| byte_to_char_offset(text, m.end()))
        .chain(
            paragraph_break_re()
                .find_iter(text)
                .map(|m| byte_to_char_offset(text, m.end())),
        )
        .filter(|&p| p > 0 && p < char_len)
        .collect();
    candidates.sort_unstable();
    candidates.dedup();

    candidates
        .into_iter()
        .min_by_key(|&p| (p as i64 - target_position as i64).abs())
}

/// Finds `target_segments - 1` split points for partitioning `text` into
/// roughly `target_segments` pieces (§4.M, §6 `find_optimal_split_points`).
///
/// Collects sentence-boundary and paragraph-break candidates, deduplicated
/// and sorted. If there are fewer candidates than needed, returns all of
/// them. Otherwise greedily picks, for each ideal position
/// `i * |text| / target_segments`, the nearest remaining candidate and
/// removes it from the pool — no back-tracking — then returns the chosen
/// points in ascending order.
pub fn find_optimal_split_points(text: &str, target_segments: usize) -> Vec<usize> {
    if target_segments <= 1 {
        return Vec::new();
    }

    let char_len = text.chars().count();
    let mut candidates: Vec<usize> = sentence_boundary_re()
        .find_iter(text)
        .map(|m| byte_to_char_offset(text, m.end()))
        .chain(
            paragraph_break_re()
                .find_iter(text)
                .map(|m| byte_to_char_offset(text, m.end())),
        )
        .filter(|&p| p > 0 && p < char_len)
        .collect();
    candidates.sort_unstable();
    candidates.dedup();

    let needed = target_segments - 1;
    if candidates.len() <= needed {
        return candidates;
    }

    let len = char_len as f64;
    let mut pool = candidates;
    let mut chosen = Vec::with_capacity(needed);
    for i in 1..target_segments {
        let ideal = i as f64 * len / target_segments as f64;
        let (idx, _) = pool
            .iter()
            .enumerate()
            .min_by(|(_, &a), (_, &b)| {
                let da = (a as f64 - ideal).abs();
                let db = (b as f64 - ideal).abs();
                da.partial_cmp(&db).unwrap()
            })
            .expect("pool is non-empty: needed <= pool.len()");
        chosen.push(pool.remove(idx));
    }
    chosen.sort_unstable();
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ElementType;

    fn element(text: &str) -> ElementRecord {
        let mut e = ElementRecord::new("e1", ElementType::Paragraph);
        e.text = Some(text.to_string());
        e.confidence = Confidence::new(0.9);
        e
    }

    #[test]
    fn short_text_fails_validation() {
        let e = element("hi");
        let result = validate_split(&e, &[1], 10, 5);
        assert!(!result.is_valid);
    }

    #[test]
    fn unsorted_split_points_are_rejected() {
        let e = element("hello world this is text");
        let result = validate_split(&e, &[10, 5], 10, 2);
        assert!(!result.is_valid);
    }

    #[test]
    fn short_segments_warn_but_validate() {
        let e = element("hello world this is text");
        let result = validate_split(&e, &[1], 10, 5);
        assert!(result.is_valid);
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn execute_split_produces_trimmed_segments() {
        let e = element("hello world, goodbye world");
        let result = execute_split(&e, &[12]);
        assert_eq!(result.segments.len(), 2);
        assert_eq!(result.segments[0].text.as_deref(), Some("hello world,"));
        assert_eq!(result.segments[1].text.as_deref(), Some("goodbye world"));
    }

    #[test]
    fn execute_split_decays_confidence() {
        let e = element("hello world, goodbye world");
        let result = execute_split(&e, &[12]);
        for segment in &result.segments {
            assert!((segment.confidence.value() - 0.9 * SPLIT_CONFIDENCE_DECAY).abs() < 1e-9);
        }
    }

    #[test]
    fn whitespace_only_segments_are_discarded() {
        let e = element("abc   def");
        let result = execute_split(&e, &[3, 6]);
        assert_eq!(result.segments.len(), 2);
    }

    #[test]
    fn rollback_restores_the_original_element() {
        let e = element("hello world, goodbye world");
        let result = execute_split(&e, &[12]);
        let restored = rollback_split(&result);
        assert_eq!(restored.element_id, "e1");
    }

    #[test]
    fn a_split_point_of_zero_is_in_range() {
        let e = element("hello world this is text");
        let result = validate_split(&e, &[0], 10, 2);
        assert!(result.is_valid);
    }

    #[test]
    fn split_indexes_by_character_not_byte_on_multibyte_text() {
        // "héllo wörld, göodbye wörld" has non-ASCII characters whose UTF-8
        // encoding is more than one byte each; a byte-offset split would
        // either panic (landing inside a multi-byte sequence) or slice in
        // the wrong place relative to what `text_len` reports.
        let text = "héllo wörld, göodbye wörld";
        let e = element(text);
        let char_len = text.chars().count();
        assert_eq!(e.text_len(), char_len);

        // Same character index used in the ASCII trimmed-segment test
        // above, now applied to text containing multi-byte characters.
        let result = execute_split(&e, &[13]);
        assert_eq!(result.segments.len(), 2);
        let rejoined: String = result
            .segments
            .iter()
            .map(|s| s.text.as_deref().unwrap_or(""))
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(rejoined, "héllo wörld, göodbye wörld");
    }

    #[test]
    fn optimal_split_point_prefers_the_nearest_sentence_boundary() {
        let text = "First sentence. Second sentence. Third sentence.";
        let point = find_optimal_split_point(text, 20).unwrap();
        // boundaries sit immediately after the period: 15 and 32; 20 is
        // nearer to 15.
        assert_eq!(point, 15);
    }

    #[test]
    fn optimal_split_point_returns_none_without_boundaries() {
        let text = "no boundaries here at all";
        assert!(find_optimal_split_point(text, 5).is_none());
    }

    #[test]
    fn optimal_split_points_picks_the_nearest_boundary_to_each_target() {
        // S6: a 100-char paragraph with sentence boundaries at 25, 50, 80
        // and target segment count 2 should pick [50], the boundary
        // nearest the ideal midpoint.
        let text = format!(
            "{}. {}. {}. {}",
            "A".repeat(24),
            "B".repeat(23),
            "C".repeat(28),
            "D".repeat(19)
        );
        assert_eq!(text.len(), 100);

        let points = find_optimal_split_points(&text, 2);
        assert_eq!(points, vec![50]);
    }

    #[test]
    fn optimal_split_points_returns_all_candidates_when_fewer_than_needed() {
        let text = "First sentence. Second sentence.";
        let points = find_optimal_split_points(text, 5);
        assert_eq!(points.len(), 1);
    }

    #[test]
    fn optimal_split_points_is_empty_for_a_single_target_segment() {
        let text = "First sentence. Second sentence.";
        assert!(find_optimal_split_points(text, 1).is_empty());
    }
}
