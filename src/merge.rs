//! Merge operation (component L): combines multiple elements into one,
//! preserving the originals and producing a reversible result.

use uuid::Uuid;

use crate::schema::{BoundingBox, ElementRecord, ElementType};

/// Outcome of validating a proposed merge before executing it.
#[derive(Debug, Clone, Default)]
pub struct MergePreconditions {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Checks the preconditions for merging `elements` (§4.L): between 2 and
/// `max_elements` elements, unique ids, and every element of a mergeable
/// type. Mixed types, cross-page spans, missing coordinates, and elements
/// with no spatial relationship are allowed but produce warnings.
pub fn validate_merge(elements: &[ElementRecord], max_elements: usize) -> MergePreconditions {
    let mut result = MergePreconditions {
        is_valid: true,
        ..Default::default()
    };

    if elements.len() < 2 {
        result.errors.push("merge requires at least 2 elements".into());
        result.is_valid = false;
    }
    if elements.len() > max_elements {
        result
            .errors
            .push(format!("merge exceeds the maximum of {max_elements} elements"));
        result.is_valid = false;
    }

    let mut seen = std::collections::HashSet::new();
    for element in elements {
        if !seen.insert(&element.element_id) {
            result
                .errors
                .push(format!("duplicate element id '{}'", element.element_id));
            result.is_valid = false;
        }
        if !element.element_type.is_mergeable() {
            result.errors.push(format!(
                "element '{}' has a non-mergeable type",
                element.element_id
            ));
            result.is_valid = false;
        }
    }

    if !result.is_valid {
        return result;
    }

    let first_type = elements[0].element_type;
    if elements.iter().any(|e| e.element_type != first_type) {
        result.warnings.push("merging elements of mixed types".into());
    }

    let first_page = elements[0].page_number;
    if elements.iter().any(|e| e.page_number != first_page) {
        result.warnings.push("merging elements across pages".into());
    }

    if elements.iter().any(|e| e.bounding_box.is_none()) {
        result.warnings.push("some elements have no bounding box".into());
    } else {
        let boxes: Vec<BoundingBox> = elements.iter().filter_map(|e| e.bounding_box).collect();
        let related = boxes
            .windows(2)
            .all(|pair| pair[0].spatially_related(&pair[1], 5.0));
        if !related {
            result
                .warnings
                .push("elements do not share an obvious spatial relationship".into());
        }
    }

    result
}

/// A completed merge, recording enough to reverse it.
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub merged: ElementRecord,
    pub original_ids: Vec<String>,
    pub originals: Vec<ElementRecord>,
}

/// Separator between two adjacent pieces of text being merged (§4.L): a
/// single space if `previous` ends in sentence punctuation, no separator if
/// `next` opens with punctuation that already implies spacing, else a
/// single space.
fn text_separator(previous: &str, next: &str) -> &'static str {
    if previous.ends_with(['.', '!', '?', ':']) {
        " "
    } else if next.starts_with(['.', '!', '?', ',', ':', ';']) {
        ""
    } else {
        " "
    }
}

/// Concatenates non-empty, non-whitespace-only texts with the separator
/// chosen by [`text_separator`] for each adjacent pair.
fn merge_texts<'a>(texts: impl Iterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for text in texts.filter(|t| !t.trim().is_empty()) {
        if out.is_empty() {
            out.push_str(text);
        } else {
            out.push_str(text_separator(&out, text));
            out.push_str(text);
        }
    }
    out
}

/// Executes a merge of `elements` (already validated) into one new element.
///
/// Steps (§4.L): preserve the originals, generate a fresh id, concatenate
/// text with a punctuation-aware separator, pick the most frequent element
/// type, union the bounding boxes, average the confidences, and take the
/// page/method from the first element and the parent id only if every
/// element shares one.
pub fn execute_merge(elements: &[ElementRecord]) -> MergeResult {
    let merged_type = most_frequent_type(elements);
    let text = merge_texts(elements.iter().filter_map(|e| e.text.as_deref()));

    let bounding_box = elements
        .iter()
        .filter_map(|e| e.bounding_box)
        .reduce(|a, b| a.union(&b));

    let confidences: Vec<f64> = elements.iter().map(|e| e.confidence.value()).collect();
    let mean_confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };

    let first = &elements[0];
    let parent_id = if elements.iter().all(|e| e.parent_id == first.parent_id) {
        first.parent_id.clone()
    } else {
        None
    };
    // §4.L step 5: page number and detection method come from "the first
    // input that defines them", not unconditionally from elements[0].
    let page_number = elements.iter().find_map(|e| e.page_number);
    let detection_method = elements.iter().find_map(|e| e.detection_method);

    let merged = ElementRecord {
        element_id: format!("merged-{}", Uuid::new_v4()),
        element_type: merged_type,
        page_number,
        bounding_box,
        reading_order: first.reading_order,
        text: if text.is_empty() { None } else { Some(text) },
        heading_level: first.heading_level,
        list_item_level: first.list_item_level,
        parent_id,
        detection_method,
        confidence: crate::schema::Confidence::new(mean_confidence),
    };

    MergeResult {
        merged,
        original_ids: elements.iter().map(|e| e.element_id.clone()).collect(),
        originals: elements.to_vec(),
    }
}

fn most_frequent_type(elements: &[ElementRecord]) -> ElementType {
    let mut counts: std::collections::HashMap<ElementType, usize> = std::collections::HashMap::new();
    for e in elements {
        *counts.entry(e.element_type).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(kind, _)| kind)
        .unwrap_or(elements[0].element_type)
}

/// Reverses a merge, restoring the original elements and discarding the
/// merged one.
pub fn rollback_merge(result: &MergeResult) -> Vec<ElementRecord> {
    result.originals.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Confidence;

    fn element(id: &str, kind: ElementType, text: &str) -> ElementRecord {
        let mut e = ElementRecord::new(id, kind);
        e.text = Some(text.to_string());
        e.confidence = Confidence::new(0.9);
        e.page_number = Some(1);
        e
    }

    #[test]
    fn merge_requires_at_least_two_elements() {
        let elements = vec![element("a", ElementType::Paragraph, "hi")];
        let result = validate_merge(&elements, 50);
        assert!(!result.is_valid);
    }

    #[test]
    fn non_mergeable_type_is_rejected() {
        let elements = vec![
            element("a", ElementType::Image, "hi"),
            element("b", ElementType::Paragraph, "there"),
        ];
        let result = validate_merge(&elements, 50);
        assert!(!result.is_valid);
    }

    #[test]
    fn mixed_types_warn_but_validate() {
        let elements = vec![
            element("a", ElementType::Header, "hi"),
            element("b", ElementType::Paragraph, "there"),
        ];
        let result = validate_merge(&elements, 50);
        assert!(result.is_valid);
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn execute_merge_concatenates_text_with_a_space() {
        let elements = vec![
            element("a", ElementType::Paragraph, "hello"),
            element("b", ElementType::Paragraph, "world"),
        ];
        let result = execute_merge(&elements);
        assert_eq!(result.merged.text.as_deref(), Some("hello world"));
        assert_eq!(result.original_ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn execute_merge_uses_single_space_when_previous_ends_in_punctuation() {
        // S2: "Hello." ends in '.' => single space before "World".
        let elements = vec![
            element("a", ElementType::Paragraph, "Hello."),
            element("b", ElementType::Paragraph, "World"),
        ];
        let result = execute_merge(&elements);
        assert_eq!(result.merged.text.as_deref(), Some("Hello. World"));
    }

    #[test]
    fn execute_merge_uses_no_separator_when_next_opens_with_punctuation() {
        let elements = vec![
            element("a", ElementType::Paragraph, "cat"),
            element("b", ElementType::Paragraph, ", dog"),
        ];
        let result = execute_merge(&elements);
        assert_eq!(result.merged.text.as_deref(), Some("cat, dog"));
    }

    #[test]
    fn execute_merge_averages_confidence() {
        let mut a = element("a", ElementType::Paragraph, "x");
        a.confidence = Confidence::new(1.0);
        let mut b = element("b", ElementType::Paragraph, "y");
        b.confidence = Confidence::new(0.0);
        let result = execute_merge(&[a, b]);
        assert!((result.merged.confidence.value() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn rollback_restores_originals() {
        let elements = vec![
            element("a", ElementType::Paragraph, "hi"),
            element("b", ElementType::Paragraph, "there"),
        ];
        let result = execute_merge(&elements);
        let restored = rollback_merge(&result);
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0].element_id, "a");
    }

    #[test]
    fn parent_id_is_preserved_only_when_shared() {
        let mut a = element("a", ElementType::Paragraph, "x");
        a.parent_id = Some("p".into());
        let mut b = element("b", ElementType::Paragraph, "y");
        b.parent_id = Some("p".into());
        let result = execute_merge(&[a, b]);
        assert_eq!(result.merged.parent_id.as_deref(), Some("p"));

        let mut c = element("c", ElementType::Paragraph, "x");
        c.parent_id = Some("p1".into());
        let mut d = element("d", ElementType::Paragraph, "y");
        d.parent_id = Some("p2".into());
        let result2 = execute_merge(&[c, d]);
        assert!(result2.merged.parent_id.is_none());
    }

    #[test]
    fn page_number_and_detection_method_come_from_the_first_element_that_defines_them() {
        let mut a = element("a", ElementType::Paragraph, "x");
        a.page_number = None;
        a.detection_method = None;
        let mut b = element("b", ElementType::Paragraph, "y");
        b.page_number = Some(7);
        b.detection_method = Some(crate::schema::ExtractionMethod::Ocr);

        let result = execute_merge(&[a, b]);
        assert_eq!(result.merged.page_number, Some(7));
        assert_eq!(result.merged.detection_method, Some(crate::schema::ExtractionMethod::Ocr));
    }
}
