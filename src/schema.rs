//! Metadata schema & validation (component K): typed document, page,
//! element, and relationship records, plus the invariants the extraction
//! engine and the merge/split operations both lean on.
//!
//! The schema is a flat tree keyed by ids — not mutual owning references —
//! per the design note on cyclic back-references: pages and elements point
//! at their document by id, never by handle.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A confidence value in `[0, 1]`, with a derived named band.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Confidence(pub f64);

impl Confidence {
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// very_low < 0.5, low < 0.7, medium < 0.85, high < 0.95, else very_high.
    pub fn level(&self) -> ConfidenceLevel {
        match self.0 {
            v if v < 0.5 => ConfidenceLevel::VeryLow,
            v if v < 0.7 => ConfidenceLevel::Low,
            v if v < 0.85 => ConfidenceLevel::Medium,
            v if v < 0.95 => ConfidenceLevel::High,
            _ => ConfidenceLevel::VeryHigh,
        }
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Confidence(0.0)
    }
}

/// Named confidence band derived from a numeric confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

/// A four-number rectangle `[x1, y1, x2, y2]` with `x1 < x2` and `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn is_well_formed(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Per-axis min/max union of two boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// True if the two boxes intersect, one contains the other, or they are
    /// adjacent (touching edges within `tolerance`).
    pub fn spatially_related(&self, other: &BoundingBox, tolerance: f64) -> bool {
        let intersects = self.x1 < other.x2 + tolerance
            && other.x1 < self.x2 + tolerance
            && self.y1 < other.y2 + tolerance
            && other.y1 < self.y2 + tolerance;
        intersects
    }
}

/// Element type. Used both for schema validation and to check
/// merge/split eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Text,
    Title,
    NarrativeText,
    Paragraph,
    Header,
    Footer,
    ListItem,
    TableCell,
    Caption,
    Footnote,
    Image,
    Table,
    Other,
}

impl ElementType {
    /// Types whose concatenation is semantically meaningful (§ glossary,
    /// "mergeable element types").
    pub fn is_mergeable(&self) -> bool {
        matches!(
            self,
            ElementType::Text
                | ElementType::Title
                | ElementType::NarrativeText
                | ElementType::Paragraph
                | ElementType::Header
                | ElementType::Footer
                | ElementType::ListItem
                | ElementType::TableCell
                | ElementType::Caption
                | ElementType::Footnote
        )
    }

    /// Types whose text partitioning is semantically meaningful (§
    /// glossary, "splittable element types").
    pub fn is_splittable(&self) -> bool {
        matches!(
            self,
            ElementType::Text
                | ElementType::NarrativeText
                | ElementType::Paragraph
                | ElementType::ListItem
                | ElementType::TableCell
        )
    }
}

/// Extraction method used to produce a record; feeds the confidence scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    DirectParse,
    Ocr,
    Heuristic,
    Ml,
    RuleBased,
    Hybrid,
}

/// Document-level record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub keywords: Vec<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub modification_date: Option<DateTime<Utc>>,
    pub metadata_date: Option<DateTime<Utc>>,
    pub language: Option<String>,
    pub language_confidence: Option<f64>,
    pub encoding: Option<String>,
    pub encoding_confidence: Option<f64>,
    pub page_count: u32,
    pub total_elements: u32,
    pub size_bytes: Option<u64>,
    pub format: Option<String>,
    pub encrypted: bool,
    pub signed: bool,
    pub permissions: HashMap<String, bool>,
    pub confidence: Confidence,
}

/// Page-level record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub document_id: String,
    pub page_number: u32,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub rotation: f64,
    pub element_counts: HashMap<String, u32>,
    pub element_count: u32,
    pub word_count: u32,
    pub char_count: u32,
    pub paragraph_count: u32,
    pub column_count: u32,
    pub has_header: bool,
    pub has_footer: bool,
    pub has_margins: bool,
    pub confidence: Confidence,
}

impl PageRecord {
    pub fn new(document_id: impl Into<String>, page_number: u32) -> Self {
        Self {
            document_id: document_id.into(),
            page_number,
            width: None,
            height: None,
            rotation: 0.0,
            element_counts: HashMap::new(),
            element_count: 0,
            word_count: 0,
            char_count: 0,
            paragraph_count: 0,
            column_count: 1,
            has_header: false,
            has_footer: false,
            has_margins: false,
            confidence: Confidence::default(),
        }
    }

    pub fn aspect_ratio(&self) -> Option<f64> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if h != 0.0 => Some(w / h),
            _ => None,
        }
    }
}

/// Element-level record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementRecord {
    pub element_id: String,
    pub element_type: ElementType,
    pub page_number: Option<u32>,
    pub bounding_box: Option<BoundingBox>,
    pub reading_order: Option<u32>,
    pub text: Option<String>,
    pub heading_level: Option<u8>,
    pub list_item_level: Option<u32>,
    pub parent_id: Option<String>,
    pub detection_method: Option<ExtractionMethod>,
    pub confidence: Confidence,
}

impl ElementRecord {
    pub fn new(element_id: impl Into<String>, element_type: ElementType) -> Self {
        Self {
            element_id: element_id.into(),
            element_type,
            page_number: None,
            bounding_box: None,
            reading_order: None,
            text: None,
            heading_level: None,
            list_item_level: None,
            parent_id: None,
            detection_method: None,
            confidence: Confidence::default(),
        }
    }

    /// Length of `text` in characters (not bytes), matching the split
    /// operation's character-offset split points.
    pub fn text_len(&self) -> usize {
        self.text.as_deref().map(|t| t.chars().count()).unwrap_or(0)
    }
}

/// Relationship between two elements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: String,
    pub strength: f64,
    pub direction: RelationshipDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipDirection {
    Forward,
    Backward,
    Bidirectional,
}

/// A fully assembled metadata schema for one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataSchema {
    pub document: Option<DocumentRecord>,
    pub pages: Vec<PageRecord>,
    pub elements: Vec<ElementRecord>,
    pub relationships: Vec<RelationshipRecord>,
    pub aggregate_confidence: f64,
}

impl MetadataSchema {
    /// Reconciles `document.page_count` / `total_elements` against the
    /// actual record counts when both sides are populated (§3 cross-invariants).
    pub fn reconcile_counts(&mut self) {
        if let Some(doc) = self.document.as_mut() {
            if !self.pages.is_empty() {
                doc.page_count = self.pages.len() as u32;
            }
            if !self.elements.is_empty() {
                doc.total_elements = self.elements.len() as u32;
            }
        }
    }

    pub fn element_by_id(&self, id: &str) -> Option<&ElementRecord> {
        self.elements.iter().find(|e| e.element_id == id)
    }

    pub fn page_by_number(&self, n: u32) -> Option<&PageRecord> {
        self.pages.iter().find(|p| p.page_number == n)
    }
}

/// The outcome of validating one record against the schema invariants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub confidence: f64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn ok(confidence: f64) -> Self {
        Self {
            is_valid: true,
            confidence,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Adds an error. Because this recomputes `is_valid` on every call
    /// rather than only at construction, validators that add issues
    /// incrementally bucket them correctly (design note, open question 3:
    /// "the spec requires correct bucketing on every add").
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
        self.is_valid = false;
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.is_valid = self.is_valid && other.is_valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Validates a document record. Violations are errors unless noted as warnings.
pub fn validate_document(doc: &DocumentRecord) -> ValidationResult {
    let mut result = ValidationResult::ok(1.0);
    if doc.page_count == 0 {
        result.add_warning("document has zero pages");
    }
    if let (Some(created), Some(modified)) = (doc.creation_date, doc.modification_date) {
        if modified < created {
            result.add_warning("modification_date precedes creation_date");
        }
    }
    result
}

/// Validates a page record.
pub fn validate_page(page: &PageRecord) -> ValidationResult {
    let mut result = ValidationResult::ok(1.0);
    if page.page_number < 1 {
        result.add_error("page_number must be >= 1");
    }
    if page.document_id.is_empty() {
        result.add_error("document_id is required");
    }
    if let Some(w) = page.width {
        if w <= 0.0 {
            result.add_error("width must be > 0");
        }
    }
    if let Some(h) = page.height {
        if h <= 0.0 {
            result.add_error("height must be > 0");
        }
    }
    if !(0.0..360.0).contains(&page.rotation) {
        result.add_error("rotation must be in [0, 360)");
    }
    if let Some(ratio) = page.aspect_ratio() {
        if !(0.1..=10.0).contains(&ratio) {
            result.add_warning("aspect ratio outside [0.1, 10]");
        }
    }
    let typed_total: u32 = page.element_counts.values().sum();
    if typed_total > page.element_count {
        result.add_warning("typed element counts exceed element_count");
    }
    if page.word_count > 0 {
        let avg_chars_per_word = page.char_count as f64 / page.word_count as f64;
        if !(1.0..=50.0).contains(&avg_chars_per_word) {
            result.add_warning("average characters per word outside [1, 50]");
        }
    }
    result
}

/// Validates an element record.
pub fn validate_element(element: &ElementRecord) -> ValidationResult {
    let mut result = ValidationResult::ok(1.0);
    if let Some(bbox) = &element.bounding_box {
        if !bbox.is_well_formed() {
            result.add_error("bounding_box must have x1<x2 and y1<y2");
        }
    }
    if let Some(level) = element.heading_level {
        if !(1..=6).contains(&level) {
            result.add_error("heading_level must be in [1, 6]");
        }
    }
    if let Some(level) = element.list_item_level {
        if level > i32::MAX as u32 {
            result.add_error("list_item_level out of range");
        }
    }
    result
}

/// Validates a relationship record.
pub fn validate_relationship(rel: &RelationshipRecord) -> ValidationResult {
    let mut result = ValidationResult::ok(1.0);
    if !(0.0..=1.0).contains(&rel.strength) {
        result.add_error("strength must be in [0, 1]");
    }
    if rel.source_id.is_empty() || rel.target_id.is_empty() {
        result.add_error("source and target element ids are required");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_level_bands() {
        assert!(matches!(Confidence::new(0.1).level(), ConfidenceLevel::VeryLow));
        assert!(matches!(Confidence::new(0.6).level(), ConfidenceLevel::Low));
        assert!(matches!(Confidence::new(0.8).level(), ConfidenceLevel::Medium));
        assert!(matches!(Confidence::new(0.9).level(), ConfidenceLevel::High));
        assert!(matches!(Confidence::new(0.99).level(), ConfidenceLevel::VeryHigh));
    }

    #[test]
    fn bounding_box_union_is_per_axis_min_max() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 0.0, 30.0, 10.0);
        let u = a.union(&b);
        assert_eq!((u.x1, u.y1, u.x2, u.y2), (0.0, 0.0, 30.0, 10.0));
    }

    #[test]
    fn page_number_zero_is_an_error() {
        let page = PageRecord::new("doc1", 0);
        let result = validate_page(&page);
        assert!(!result.is_valid);
    }

    #[test]
    fn page_with_zero_pages_document_only_warns() {
        let doc = DocumentRecord::default();
        let result = validate_document(&doc);
        assert!(result.is_valid);
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn validation_result_bucketing_is_correct_on_every_add() {
        let mut result = ValidationResult::ok(1.0);
        result.add_warning("just a warning");
        assert!(result.is_valid);
        result.add_error("now invalid");
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn element_type_mergeable_and_splittable_sets_differ() {
        assert!(ElementType::Header.is_mergeable());
        assert!(!ElementType::Header.is_splittable());
        assert!(ElementType::Paragraph.is_mergeable());
        assert!(ElementType::Paragraph.is_splittable());
    }

    #[test]
    fn reconcile_counts_assigns_from_records() {
        let mut schema = MetadataSchema {
            document: Some(DocumentRecord::default()),
            ..Default::default()
        };
        schema.pages.push(PageRecord::new("doc1", 1));
        schema.elements.push(ElementRecord::new("e1", ElementType::Text));
        schema.reconcile_counts();
        let doc = schema.document.unwrap();
        assert_eq!(doc.page_count, 1);
        assert_eq!(doc.total_elements, 1);
    }
}
