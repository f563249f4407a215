//! Document capability traits: the extraction and merge/split engines
//! operate against these traits rather than a concrete document type, so
//! callers can adapt whatever parsed-document representation they already
//! have.

use std::collections::HashMap;

/// A single page of a document, indexable by the engine.
pub trait PageView: Send + Sync {
    fn page_number(&self) -> u32;
    fn width(&self) -> Option<f64>;
    fn height(&self) -> Option<f64>;
    fn text(&self) -> Option<&str>;
}

/// A single structural element on a page (a paragraph, header, table cell…).
pub trait ElementView: Send + Sync {
    fn element_id(&self) -> &str;
    fn text(&self) -> Option<&str>;
}

/// Capability-oriented view over a parsed document. Every method is
/// optional in spirit — implementations that lack a capability return
/// `None`/empty rather than erroring, so an extractor can probe for what
/// it needs.
pub trait DocumentView: Send + Sync {
    fn document_id(&self) -> &str;

    fn page_count(&self) -> Option<u32> {
        None
    }

    fn page(&self, _number: u32) -> Option<&dyn PageView> {
        None
    }

    fn elements(&self) -> Vec<&dyn ElementView> {
        Vec::new()
    }

    fn metadata(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    fn file_size(&self) -> Option<u64> {
        None
    }

    fn file_format(&self) -> Option<&str> {
        None
    }

    fn source_path(&self) -> Option<&str> {
        None
    }

    fn is_encrypted(&self) -> bool {
        false
    }

    fn is_signed(&self) -> bool {
        false
    }
}

/// A simple in-memory document used by tests and examples.
#[derive(Debug, Clone)]
pub struct InMemoryPage {
    pub number: u32,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub text: Option<String>,
}

impl PageView for InMemoryPage {
    fn page_number(&self) -> u32 {
        self.number
    }

    fn width(&self) -> Option<f64> {
        self.width
    }

    fn height(&self) -> Option<f64> {
        self.height
    }

    fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryElement {
    pub id: String,
    pub text: Option<String>,
}

impl ElementView for InMemoryElement {
    fn element_id(&self) -> &str {
        &self.id
    }

    fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// A document held entirely in memory, useful for tests and small batch jobs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocument {
    pub id: String,
    pub pages: Vec<InMemoryPage>,
    pub elements: Vec<InMemoryElement>,
    pub metadata: HashMap<String, String>,
    pub file_size: Option<u64>,
    pub file_format: Option<String>,
    pub source_path: Option<String>,
    pub encrypted: bool,
    pub signed: bool,
}

impl DocumentView for InMemoryDocument {
    fn document_id(&self) -> &str {
        &self.id
    }

    fn page_count(&self) -> Option<u32> {
        Some(self.pages.len() as u32)
    }

    fn page(&self, number: u32) -> Option<&dyn PageView> {
        self.pages
            .iter()
            .find(|p| p.number == number)
            .map(|p| p as &dyn PageView)
    }

    fn elements(&self) -> Vec<&dyn ElementView> {
        self.elements.iter().map(|e| e as &dyn ElementView).collect()
    }

    fn metadata(&self) -> HashMap<String, String> {
        self.metadata.clone()
    }

    fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    fn file_format(&self) -> Option<&str> {
        self.file_format.as_deref()
    }

    fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    fn is_signed(&self) -> bool {
        self.signed
    }
}
