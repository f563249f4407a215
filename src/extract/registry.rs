//! Extractor registry: named, lookup-by-method collection of extractors.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::schema::ExtractionMethod;

use super::Extractor;

/// A collection of registered extractors, keyed by unique name.
#[derive(Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn Extractor>>,
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("names", &self.extractors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an extractor. Errors if an extractor with the same name is
    /// already registered.
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) -> Result<()> {
        let name = extractor.name().to_string();
        if self.extractors.contains_key(&name) {
            return Err(EngineError::Validation(format!(
                "extractor '{name}' is already registered"
            )));
        }
        self.extractors.insert(name, extractor);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.extractors.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Extractor>> {
        self.extractors.get(name).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.extractors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every enabled extractor reporting the given method.
    pub fn by_method(&self, method: ExtractionMethod) -> Vec<Arc<dyn Extractor>> {
        self.extractors
            .values()
            .filter(|e| e.enabled() && e.method() == method)
            .cloned()
            .collect()
    }

    /// Every enabled extractor.
    pub fn enabled(&self) -> Vec<Arc<dyn Extractor>> {
        self.extractors.values().filter(|e| e.enabled()).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentView;
    use crate::extract::ExtractionContext;
    use crate::schema::MetadataSchema;
    use async_trait::async_trait;

    struct Noop(&'static str);

    #[async_trait]
    impl Extractor for Noop {
        fn name(&self) -> &str {
            self.0
        }

        fn method(&self) -> ExtractionMethod {
            ExtractionMethod::Heuristic
        }

        async fn extract(
            &self,
            _document: &dyn DocumentView,
            _context: &ExtractionContext,
        ) -> Result<MetadataSchema> {
            Ok(MetadataSchema::default())
        }
    }

    #[test]
    fn register_then_list_is_sorted() {
        let mut registry = ExtractorRegistry::new();
        registry.register(Arc::new(Noop("zeta"))).unwrap();
        registry.register(Arc::new(Noop("alpha"))).unwrap();
        assert_eq!(registry.list(), vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut registry = ExtractorRegistry::new();
        registry.register(Arc::new(Noop("dup"))).unwrap();
        assert!(registry.register(Arc::new(Noop("dup"))).is_err());
    }

    #[test]
    fn unregister_removes_the_extractor() {
        let mut registry = ExtractorRegistry::new();
        registry.register(Arc::new(Noop("x"))).unwrap();
        assert!(registry.unregister("x"));
        assert!(registry.get("x").is_none());
    }
}
