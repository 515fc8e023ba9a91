//! Extractor lookup and listing filter derivation

use crate::config::FormatConfig;
use crate::drive::DriveFile;
use crate::extract::{
    DocxExtractor, Extractor, GoogleDocExtractor, GoogleSheetExtractor, GoogleSlidesExtractor,
    PdfExtractor, PptxExtractor, TextExtractor, XlsxExtractor,
};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Terms describing every file the registered extractors can handle.
///
/// The crawler uses these twice: once to build the server-side listing query
/// and once to re-filter results locally, since `mimeType contains` matches
/// more broadly than a prefix test.
#[derive(Debug, Clone, Default)]
pub struct FilterTerms {
    pub mime_types: Vec<String>,
    pub mime_prefixes: Vec<String>,
    pub extensions: Vec<String>,
}

impl FilterTerms {
    pub fn is_empty(&self) -> bool {
        self.mime_types.is_empty() && self.mime_prefixes.is_empty() && self.extensions.is_empty()
    }

    /// Whether a listed file matches any registered term
    pub fn matches(&self, file: &DriveFile) -> bool {
        let mime = file.mime();
        if self.mime_types.iter().any(|m| m == mime) {
            return true;
        }
        if self.mime_prefixes.iter().any(|p| mime.starts_with(p.as_str())) {
            return true;
        }
        if let Some(ext) = file.extension() {
            if self.extensions.iter().any(|e| *e == ext) {
                return true;
            }
        }
        false
    }

    /// Drive `q` clause matching these terms, or None when nothing is enabled
    pub fn to_query(&self) -> Option<String> {
        let mut clauses = Vec::new();
        for mime in &self.mime_types {
            clauses.push(format!("mimeType='{}'", mime));
        }
        for prefix in &self.mime_prefixes {
            clauses.push(format!("mimeType contains '{}'", prefix));
        }
        for ext in &self.extensions {
            clauses.push(format!("fileExtension='{}'", ext));
        }
        if clauses.is_empty() {
            None
        } else {
            Some(format!("({})", clauses.join(" or ")))
        }
    }
}

/// Registry dispatching files to extractors
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
    by_mime: HashMap<&'static str, usize>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
            by_mime: HashMap::new(),
        }
    }

    /// Build the registry from the format toggles
    pub fn from_config(formats: &FormatConfig) -> Self {
        let mut registry = Self::new();
        if formats.gdocs_enabled {
            registry.register(Box::new(GoogleDocExtractor));
        }
        if formats.gsheets_enabled {
            registry.register(Box::new(GoogleSheetExtractor));
        }
        if formats.gslides_enabled {
            registry.register(Box::new(GoogleSlidesExtractor));
        }
        if formats.text_enabled {
            registry.register(Box::new(TextExtractor));
        }
        if formats.pdf_enabled {
            registry.register(Box::new(PdfExtractor));
        }
        if formats.office_enabled {
            registry.register(Box::new(DocxExtractor));
            registry.register(Box::new(XlsxExtractor));
            registry.register(Box::new(PptxExtractor));
        }
        debug!(extractors = registry.extractors.len(), "extractor registry built");
        registry
    }

    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        let index = self.extractors.len();
        for mime in extractor.mime_types() {
            // First registration wins for a contested MIME type.
            self.by_mime.entry(mime).or_insert(index);
        }
        self.extractors.push(extractor);
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// Find the extractor for a file: exact MIME lookup first, then the
    /// slower `can_extract` scan for prefix and extension matches
    pub fn resolve(&self, file: &DriveFile) -> Option<&dyn Extractor> {
        if let Some(&index) = self.by_mime.get(file.mime()) {
            return Some(self.extractors[index].as_ref());
        }
        self.extractors
            .iter()
            .find(|e| e.can_extract(file))
            .map(|e| e.as_ref())
    }

    /// Union of all registered claim terms, sorted and deduplicated
    pub fn filter_terms(&self) -> FilterTerms {
        let mut mime_types = BTreeSet::new();
        let mut mime_prefixes = BTreeSet::new();
        let mut extensions = BTreeSet::new();
        for extractor in &self.extractors {
            for mime in extractor.mime_types() {
                mime_types.insert(mime.to_string());
            }
            for prefix in extractor.mime_prefixes() {
                mime_prefixes.insert(prefix.to_string());
            }
            for ext in extractor.extensions() {
                extensions.insert(ext.to_string());
            }
        }
        FilterTerms {
            mime_types: mime_types.into_iter().collect(),
            mime_prefixes: mime_prefixes.into_iter().collect(),
            extensions: extensions.into_iter().collect(),
        }
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(mime: &str, name: &str) -> DriveFile {
        serde_json::from_value(serde_json::json!({
            "id": "f1",
            "name": name,
            "mimeType": mime,
        }))
        .unwrap()
    }

    #[test]
    fn test_resolve_by_exact_mime() {
        let registry = ExtractorRegistry::from_config(&FormatConfig::default());
        let doc = file("application/vnd.google-apps.document", "notes");
        assert!(registry.resolve(&doc).is_some());
    }

    #[test]
    fn test_resolve_by_prefix_and_extension() {
        let registry = ExtractorRegistry::from_config(&FormatConfig::default());
        assert!(registry.resolve(&file("text/x-rust", "main.rs")).is_some());
        // Unknown MIME but a claimed extension.
        assert!(registry
            .resolve(&file("application/octet-stream", "notes.md"))
            .is_some());
        assert!(registry
            .resolve(&file("application/octet-stream", "blob.bin"))
            .is_none());
    }

    #[test]
    fn test_disabled_formats_are_not_registered() {
        let mut formats = FormatConfig::default();
        formats.pdf_enabled = false;
        let registry = ExtractorRegistry::from_config(&formats);
        assert!(registry.resolve(&file("application/pdf", "a.pdf")).is_none());
    }

    #[test]
    fn test_filter_terms_cover_registered_claims() {
        let registry = ExtractorRegistry::from_config(&FormatConfig::default());
        let terms = registry.filter_terms();
        assert!(terms
            .mime_types
            .iter()
            .any(|m| m == "application/vnd.google-apps.spreadsheet"));
        assert!(terms.mime_prefixes.iter().any(|p| p == "text/"));
        assert!(terms.extensions.iter().any(|e| e == "md"));

        let q = terms.to_query().unwrap();
        assert!(q.starts_with('('));
        assert!(q.contains("mimeType='application/pdf'"));
        assert!(q.contains("mimeType contains 'text/'"));
        assert!(q.contains("fileExtension='md'"));
    }

    #[test]
    fn test_empty_registry_yields_no_query() {
        let registry = ExtractorRegistry::new();
        assert!(registry.filter_terms().to_query().is_none());
    }
}
