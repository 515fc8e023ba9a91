//! PDF extraction

use crate::drive::DriveFile;
use crate::error::{Error, Result};
use crate::extract::{ExtractedContent, ExtractionContext, Extractor};
use async_trait::async_trait;

const PDF_MIMES: &[&str] = &["application/pdf", "application/x-pdf"];

pub struct PdfExtractor;

/// Cap extracted text at `max_pages` pages, using the form feeds the text
/// extractor emits between pages. A capped result ends with a marker line.
fn cap_pages(text: &str, max_pages: usize) -> String {
    if max_pages == 0 {
        return text.trim().to_string();
    }
    let pages: Vec<&str> = text.split('\u{0c}').collect();
    if pages.len() <= max_pages {
        return text.trim().to_string();
    }
    let mut kept: Vec<String> = pages[..max_pages]
        .iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    kept.push(format!("... (limited to {} pages)", max_pages));
    kept.join("\n\n")
}

#[async_trait]
impl Extractor for PdfExtractor {
    fn mime_types(&self) -> &[&'static str] {
        PDF_MIMES
    }

    fn extensions(&self) -> &[&'static str] {
        &["pdf"]
    }

    fn can_extract(&self, file: &DriveFile) -> bool {
        PDF_MIMES.contains(&file.mime()) || file.extension().as_deref() == Some("pdf")
    }

    async fn extract(&self, file: &DriveFile, ctx: &ExtractionContext) -> Result<ExtractedContent> {
        if let Some(size) = file.size {
            if size > ctx.settings.pdf_max_bytes {
                return Ok(ExtractedContent::skipped_size_limit("pdf", size));
            }
        }

        let bytes = ctx.download_binary(&file.id).await?;
        let raw = pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| Error::Extract(format!("pdf parse failed: {}", e)))?;
        let text = cap_pages(&raw, ctx.settings.pdf_max_pages);

        let content =
            ExtractedContent::new(text, "pdf").with_meta("file_size_bytes", bytes.len());
        Ok(content)
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
    fn test_claims_pdf_mime_and_extension() {
        let extractor = PdfExtractor;
        assert!(extractor.can_extract(&file("application/pdf", "a.pdf")));
        assert!(extractor.can_extract(&file("application/x-pdf", "a")));
        assert!(extractor.can_extract(&file("application/octet-stream", "scan.PDF")));
        assert!(!extractor.can_extract(&file("text/plain", "a.txt")));
    }

    #[test]
    fn test_page_cap_truncates_with_marker() {
        let text = "one\u{0c}two\u{0c}three\u{0c}four";
        assert_eq!(
            cap_pages(text, 2),
            "one\n\ntwo\n\n... (limited to 2 pages)"
        );
    }

    #[test]
    fn test_page_cap_leaves_short_documents_alone() {
        assert_eq!(cap_pages("one\u{0c}two", 5), "one\u{0c}two");
        assert_eq!(cap_pages("whole text", 0), "whole text");
    }
}
