//! Polymorphic content extraction
//!
//! Each extractor turns one family of file formats into plain text plus
//! metadata. Extractors receive an [`ExtractionContext`] carrying the
//! capabilities they are allowed to use: retried, rate-limited API calls,
//! binary download, native export, and a settings snapshot. They never talk
//! to the network outside that context.

mod gdoc;
mod gsheet;
mod gslides;
mod office;
mod pdf;
mod registry;
mod text;

pub use gdoc::GoogleDocExtractor;
pub use gsheet::GoogleSheetExtractor;
pub use gslides::GoogleSlidesExtractor;
pub use office::{DocxExtractor, PptxExtractor, XlsxExtractor};
pub use pdf::PdfExtractor;
pub use registry::{ExtractorRegistry, FilterTerms};
pub use text::TextExtractor;

use crate::config::Config;
use crate::drive::{DriveClient, DriveFile};
use crate::error::Result;
use crate::retry::RetryExecutor;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// Result of extracting one file
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub text: String,
    /// Normalized type tag stored in the vector payload (e.g. "gdoc", "pdf")
    pub file_type: String,
    pub metadata: Map<String, Value>,
}

impl ExtractedContent {
    pub fn new(text: String, file_type: &str) -> Self {
        Self {
            text,
            file_type: file_type.to_string(),
            metadata: Map::new(),
        }
    }

    /// Empty result marking an oversized input that was never downloaded
    pub fn skipped_size_limit(file_type: &str, size_bytes: u64) -> Self {
        let mut metadata = Map::new();
        metadata.insert("skipped".to_string(), Value::from("size_limit"));
        metadata.insert("size_bytes".to_string(), Value::from(size_bytes));
        Self {
            text: String::new(),
            file_type: file_type.to_string(),
            metadata,
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Whether extraction produced no usable text
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Settings snapshot handed to extractors
#[derive(Debug, Clone)]
pub struct ExtractSettings {
    pub text_max_bytes: u64,
    pub pdf_max_bytes: u64,
    pub office_max_bytes: u64,
    pub pdf_max_pages: usize,
    pub excel_max_sheets: usize,
    pub max_rows_per_sheet: u32,
}

impl ExtractSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            text_max_bytes: config.formats.text_max_file_size_mb * 1024 * 1024,
            pdf_max_bytes: config.formats.pdf_max_file_size_mb * 1024 * 1024,
            office_max_bytes: config.formats.office_max_file_size_mb * 1024 * 1024,
            pdf_max_pages: config.formats.pdf_max_pages,
            excel_max_sheets: config.formats.excel_max_sheets,
            max_rows_per_sheet: config.drive.max_rows_per_sheet,
        }
    }
}

/// Capability set injected into every extract call
pub struct ExtractionContext {
    client: DriveClient,
    retry: RetryExecutor,
    cancel: CancellationToken,
    pub settings: ExtractSettings,
}

impl ExtractionContext {
    pub fn new(
        client: DriveClient,
        retry: RetryExecutor,
        cancel: CancellationToken,
        settings: ExtractSettings,
    ) -> Self {
        Self {
            client,
            retry,
            cancel,
            settings,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn get_document(&self, document_id: &str) -> Result<Value> {
        Ok(self
            .retry
            .execute(|| self.client.get_document(document_id))
            .await?)
    }

    pub async fn get_spreadsheet(&self, spreadsheet_id: &str) -> Result<Value> {
        Ok(self
            .retry
            .execute(|| self.client.get_spreadsheet(spreadsheet_id))
            .await?)
    }

    pub async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Value> {
        Ok(self
            .retry
            .execute(|| self.client.get_values(spreadsheet_id, range))
            .await?)
    }

    pub async fn get_presentation(&self, presentation_id: &str) -> Result<Value> {
        Ok(self
            .retry
            .execute(|| self.client.get_presentation(presentation_id))
            .await?)
    }

    pub async fn download_binary(&self, file_id: &str) -> Result<Vec<u8>> {
        Ok(self.retry.execute(|| self.client.download(file_id)).await?)
    }

    pub async fn export(&self, file_id: &str, mime_type: &str) -> Result<Vec<u8>> {
        Ok(self
            .retry
            .execute(|| self.client.export(file_id, mime_type))
            .await?)
    }
}

/// One format family's extraction capability
#[async_trait]
pub trait Extractor: Send + Sync {
    /// MIME types claimed exactly (used for the fast registry lookup and the
    /// server-side listing filter)
    fn mime_types(&self) -> &[&'static str];

    /// MIME prefixes claimed (e.g. "text/")
    fn mime_prefixes(&self) -> &[&'static str] {
        &[]
    }

    /// File extensions claimed, lowercase without the dot
    fn extensions(&self) -> &[&'static str] {
        &[]
    }

    /// Whether this extractor can handle the file
    fn can_extract(&self, file: &DriveFile) -> bool;

    /// Pure transform: file descriptor + context → extracted content.
    /// Oversized inputs short-circuit to a skip result without downloading.
    async fn extract(&self, file: &DriveFile, ctx: &ExtractionContext) -> Result<ExtractedContent>;
}
