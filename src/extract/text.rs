//! Plain text and source code extraction

use crate::drive::DriveFile;
use crate::error::Result;
use crate::extract::{ExtractedContent, ExtractionContext, Extractor};
use async_trait::async_trait;
use serde_json::Value;

const EXTRA_MIME_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/javascript",
    "application/yaml",
    "application/x-yaml",
    "application/x-python-code",
];

const EXTENSIONS: &[&str] = &[
    "bash", "c", "cfg", "conf", "cpp", "cs", "css", "csv", "fish", "go", "h", "hpp", "htm", "html",
    "ini", "java", "js", "json", "jsx", "kt", "log", "markdown", "md", "php", "py", "pyi", "pyw",
    "rb", "rs", "rst", "sh", "sql", "swift", "toml", "ts", "tsx", "tsv", "txt", "xml", "yaml",
    "yml", "zsh",
];

/// Normalized type tag stored in the payload, keyed by extension
fn normalized_type(extension: Option<&str>) -> &'static str {
    match extension {
        Some("py" | "pyw" | "pyi") => "python",
        Some("js" | "jsx") => "javascript",
        Some("ts" | "tsx") => "typescript",
        Some("yaml" | "yml") => "yaml",
        Some("md" | "markdown") => "markdown",
        Some("json") => "json",
        Some("toml") => "toml",
        Some("sh" | "bash" | "zsh" | "fish") => "shell",
        Some("csv") => "csv",
        _ => "text",
    }
}

pub struct TextExtractor;

#[async_trait]
impl Extractor for TextExtractor {
    fn mime_types(&self) -> &[&'static str] {
        EXTRA_MIME_TYPES
    }

    fn mime_prefixes(&self) -> &[&'static str] {
        &["text/"]
    }

    fn extensions(&self) -> &[&'static str] {
        EXTENSIONS
    }

    fn can_extract(&self, file: &DriveFile) -> bool {
        let mime = file.mime();
        if mime.starts_with("text/") || EXTRA_MIME_TYPES.contains(&mime) {
            return true;
        }
        file.extension()
            .map(|ext| EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    async fn extract(&self, file: &DriveFile, ctx: &ExtractionContext) -> Result<ExtractedContent> {
        if let Some(size) = file.size {
            if size > ctx.settings.text_max_bytes {
                return Ok(ExtractedContent::skipped_size_limit("text", size));
            }
        }

        let bytes = ctx.download_binary(&file.id).await?;
        let text = String::from_utf8_lossy(&bytes).trim().to_string();
        let extension = file.extension();

        let content = ExtractedContent::new(text, normalized_type(extension.as_deref()))
            .with_meta("original_mime", file.mime())
            .with_meta(
                "extension",
                extension.map(Value::from).unwrap_or(Value::Null),
            )
            .with_meta("file_size_bytes", bytes.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(mime: &str, name: &str, size: Option<u64>) -> DriveFile {
        let mut value = serde_json::json!({
            "id": "f1",
            "name": name,
            "mimeType": mime,
        });
        if let Some(size) = size {
            value["size"] = serde_json::json!(size.to_string());
        }
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_claims_text_mimes_and_code_extensions() {
        let extractor = TextExtractor;
        assert!(extractor.can_extract(&file("text/plain", "a.txt", None)));
        assert!(extractor.can_extract(&file("text/x-rust", "main.rs", None)));
        assert!(extractor.can_extract(&file("application/json", "data", None)));
        assert!(extractor.can_extract(&file("application/octet-stream", "script.py", None)));
        assert!(!extractor.can_extract(&file("application/octet-stream", "img.png", None)));
        assert!(!extractor.can_extract(&file("application/pdf", "doc.pdf", None)));
    }

    #[test]
    fn test_type_normalization() {
        assert_eq!(normalized_type(Some("py")), "python");
        assert_eq!(normalized_type(Some("tsx")), "typescript");
        assert_eq!(normalized_type(Some("yml")), "yaml");
        assert_eq!(normalized_type(Some("zsh")), "shell");
        assert_eq!(normalized_type(Some("rs")), "text");
        assert_eq!(normalized_type(None), "text");
    }

    #[tokio::test]
    async fn test_oversized_file_skips_without_downloading() {
        use crate::config::{Config, DriveConfig};
        use crate::drive::DriveClient;
        use crate::extract::ExtractSettings;
        use crate::limiter::RateLimiter;
        use crate::retry::RetryExecutor;
        use tokio_util::sync::CancellationToken;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        // The mock server verifies on drop that no download was issued.
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/f1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.formats.text_max_file_size_mb = 1;
        let drive = DriveConfig {
            base_url: server.uri(),
            ..DriveConfig::default()
        };
        let cancel = CancellationToken::new();
        let retry = RetryExecutor::new(
            &config.retry,
            RateLimiter::new(100.0, 100.0),
            cancel.clone(),
        );
        let ctx = ExtractionContext::new(
            DriveClient::new(&drive).unwrap(),
            retry,
            cancel,
            ExtractSettings::from_config(&config),
        );

        let big = file("text/plain", "big.txt", Some(2 * 1024 * 1024));
        let content = TextExtractor.extract(&big, &ctx).await.unwrap();

        assert!(content.is_empty());
        assert_eq!(content.metadata["skipped"], Value::from("size_limit"));
        assert_eq!(
            content.metadata["size_bytes"],
            Value::from(2u64 * 1024 * 1024)
        );
    }
}
