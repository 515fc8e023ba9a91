//! Google Docs extraction via the structured Docs API

use crate::drive::DriveFile;
use crate::error::Result;
use crate::extract::{ExtractedContent, ExtractionContext, Extractor};
use async_trait::async_trait;
use serde_json::Value;

const DOC_MIME: &str = "application/vnd.google-apps.document";

pub struct GoogleDocExtractor;

/// Flatten a documents.get body into plain text.
///
/// Walks top-level structural elements, collecting paragraph text runs.
/// Vertical tabs (soft line breaks in the Docs model) become newlines.
fn document_text(document: &Value) -> String {
    let mut out = String::new();
    let elements = document
        .pointer("/body/content")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    for element in elements {
        let Some(runs) = element
            .pointer("/paragraph/elements")
            .and_then(Value::as_array)
        else {
            continue;
        };
        for run in runs {
            if let Some(content) = run.pointer("/textRun/content").and_then(Value::as_str) {
                out.push_str(content);
            }
        }
    }

    out.replace('\u{000b}', "\n").trim().to_string()
}

#[async_trait]
impl Extractor for GoogleDocExtractor {
    fn mime_types(&self) -> &[&'static str] {
        &[DOC_MIME]
    }

    fn can_extract(&self, file: &DriveFile) -> bool {
        file.mime() == DOC_MIME
    }

    async fn extract(&self, file: &DriveFile, ctx: &ExtractionContext) -> Result<ExtractedContent> {
        let document = ctx.get_document(&file.id).await?;
        Ok(ExtractedContent::new(document_text(&document), "gdoc"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_joins_text_runs_across_paragraphs() {
        let document = json!({
            "body": {
                "content": [
                    {"sectionBreak": {}},
                    {"paragraph": {"elements": [
                        {"textRun": {"content": "Hello "}},
                        {"textRun": {"content": "world\n"}},
                    ]}},
                    {"paragraph": {"elements": [
                        {"textRun": {"content": "Second paragraph\n"}},
                        {"inlineObjectElement": {}},
                    ]}},
                ]
            }
        });
        assert_eq!(
            document_text(&document),
            "Hello world\nSecond paragraph"
        );
    }

    #[test]
    fn test_vertical_tab_becomes_newline() {
        let document = json!({
            "body": {"content": [
                {"paragraph": {"elements": [
                    {"textRun": {"content": "line one\u{000b}line two\n"}},
                ]}},
            ]}
        });
        assert_eq!(document_text(&document), "line one\nline two");
    }

    #[test]
    fn test_empty_body_yields_empty_text() {
        assert_eq!(document_text(&json!({})), "");
        assert_eq!(document_text(&json!({"body": {"content": []}})), "");
    }
}
