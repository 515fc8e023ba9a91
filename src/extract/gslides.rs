//! Google Slides extraction via the structured Slides API

use crate::drive::DriveFile;
use crate::error::Result;
use crate::extract::{ExtractedContent, ExtractionContext, Extractor};
use async_trait::async_trait;
use serde_json::Value;

const SLIDES_MIME: &str = "application/vnd.google-apps.presentation";

pub struct GoogleSlidesExtractor;

/// Join the trimmed text runs of a textElements array with single spaces
fn text_elements(value: Option<&Value>) -> String {
    let Some(elements) = value.and_then(Value::as_array) else {
        return String::new();
    };
    let parts: Vec<&str> = elements
        .iter()
        .filter_map(|e| e.pointer("/textRun/content").and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    parts.join(" ")
}

fn element_lines(element: &Value, lines: &mut Vec<String>) {
    let shape_text = text_elements(element.pointer("/shape/text/textElements"));
    if !shape_text.is_empty() {
        lines.push(shape_text);
    }

    if let Some(rows) = element.pointer("/table/tableRows").and_then(Value::as_array) {
        for row in rows {
            let cells: Vec<String> = row
                .get("tableCells")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[])
                .iter()
                .map(|cell| text_elements(cell.pointer("/text/textElements")))
                .filter(|s| !s.is_empty())
                .collect();
            if !cells.is_empty() {
                lines.push(cells.join(" | "));
            }
        }
    }

    if let Some(children) = element.pointer("/group/children").and_then(Value::as_array) {
        for child in children {
            element_lines(child, lines);
        }
    }
}

/// Render a presentations.get body as numbered slide sections
fn presentation_text(presentation: &Value) -> (String, usize) {
    let slides = presentation
        .get("slides")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let mut lines = Vec::new();
    for (index, slide) in slides.iter().enumerate() {
        lines.push(format!("=== SLIDE {} ===", index + 1));
        if let Some(elements) = slide.get("pageElements").and_then(Value::as_array) {
            for element in elements {
                element_lines(element, &mut lines);
            }
        }
        lines.push(String::new());
    }

    (lines.join("\n").trim().to_string(), slides.len())
}

#[async_trait]
impl Extractor for GoogleSlidesExtractor {
    fn mime_types(&self) -> &[&'static str] {
        &[SLIDES_MIME]
    }

    fn can_extract(&self, file: &DriveFile) -> bool {
        file.mime() == SLIDES_MIME
    }

    async fn extract(&self, file: &DriveFile, ctx: &ExtractionContext) -> Result<ExtractedContent> {
        let presentation = ctx.get_presentation(&file.id).await?;
        let (text, slide_count) = presentation_text(&presentation);
        Ok(ExtractedContent::new(text, "gslides").with_meta("slide_count", slide_count))
    }
}
