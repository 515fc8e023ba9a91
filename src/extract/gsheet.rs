//! Google Sheets extraction via the Sheets values API

use crate::drive::DriveFile;
use crate::error::Result;
use crate::extract::{ExtractedContent, ExtractionContext, Extractor};
use async_trait::async_trait;
use serde_json::Value;

const SHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

pub struct GoogleSheetExtractor;

fn sheet_titles(spreadsheet: &Value) -> Vec<String> {
    spreadsheet
        .get("sheets")
        .and_then(Value::as_array)
        .map(|sheets| {
            sheets
                .iter()
                .filter_map(|s| s.pointer("/properties/title").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Render one values.get response as tab-separated rows, dropping rows with
/// no non-empty cells
fn rows_text(values: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    let Some(rows) = values.get("values").and_then(Value::as_array) else {
        return lines;
    };
    for row in rows {
        let Some(cells) = row.as_array() else { continue };
        let cells: Vec<String> = cells
            .iter()
            .map(|c| match c {
                Value::String(s) => s.trim().to_string(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect();
        if cells.iter().all(String::is_empty) {
            continue;
        }
        lines.push(cells.join("\t"));
    }
    lines
}

#[async_trait]
impl Extractor for GoogleSheetExtractor {
    fn mime_types(&self) -> &[&'static str] {
        &[SHEET_MIME]
    }

    fn can_extract(&self, file: &DriveFile) -> bool {
        file.mime() == SHEET_MIME
    }

    async fn extract(&self, file: &DriveFile, ctx: &ExtractionContext) -> Result<ExtractedContent> {
        let spreadsheet = ctx.get_spreadsheet(&file.id).await?;
        let titles = sheet_titles(&spreadsheet);

        let mut sections = Vec::new();
        for title in &titles {
            // Single quotes in a sheet title are escaped by doubling.
            let quoted = title.replace('\'', "''");
            let range = format!("'{}'!A1:ZZ{}", quoted, ctx.settings.max_rows_per_sheet);
            let values = ctx.get_values(&file.id, &range).await?;
            let lines = rows_text(&values);
            if lines.is_empty() {
                continue;
            }
            sections.push(format!("=== SHEET: {} ===\n{}", title, lines.join("\n")));
        }

        let content = ExtractedContent::new(sections.join("\n\n"), "gsheet")
            .with_meta("sheet_count", titles.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sheet_titles_parsed() {
        let spreadsheet = json!({
            "sheets": [
                {"properties": {"title": "Budget"}},
                {"properties": {"title": "Q2"}},
                {"properties": {}},
            ]
        });
        assert_eq!(sheet_titles(&spreadsheet), vec!["Budget", "Q2"]);
    }

    #[test]
    fn test_rows_join_cells_with_tabs() {
        let values = json!({
            "values": [
                ["Name", "Amount"],
                ["Alice", 120, true],
                ["", "  ", ""],
                [],
            ]
        });
        assert_eq!(
            rows_text(&values),
            vec!["Name\tAmount".to_string(), "Alice\t120\ttrue".to_string()]
        );
    }

    #[test]
    fn test_missing_values_key_is_empty() {
        assert!(rows_text(&json!({})).is_empty());
    }
}
