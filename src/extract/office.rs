//! OOXML extraction (docx, xlsx, pptx)
//!
//! OOXML containers are ZIP archives of XML parts. The parsers here stream
//! events with quick-xml instead of building DOM trees, and every ZIP entry
//! read is size-bounded as zip-bomb protection.

use crate::drive::DriveFile;
use crate::error::{Error, Result};
use crate::extract::{ExtractedContent, ExtractionContext, Extractor};
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Read;

const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const PPTX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

// Decompressed ceiling for a single XML part.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| Error::Extract(format!("not a valid OOXML container: {}", e)))
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .map_err(|e| Error::Extract(format!("missing part {}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| Error::Extract(format!("reading {}: {}", name, e)))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(Error::Extract(format!("part {} exceeds size limit", name)));
    }
    Ok(out)
}

/// Numbered parts under a prefix (slide1.xml, slide2.xml, ...), in order
fn numbered_parts(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Collect one text line per paragraph element, joining the text runs inside
/// it. Works for both wordprocessingml (w:p/w:t) and drawingml (a:p/a:t)
/// since only local names are examined.
fn paragraph_lines(xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut lines = Vec::new();
    let mut current = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                if let Ok(Event::Text(text)) = reader.read_event_into(&mut buf) {
                    current.push_str(text.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"p" => {
                let line = current.trim();
                if !line.is_empty() {
                    lines.push(line.to_string());
                }
                current.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Extract(format!("malformed XML: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    // Text outside any closed paragraph still counts.
    let rest = current.trim();
    if !rest.is_empty() {
        lines.push(rest.to_string());
    }
    Ok(lines)
}

fn docx_text(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    Ok(paragraph_lines(&xml)?.join("\n"))
}

fn pptx_text(bytes: &[u8]) -> Result<(String, usize)> {
    let mut archive = open_archive(bytes)?;
    let slides = numbered_parts(&archive, "ppt/slides/slide");
    let count = slides.len();

    let mut lines = Vec::new();
    for (index, name) in slides.iter().enumerate() {
        let xml = read_entry(&mut archive, name)?;
        lines.push(format!("=== SLIDE {} ===", index + 1));
        lines.extend(paragraph_lines(&xml)?);
        lines.push(String::new());
    }
    Ok((lines.join("\n").trim().to_string(), count))
}

/// Sheet display names from xl/workbook.xml, in workbook order
fn sheet_names(archive: &mut Archive<'_>) -> Result<Vec<String>> {
    let xml = read_entry(archive, "xl/workbook.xml")?;
    let mut reader = Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut names = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"name" {
                        names.push(String::from_utf8_lossy(&attr.value).into_owned());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Extract(format!("malformed workbook.xml: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    Ok(names)
}

fn shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>> {
    if archive.by_name("xl/sharedStrings.xml").is_err() {
        return Ok(Vec::new());
    }
    let xml = read_entry(archive, "xl/sharedStrings.xml")?;
    let mut reader = Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut in_si = false;
    let mut current = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"t" if in_si => {
                    if let Ok(Event::Text(text)) = reader.read_event_into(&mut buf) {
                        current.push_str(text.unescape().unwrap_or_default().as_ref());
                    }
                }
                _ => {}
            },
            Ok(Event::End(e)) if e.local_name().as_ref() == b"si" => {
                strings.push(std::mem::take(&mut current));
                in_si = false;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Extract(format!("malformed sharedStrings.xml: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Render one worksheet as tab-separated rows, resolving shared string cells.
/// Stops after `max_rows` rows and appends a truncation marker.
fn sheet_rows(xml: &[u8], strings: &[String], max_rows: u32) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut lines = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut row_count: u32 = 0;
    let mut truncated = false;
    let mut shared_cell = false;
    let mut in_value = false;
    let mut in_inline = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    shared_cell = e.attributes().flatten().any(|a| {
                        a.key.as_ref() == b"t" && a.value.as_ref() == b"s"
                    });
                }
                b"v" => in_value = true,
                b"is" => in_inline = true,
                b"t" if in_inline => {
                    if let Ok(Event::Text(text)) = reader.read_event_into(&mut buf) {
                        let cell = text.unescape().unwrap_or_default().trim().to_string();
                        if !cell.is_empty() {
                            row.push(cell);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Text(text)) if in_value => {
                let raw = text.unescape().unwrap_or_default();
                let raw = raw.trim();
                if !raw.is_empty() {
                    let cell = if shared_cell {
                        raw.parse::<usize>()
                            .ok()
                            .and_then(|i| strings.get(i))
                            .map(|s| s.trim().to_string())
                            .unwrap_or_default()
                    } else {
                        raw.to_string()
                    };
                    if !cell.is_empty() {
                        row.push(cell);
                    }
                }
                in_value = false;
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_value = false,
                b"is" => in_inline = false,
                b"c" => shared_cell = false,
                b"row" => {
                    if !row.is_empty() {
                        lines.push(row.join("\t"));
                    }
                    row.clear();
                    row_count += 1;
                    if max_rows > 0 && row_count >= max_rows {
                        truncated = true;
                        break;
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Extract(format!("malformed worksheet: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    if truncated {
        lines.push(format!("... (limited to {} rows)", max_rows));
    }
    Ok(lines)
}

fn xlsx_text(bytes: &[u8], max_sheets: usize, max_rows: u32) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let strings = shared_strings(&mut archive)?;
    let titles = sheet_names(&mut archive).unwrap_or_default();
    let parts = numbered_parts(&archive, "xl/worksheets/sheet");

    let mut lines = Vec::new();
    for (index, part) in parts.iter().enumerate() {
        if max_sheets > 0 && index >= max_sheets {
            lines.push(format!("... (limited to {} sheets)", max_sheets));
            break;
        }
        let title = titles
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("Sheet{}", index + 1));
        let xml = read_entry(&mut archive, part)?;
        lines.push(format!("=== SHEET: {} ===", title));
        lines.extend(sheet_rows(&xml, &strings, max_rows)?);
        lines.push(String::new());
    }
    Ok(lines.join("\n").trim().to_string())
}

macro_rules! size_gate {
    ($file:expr, $ctx:expr, $tag:expr) => {
        if let Some(size) = $file.size {
            if size > $ctx.settings.office_max_bytes {
                return Ok(ExtractedContent::skipped_size_limit($tag, size));
            }
        }
    };
}

pub struct DocxExtractor;

#[async_trait]
impl Extractor for DocxExtractor {
    fn mime_types(&self) -> &[&'static str] {
        &[DOCX_MIME]
    }

    fn extensions(&self) -> &[&'static str] {
        &["docx"]
    }

    fn can_extract(&self, file: &DriveFile) -> bool {
        file.mime() == DOCX_MIME || file.extension().as_deref() == Some("docx")
    }

    async fn extract(&self, file: &DriveFile, ctx: &ExtractionContext) -> Result<ExtractedContent> {
        size_gate!(file, ctx, "docx");
        let bytes = ctx.download_binary(&file.id).await?;
        let content = ExtractedContent::new(docx_text(&bytes)?, "docx")
            .with_meta("mime_type", file.mime())
            .with_meta("file_size_bytes", bytes.len());
        Ok(content)
    }
}

pub struct XlsxExtractor;

#[async_trait]
impl Extractor for XlsxExtractor {
    fn mime_types(&self) -> &[&'static str] {
        &[XLSX_MIME]
    }

    fn extensions(&self) -> &[&'static str] {
        &["xlsx"]
    }

    fn can_extract(&self, file: &DriveFile) -> bool {
        file.mime() == XLSX_MIME || file.extension().as_deref() == Some("xlsx")
    }

    async fn extract(&self, file: &DriveFile, ctx: &ExtractionContext) -> Result<ExtractedContent> {
        size_gate!(file, ctx, "xlsx");
        let bytes = ctx.download_binary(&file.id).await?;
        let text = xlsx_text(
            &bytes,
            ctx.settings.excel_max_sheets,
            ctx.settings.max_rows_per_sheet,
        )?;
        let content = ExtractedContent::new(text, "xlsx")
            .with_meta("mime_type", file.mime())
            .with_meta("file_size_bytes", bytes.len());
        Ok(content)
    }
}

pub struct PptxExtractor;

#[async_trait]
impl Extractor for PptxExtractor {
    fn mime_types(&self) -> &[&'static str] {
        &[PPTX_MIME]
    }

    fn extensions(&self) -> &[&'static str] {
        &["pptx"]
    }

    fn can_extract(&self, file: &DriveFile) -> bool {
        file.mime() == PPTX_MIME || file.extension().as_deref() == Some("pptx")
    }

    async fn extract(&self, file: &DriveFile, ctx: &ExtractionContext) -> Result<ExtractedContent> {
        size_gate!(file, ctx, "pptx");
        let bytes = ctx.download_binary(&file.id).await?;
        let (text, slide_count) = pptx_text(&bytes)?;
        let content = ExtractedContent::new(text, "pptx")
            .with_meta("mime_type", file.mime())
            .with_meta("file_size_bytes", bytes.len())
            .with_meta("slide_count", slide_count);
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_docx_paragraphs_become_lines() {
        let document = r#"<?xml version="1.0"?>
            <w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
              <w:body>
                <w:p><w:r><w:t>Hello </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p>
                <w:p></w:p>
                <w:p><w:r><w:t>Second paragraph</w:t></w:r></w:p>
              </w:body>
            </w:document>"#;
        let bytes = zip_bytes(&[("word/document.xml", document)]);
        assert_eq!(docx_text(&bytes).unwrap(), "Hello world\nSecond paragraph");
    }

    #[test]
    fn test_docx_rejects_non_zip() {
        assert!(docx_text(b"not a zip").is_err());
    }

    #[test]
    fn test_pptx_slides_numbered_in_order() {
        let slide = |text: &str| {
            format!(
                r#"<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">
                     <a:p><a:r><a:t>{}</a:t></a:r></a:p>
                   </p:sld>"#,
                text
            )
        };
        // slide10 must sort after slide2.
        let bytes = zip_bytes(&[
            ("ppt/slides/slide10.xml", &slide("ten")),
            ("ppt/slides/slide1.xml", &slide("one")),
            ("ppt/slides/slide2.xml", &slide("two")),
        ]);
        let (text, count) = pptx_text(&bytes).unwrap();
        assert_eq!(count, 3);
        assert_eq!(
            text,
            "=== SLIDE 1 ===\none\n\n=== SLIDE 2 ===\ntwo\n\n=== SLIDE 3 ===\nten"
        );
    }

    #[test]
    fn test_xlsx_resolves_shared_strings() {
        let workbook = r#"<workbook><sheets>
            <sheet name="Budget" sheetId="1"/>
        </sheets></workbook>"#;
        let shared = r#"<sst><si><t>Name</t></si><si><t>Alice</t></si></sst>"#;
        let sheet = r#"<worksheet><sheetData>
            <row><c t="s"><v>0</v></c><c><v>42</v></c></row>
            <row><c t="s"><v>1</v></c></row>
        </sheetData></worksheet>"#;
        let bytes = zip_bytes(&[
            ("xl/workbook.xml", workbook),
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);
        assert_eq!(
            xlsx_text(&bytes, 20, 2000).unwrap(),
            "=== SHEET: Budget ===\nName\t42\nAlice"
        );
    }

    #[test]
    fn test_xlsx_sheet_cap_adds_marker() {
        let workbook = r#"<workbook><sheets>
            <sheet name="A"/><sheet name="B"/>
        </sheets></workbook>"#;
        let sheet = r#"<worksheet><sheetData>
            <row><c><v>1</v></c></row>
        </sheetData></worksheet>"#;
        let bytes = zip_bytes(&[
            ("xl/workbook.xml", workbook),
            ("xl/worksheets/sheet1.xml", sheet),
            ("xl/worksheets/sheet2.xml", sheet),
        ]);
        let text = xlsx_text(&bytes, 1, 0).unwrap();
        assert_eq!(text, "=== SHEET: A ===\n1\n\n... (limited to 1 sheets)");
    }

    #[test]
    fn test_xlsx_row_cap_adds_marker() {
        let workbook = r#"<workbook><sheets><sheet name="A"/></sheets></workbook>"#;
        let sheet = r#"<worksheet><sheetData>
            <row><c><v>1</v></c></row>
            <row><c><v>2</v></c></row>
            <row><c><v>3</v></c></row>
        </sheetData></worksheet>"#;
        let bytes = zip_bytes(&[
            ("xl/workbook.xml", workbook),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);
        let text = xlsx_text(&bytes, 0, 2).unwrap();
        assert_eq!(
            text,
            "=== SHEET: A ===\n1\n2\n... (limited to 2 rows)"
        );
    }

    #[test]
    fn test_xlsx_inline_strings() {
        let workbook = r#"<workbook><sheets><sheet name="A"/></sheets></workbook>"#;
        let sheet = r#"<worksheet><sheetData>
            <row><c t="inlineStr"><is><t>inline text</t></is></c></row>
        </sheetData></worksheet>"#;
        let bytes = zip_bytes(&[
            ("xl/workbook.xml", workbook),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);
        assert_eq!(
            xlsx_text(&bytes, 0, 0).unwrap(),
            "=== SHEET: A ===\ninline text"
        );
    }
}
