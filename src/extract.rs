//! Plain-text extraction from uploaded documents.
//!
//! The format is chosen by file extension:
//!
//! | Extension | Reader |
//! |-----------|--------|
//! | `.pdf` | `pdf-extract` |
//! | `.docx` | `word/document.xml` via `zip` + `quick-xml`, one line per paragraph |
//! | `.json` | pretty-printed |
//! | `.jsonl` | one compact object per line |
//! | anything else | UTF-8, invalid sequences replaced |
//!
//! Malformed JSON falls back to the raw text. Unreadable files, broken PDFs
//! and broken DOCX archives are [`EngineError::Extraction`] / [`EngineError::Io`].

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;

use crate::error::{EngineError, Result};

/// Decompressed size cap for a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Read `path` and return its text content.
pub fn read_document(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|source| EngineError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let fail = |message: String| EngineError::Extraction {
        path: path.display().to_string(),
        message,
    };

    match ext.as_str() {
        "pdf" => pdf_extract::extract_text_from_mem(&bytes).map_err(|e| fail(e.to_string())),
        "docx" => extract_docx(&bytes).map_err(fail),
        "json" => Ok(pretty_json(&String::from_utf8_lossy(&bytes))),
        "jsonl" => Ok(compact_json_lines(&String::from_utf8_lossy(&bytes))),
        _ => Ok(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

fn pretty_json(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| text.to_string())
}

fn compact_json_lines(text: &str) -> String {
    let parsed: std::result::Result<Vec<serde_json::Value>, _> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(serde_json::from_str)
        .collect();
    match parsed {
        Ok(values) => values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("\n"),
        Err(_) => text.to_string(),
    }
}

fn extract_docx(bytes: &[u8]) -> std::result::Result<String, String> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| "word/document.xml not found".to_string())?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| e.to_string())?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err("word/document.xml exceeds size limit".to_string());
    }
    docx_paragraphs(&xml)
}

/// Collect `w:t` runs, closing a line at each `w:p`.
fn docx_paragraphs(xml: &[u8]) -> std::result::Result<String, String> {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n"))
}
