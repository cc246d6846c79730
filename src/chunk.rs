//! Content-aware text chunking.
//!
//! Splits extracted document text into retrieval-sized passages. The
//! strategy depends on what the text looks like:
//!
//! | Kind | Cue (first match wins) | Strategy | Budget |
//! |------|------------------------|----------|--------|
//! | [`DocumentKind::Resume`] | `resume`, `objective`, `skills` | sections: skills, experience, projects, education | 800 |
//! | [`DocumentKind::Contract`] | `agreement`, `clause`, `party` | sections: section, clause, article | 1200 |
//! | [`DocumentKind::Review`] | `performance` and `review` | blank-line paragraphs | 600 |
//! | [`DocumentKind::Tabular`] | hint ends in `.csv` / `.tsv` | header + 10-row batches | – |
//! | [`DocumentKind::Generic`] | anything else | sentences on `.` `?` `!` | 800 |
//!
//! Budgets are in characters. Pieces are merged greedily with `\n`; no
//! chunk exceeds its budget unless it is a single oversized piece, which is
//! kept whole.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

use crate::models::DocumentChunk;

const RESUME_SECTIONS: &[&str] = &["skills", "experience", "projects", "education"];
const CONTRACT_SECTIONS: &[&str] = &["section", "clause", "article"];
const RESUME_BUDGET: usize = 800;
const CONTRACT_BUDGET: usize = 1200;
const REVIEW_BUDGET: usize = 600;
const SENTENCE_BUDGET: usize = 800;
const ROWS_PER_CHUNK: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Resume,
    Contract,
    Review,
    Tabular,
    Generic,
}

/// Guess the document kind from its text and a file-name hint.
pub fn infer_document_type(text: &str, hint: &str) -> DocumentKind {
    let lower = text.to_lowercase();
    let hint = hint.to_lowercase();
    if ["resume", "objective", "skills"].iter().any(|k| lower.contains(*k)) {
        DocumentKind::Resume
    } else if ["agreement", "clause", "party"].iter().any(|k| lower.contains(*k)) {
        DocumentKind::Contract
    } else if lower.contains("performance") && lower.contains("review") {
        DocumentKind::Review
    } else if hint.ends_with(".csv") || hint.ends_with(".tsv") {
        DocumentKind::Tabular
    } else {
        DocumentKind::Generic
    }
}

/// Chunk `text`, choosing a strategy from its content and `hint`.
pub fn extract_and_chunk(text: &str, hint: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    match infer_document_type(text, hint) {
        DocumentKind::Resume => chunk_by_sections(text, RESUME_SECTIONS, RESUME_BUDGET),
        DocumentKind::Contract => chunk_by_sections(text, CONTRACT_SECTIONS, CONTRACT_BUDGET),
        DocumentKind::Review => chunk_paragraphs(text, REVIEW_BUDGET),
        DocumentKind::Tabular => chunk_rows(text, ROWS_PER_CHUNK),
        DocumentKind::Generic => chunk_sentences(text, SENTENCE_BUDGET),
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split at lines containing a section keyword, group sections by keyword
/// in `keywords` order, then merge under `budget`. Text before the first
/// keyword line comes last.
pub fn chunk_by_sections(text: &str, keywords: &[&str], budget: usize) -> Vec<String> {
    const PREAMBLE: &str = "";
    let mut sections: Vec<(&str, Vec<String>)> =
        keywords.iter().map(|k| (*k, Vec::new())).collect();
    sections.push((PREAMBLE, Vec::new()));
    let mut current = PREAMBLE;
    let mut buffer: Vec<&str> = Vec::new();

    fn flush<'a>(sections: &mut [(&'a str, Vec<String>)], key: &'a str, buffer: &mut Vec<&str>) {
        if buffer.is_empty() {
            return;
        }
        let body = buffer.join("\n").trim().to_string();
        buffer.clear();
        if body.is_empty() {
            return;
        }
        if let Some((_, bodies)) = sections.iter_mut().find(|(k, _)| *k == key) {
            bodies.push(body);
        }
    }

    for line in text.lines() {
        let lower = line.to_lowercase();
        if let Some(keyword) = keywords.iter().find(|k| lower.contains(**k)) {
            flush(&mut sections, current, &mut buffer);
            current = *keyword;
        }
        buffer.push(line);
    }
    flush(&mut sections, current, &mut buffer);

    let pieces = sections.into_iter().flat_map(|(_, bodies)| bodies).collect();
    merge_chunks(pieces, budget)
}

pub fn chunk_paragraphs(text: &str, budget: usize) -> Vec<String> {
    let paragraphs = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    merge_chunks(paragraphs, budget)
}

/// Keep the header line and emit it ahead of every batch of `rows` data lines.
pub fn chunk_rows(text: &str, rows: usize) -> Vec<String> {
    let trimmed = text.trim();
    let mut lines = trimmed.lines();
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let data: Vec<&str> = lines.collect();
    if data.is_empty() {
        return vec![trimmed.to_string()];
    }
    data.chunks(rows.max(1))
        .map(|batch| {
            let mut chunk = String::from(header);
            for row in batch {
                chunk.push('\n');
                chunk.push_str(row);
            }
            chunk
        })
        .collect()
}

/// Split a line after each `.`, `?` or `!`.
fn split_sentences(line: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in line.chars() {
        current.push(c);
        if matches!(c, '.' | '?' | '!') {
            let s = current.trim();
            if !s.is_empty() {
                sentences.push(s.to_string());
            }
            current.clear();
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

pub fn chunk_sentences(text: &str, budget: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in text.lines().flat_map(|l| split_sentences(l.trim())) {
        let would_be = if current.is_empty() {
            char_len(&sentence)
        } else {
            char_len(&current) + 1 + char_len(&sentence)
        };
        if would_be > budget && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&sentence);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Greedily join pieces with `\n` while the result stays within `budget`.
pub fn merge_chunks(pieces: Vec<String>, budget: usize) -> Vec<String> {
    let mut merged = Vec::new();
    let mut buffer = String::new();

    for piece in pieces {
        if buffer.is_empty() {
            buffer = piece;
        } else if char_len(&buffer) + 1 + char_len(&piece) <= budget {
            buffer.push('\n');
            buffer.push_str(&piece);
        } else {
            merged.push(std::mem::replace(&mut buffer, piece));
        }
    }
    if !buffer.is_empty() {
        merged.push(buffer);
    }
    merged
}

/// Wrap chunk texts of one file as [`DocumentChunk`]s.
///
/// `chunk_id` is `<stem>-<index>`, `document_id` the file name; metadata
/// records the path, the position and a SHA-256 of the text.
pub fn to_document_chunks(path: &Path, texts: Vec<String>) -> Vec<DocumentChunk> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    texts
        .into_iter()
        .enumerate()
        .map(|(i, content)| {
            let mut hasher = Sha256::new();
            hasher.update(content.as_bytes());
            let hash = format!("{:x}", hasher.finalize());

            let mut metadata = BTreeMap::new();
            metadata.insert("path".to_string(), Value::from(path.display().to_string()));
            metadata.insert("order".to_string(), Value::from(i));
            metadata.insert("hash".to_string(), Value::from(hash));

            DocumentChunk {
                chunk_id: format!("{}-{}", stem, i),
                document_id: name.clone(),
                content,
                metadata,
            }
        })
        .collect()
}
