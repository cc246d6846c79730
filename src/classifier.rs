//! Keyword-driven query classification.
//!
//! Decides which retrieval path(s) a query needs. Vocabularies are matched
//! as whole words on the lowercased query; the first matching row wins:
//!
//! | SQL cue | Document cue | File cue | Result |
//! |---------|--------------|----------|--------|
//! | yes | yes | – | `Hybrid` |
//! | yes | no | – | `Sql` |
//! | no | yes | – | `Document` |
//! | no | no | yes | `Document` |
//! | no | no | no | `Hybrid` |
//!
//! Domain-entity words (`employee`, `salary`, ...) fit either path, so they
//! are reported in [`Signals`] but never decide the label.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::QueryType;

const SQL_KEYWORDS: &[&str] = &[
    "select", "from", "where", "group", "average", "count", "sum", "join", "order",
];

const DOCUMENT_KEYWORDS: &[&str] = &[
    "document",
    "resume",
    "resumes",
    "review",
    "note",
    "certificate",
    "policy",
];

const FILE_KEYWORDS: &[&str] = &["pdf", "docx", "txt", "csv", "file"];

const DATA_KEYWORDS: &[&str] = &[
    "employee",
    "employees",
    "department",
    "salary",
    "bonus",
    "location",
    "skill",
];

static SQL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"\bhow many\b", r"\baverage\b", r"\btop \d+\b", r"\breports? to\b"]
        .iter()
        .map(|p| Regex::new(p).expect("valid SQL cue pattern"))
        .collect()
});

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("valid word pattern"));

/// Which vocabularies a query touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    pub sql: bool,
    pub document: bool,
    pub file: bool,
    pub data: bool,
}

pub fn signals(query: &str) -> Signals {
    let normalized = query.to_lowercase();
    let words: Vec<&str> = WORD.find_iter(&normalized).map(|m| m.as_str()).collect();
    let has_any = |vocab: &[&str]| words.iter().any(|w| vocab.contains(w));

    Signals {
        sql: has_any(SQL_KEYWORDS) || SQL_PATTERNS.iter().any(|p| p.is_match(&normalized)),
        document: has_any(DOCUMENT_KEYWORDS),
        file: has_any(FILE_KEYWORDS),
        data: has_any(DATA_KEYWORDS),
    }
}

pub fn classify(query: &str) -> QueryType {
    let s = signals(query);
    match (s.sql, s.document) {
        (true, true) => QueryType::Hybrid,
        (true, false) => QueryType::Sql,
        (false, true) => QueryType::Document,
        (false, false) if s.file => QueryType::Document,
        (false, false) => QueryType::Hybrid,
    }
}
