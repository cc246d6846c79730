//! Query text hygiene for the transport layer.
//!
//! [`clean_input`] normalizes whitespace and strips control characters;
//! [`validate_query`] additionally rejects empty, over-long and suspicious
//! input. The engine itself never sees raw user text from the HTTP API.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{EngineError, Result};

/// Longest accepted query, in characters.
pub const DEFAULT_MAX_LENGTH: usize = 500;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

static CONTROL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x1f\x7f]").expect("valid control pattern"));

static SUSPICIOUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i);|--|/\*|\*/|\b(drop|delete|insert|update|alter|truncate|grant|revoke|exec|execute|union|select|create|replace|merge|shutdown|execxp)\b|0x[0-9a-f]+|\||`|\$\(.*\)|\\x",
    )
    .expect("valid suspicious-input pattern")
});

/// Collapse whitespace runs to one space, then drop control characters.
pub fn clean_input(text: &str) -> String {
    let collapsed = WHITESPACE.replace_all(text.trim(), " ");
    CONTROL.replace_all(&collapsed, "").into_owned()
}

/// Clean `text` and reject it if it is empty, longer than `max_length`
/// characters, or contains SQL/shell metacharacters or statement keywords.
pub fn validate_query(text: &str, max_length: usize) -> Result<String> {
    let cleaned = clean_input(text);
    if cleaned.is_empty() {
        return Err(EngineError::Validation("query must not be empty".into()));
    }
    let len = cleaned.chars().count();
    if len > max_length {
        return Err(EngineError::Validation(format!(
            "query is {} characters; the limit is {}",
            len, max_length
        )));
    }
    if let Some(m) = SUSPICIOUS.find(&cleaned) {
        return Err(EngineError::Validation(format!(
            "query contains disallowed input: {:?}",
            m.as_str()
        )));
    }
    Ok(cleaned)
}
