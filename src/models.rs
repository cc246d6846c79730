//! Core data models shared across the retrieval pipeline.
//!
//! These types represent the chunks, plans, responses, and history records
//! that flow between the classifier, the two retrieval paths, and the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A row returned by the data source, keyed by column name.
pub type Row = Map<String, Value>;

/// Which retrieval path(s) a query needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Sql,
    Document,
    Hybrid,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Sql => "sql",
            QueryType::Document => "document",
            QueryType::Hybrid => "hybrid",
        }
    }

    /// True when the structured (SQL) path should run.
    pub fn wants_sql(&self) -> bool {
        matches!(self, QueryType::Sql | QueryType::Hybrid)
    }

    /// True when the unstructured (document) path should run.
    pub fn wants_documents(&self) -> bool {
        matches!(self, QueryType::Document | QueryType::Hybrid)
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A passage of a source document, the unit of vector retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub content: String,
    pub metadata: BTreeMap<String, Value>,
}

/// A candidate statement with named parameters and a rationale.
///
/// Parameters are referenced as `:name` in `sql`; user-supplied values only
/// ever travel through `params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlPlan {
    pub sql: String,
    pub params: BTreeMap<String, Value>,
    pub description: String,
}

impl SqlPlan {
    pub fn new(sql: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: BTreeMap::new(),
            description: description.into(),
        }
    }

    pub fn with_param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }
}

/// Timing and cache metadata attached to every response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub response_ms: f64,
    pub cache_hit: bool,
    pub doc_index_size: usize,
}

/// The full answer to one natural-language query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub query_type: QueryType,
    pub results: Vec<Row>,
    pub metrics: QueryMetrics,
    pub sources: Option<Vec<DocumentChunk>>,
}

/// One entry in the query history ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub query: String,
    #[serde(rename = "type")]
    pub query_type: QueryType,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_type_paths() {
        assert!(QueryType::Sql.wants_sql());
        assert!(!QueryType::Sql.wants_documents());
        assert!(QueryType::Document.wants_documents());
        assert!(QueryType::Hybrid.wants_sql() && QueryType::Hybrid.wants_documents());
    }

    #[test]
    fn test_query_type_serializes_lowercase() {
        let json = serde_json::to_string(&QueryType::Document).unwrap();
        assert_eq!(json, "\"document\"");
    }

    #[test]
    fn test_plan_builder() {
        let plan = SqlPlan::new("SELECT 1 LIMIT :limit", "one").with_param("limit", 5);
        assert_eq!(plan.params["limit"], Value::from(5));
    }
}
