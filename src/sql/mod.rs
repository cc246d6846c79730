//! Natural-language → SQL synthesis.
//!
//! Two generators share the [`SqlGenerator`] contract:
//!
//! | Config value | Generator | Network |
//! |--------------|-----------|---------|
//! | `"heuristic"` | [`HeuristicSynthesizer`]: ordered pattern rules over the schema vocabulary | no |
//! | `"llm"` | [`LlmSqlGenerator`]: OpenAI-compatible chat completions | yes |
//!
//! Producing no plan is not a failure. Generators return `None` and the
//! engine carries on with the document path. Whatever a generator returns
//! passes through [`optimize_sql`] before execution.

pub mod heuristic;
pub mod llm;

use async_trait::async_trait;

use crate::config::{LlmConfig, SqlConfig};
use crate::datasource::is_write_statement;
use crate::error::{EngineError, Result};
use crate::models::SqlPlan;
use crate::schema::SchemaSnapshot;

pub use heuristic::HeuristicSynthesizer;
pub use llm::LlmSqlGenerator;

#[async_trait]
pub trait SqlGenerator: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Build a plan for `query`, optionally pinned to `table`.
    async fn generate(
        &self,
        query: &str,
        schema: &SchemaSnapshot,
        table: Option<&str>,
    ) -> Option<SqlPlan>;
}

/// Safety pass applied to every plan before execution.
///
/// Strips whitespace and a trailing `;`. Read statements that do not
/// mention `limit` anywhere get ` LIMIT <row_limit>` appended.
pub fn optimize_sql(sql: &str, row_limit: usize) -> String {
    let mut optimized = sql.trim();
    if let Some(stripped) = optimized.strip_suffix(';') {
        optimized = stripped.trim_end();
    }

    if is_write_statement(optimized) || optimized.to_lowercase().contains("limit") {
        optimized.to_string()
    } else {
        format!("{} LIMIT {}", optimized, row_limit)
    }
}

pub fn create_generator(sql: &SqlConfig, llm: &LlmConfig) -> Result<Box<dyn SqlGenerator>> {
    match sql.generator.as_str() {
        "heuristic" => Ok(Box::new(HeuristicSynthesizer::new())),
        "llm" => Ok(Box::new(LlmSqlGenerator::new(llm)?)),
        other => Err(EngineError::Configuration(format!(
            "unknown sql generator: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimize_appends_limit_to_reads() {
        assert_eq!(
            optimize_sql("  SELECT * FROM employees; ", 100),
            "SELECT * FROM employees LIMIT 100"
        );
    }

    #[test]
    fn test_optimize_keeps_existing_limit() {
        let sql = "SELECT * FROM employees ORDER BY pay DESC LIMIT :limit";
        assert_eq!(optimize_sql(sql, 100), sql);
    }

    #[test]
    fn test_optimize_leaves_writes_alone() {
        assert_eq!(
            optimize_sql("DELETE FROM employees WHERE id = 3;", 100),
            "DELETE FROM employees WHERE id = 3"
        );
        assert_eq!(
            optimize_sql("insert into t values (1)", 100),
            "insert into t values (1)"
        );
    }

    #[test]
    fn test_create_generator_heuristic_by_default() {
        let generator = create_generator(&SqlConfig::default(), &LlmConfig::default()).unwrap();
        assert_eq!(generator.name(), "heuristic");
    }
}
