//! SQL generation through an OpenAI-compatible chat-completions endpoint.
//!
//! The default endpoint is Groq. The prompt carries the schema snapshot as
//! JSON; a reply containing `INVALID`, or nothing usable, yields no plan.
//! Transport and API failures are logged and also yield no plan, so a flaky
//! endpoint degrades to document-only answers instead of failed queries.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

use super::SqlGenerator;
use crate::config::LlmConfig;
use crate::error::{EngineError, Result};
use crate::models::SqlPlan;
use crate::schema::SchemaSnapshot;

const SYSTEM_PROMPT: &str = "You are an expert SQL generator. Given a database schema and a \
natural language question, generate a single, valid SQLite query. Do not provide any \
explanation, only the SQL query itself. If you cannot generate a query, respond with 'INVALID'.";

static FENCED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:sql)?\s*\n(.*?)\n?```").expect("valid fence pattern")
});

pub struct LlmSqlGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl LlmSqlGenerator {
    /// Fails when the API key variable named by `api_key_env` is unset.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            EngineError::Configuration(format!(
                "{} environment variable not set",
                config.api_key_env
            ))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    async fn complete(&self, prompt: String) -> std::result::Result<String, String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0.1,
            "max_tokens": 1024,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("API error {}: {}", status, text));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| e.to_string())?;
        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| "response missing choices[0].message.content".to_string())
    }
}

fn build_prompt(query: &str, schema: &SchemaSnapshot, table: Option<&str>) -> String {
    let schema_json = serde_json::to_string_pretty(schema).unwrap_or_default();
    let focus = table
        .map(|t| format!("\nThe most relevant table is probably `{}`.\n", t))
        .unwrap_or_default();
    format!(
        "Database Schema:\n```json\n{schema_json}\n```\n{focus}\nUser Question:\n\"{query}\"\n\n\
         Generate the SQLite query for the user's question based on the provided schema.\n\
         Respond with only the SQL query.\n"
    )
}

/// Pull the statement out of a reply, unwrapping a fenced block if present.
pub fn extract_sql(reply: &str) -> Option<String> {
    if reply.contains("INVALID") {
        return None;
    }
    let sql = match FENCED.captures(reply) {
        Some(caps) => caps[1].trim().to_string(),
        None => reply.trim().to_string(),
    };
    if sql.is_empty() {
        None
    } else {
        Some(sql)
    }
}

#[async_trait]
impl SqlGenerator for LlmSqlGenerator {
    fn name(&self) -> &str {
        "llm"
    }

    async fn generate(
        &self,
        query: &str,
        schema: &SchemaSnapshot,
        table: Option<&str>,
    ) -> Option<SqlPlan> {
        match self.complete(build_prompt(query, schema, table)).await {
            Ok(reply) => {
                extract_sql(&reply).map(|sql| SqlPlan::new(sql, "LLM generated query"))
            }
            Err(e) => {
                tracing::warn!(model = %self.model, "sql generation request failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_reply() {
        assert_eq!(
            extract_sql("  SELECT * FROM employees\n").as_deref(),
            Some("SELECT * FROM employees")
        );
    }

    #[test]
    fn test_extract_fenced_reply() {
        let reply = "Here you go:\n```sql\nSELECT name FROM staff;\n```";
        assert_eq!(extract_sql(reply).as_deref(), Some("SELECT name FROM staff;"));
    }

    #[test]
    fn test_invalid_and_empty_yield_none() {
        assert_eq!(extract_sql("INVALID"), None);
        assert_eq!(extract_sql("   "), None);
    }

    #[test]
    fn test_prompt_carries_schema_and_question() {
        let prompt = build_prompt("how many staff", &SchemaSnapshot::empty(), Some("staff"));
        assert!(prompt.contains("\"tables\": []"));
        assert!(prompt.contains("\"how many staff\""));
        assert!(prompt.contains("`staff`"));
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let config = LlmConfig {
            api_key_env: "HQ_TEST_DEFINITELY_UNSET_KEY".to_string(),
            ..LlmConfig::default()
        };
        let err = LlmSqlGenerator::new(&config).err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }
}
