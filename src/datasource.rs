//! Relational data-source abstraction.
//!
//! The engine never talks to a driver directly. It introspects, samples and
//! executes through [`DataSource`], so the schema mapper and the SQL path can
//! be exercised against any backend that can answer three questions:
//!
//! | Operation | Purpose |
//! |-----------|---------|
//! | [`DataSource::introspect`] | Tables, columns (name → declared type), foreign keys |
//! | [`DataSource::sample`] | Up to N preview rows of one table |
//! | [`DataSource::execute`] | Run a statement with named `:param` bindings |
//!
//! [`SqliteDataSource`] is the shipped implementation, backed by a `sqlx`
//! pool. SQLite has no named-parameter binding in `sqlx`, so statements are
//! rewritten from `:name` to numbered `?N` placeholders before binding.

use async_trait::async_trait;
use serde_json::{Number, Value};
use sqlx::sqlite::{SqliteArguments, SqlitePool, SqliteRow};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};
use std::collections::BTreeMap;

use crate::error::{EngineError, Result};
use crate::models::Row as JsonRow;

/// One foreign key, possibly spanning several columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub referred_table: String,
    /// `(local column, referenced column)` pairs in key order.
    pub columns: Vec<(String, String)>,
}

/// Introspected shape of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    /// `(column name, declared type)` in declaration order.
    pub columns: Vec<(String, String)>,
    pub foreign_keys: Vec<ForeignKey>,
}

/// What a statement produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    Rows(Vec<JsonRow>),
    Affected(u64),
}

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn introspect(&self) -> Result<Vec<TableInfo>>;

    async fn sample(&self, table: &str, limit: usize) -> Result<Vec<JsonRow>>;

    async fn execute(&self, sql: &str, params: &BTreeMap<String, Value>) -> Result<ExecOutcome>;
}

pub struct SqliteDataSource {
    pool: SqlitePool,
}

impl SqliteDataSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("name").map_err(EngineError::from))
            .collect()
    }

    async fn columns(&self, table: &str) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")
            .bind(table)
            .fetch_all(&self.pool)
            .await?;
        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let ty: String = row.try_get("type")?;
            columns.push((name, ty));
        }
        Ok(columns)
    }

    async fn primary_key(&self, table: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT name FROM pragma_table_info(?1) WHERE pk = 1")
            .bind(table)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => Ok(Some(r.try_get("name")?)),
            None => Ok(None),
        }
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let rows = sqlx::query(
            "SELECT id, \"table\" AS referred, \"from\" AS local, \"to\" AS remote \
             FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        let mut keys: Vec<(i64, ForeignKey)> = Vec::new();
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let referred: String = row.try_get("referred")?;
            let local: String = row.try_get("local")?;
            // A NULL target means the parent's primary key.
            let remote = match row.try_get::<Option<String>, _>("remote")? {
                Some(col) => col,
                None => self
                    .primary_key(&referred)
                    .await?
                    .unwrap_or_else(|| "rowid".to_string()),
            };

            match keys.last_mut() {
                Some((last_id, fk)) if *last_id == id => fk.columns.push((local, remote)),
                _ => keys.push((
                    id,
                    ForeignKey {
                        referred_table: referred,
                        columns: vec![(local, remote)],
                    },
                )),
            }
        }
        Ok(keys.into_iter().map(|(_, fk)| fk).collect())
    }
}

#[async_trait]
impl DataSource for SqliteDataSource {
    async fn introspect(&self) -> Result<Vec<TableInfo>> {
        let mut tables = Vec::new();
        for name in self.table_names().await? {
            let columns = self.columns(&name).await?;
            let foreign_keys = self.foreign_keys(&name).await?;
            tables.push(TableInfo {
                name,
                columns,
                foreign_keys,
            });
        }
        tracing::debug!("introspected {} tables", tables.len());
        Ok(tables)
    }

    async fn sample(&self, table: &str, limit: usize) -> Result<Vec<JsonRow>> {
        let sql = format!("SELECT * FROM {} LIMIT ?1", quote_always(table));
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_json).collect()
    }

    async fn execute(&self, sql: &str, params: &BTreeMap<String, Value>) -> Result<ExecOutcome> {
        let (rewritten, names) = rewrite_named_params(sql);
        let mut query: SqliteQuery<'_> = sqlx::query(&rewritten);
        for name in &names {
            let value = params.get(name).ok_or_else(|| {
                EngineError::Validation(format!("missing value for parameter :{}", name))
            })?;
            query = bind_value(query, value);
        }

        tracing::debug!(sql = %rewritten, params = names.len(), "executing statement");

        if is_write_statement(sql) {
            let done = query.execute(&self.pool).await?;
            Ok(ExecOutcome::Affected(done.rows_affected()))
        } else {
            let rows = query.fetch_all(&self.pool).await?;
            let rows = rows.iter().map(row_to_json).collect::<Result<Vec<_>>>()?;
            Ok(ExecOutcome::Rows(rows))
        }
    }
}

// ============ Statement helpers ============

const WRITE_KEYWORDS: &[&str] = &["UPDATE", "INSERT", "DELETE", "CREATE", "DROP", "ALTER", "REPLACE"];

/// True when the statement's leading keyword mutates data or schema.
pub fn is_write_statement(sql: &str) -> bool {
    let head = sql
        .trim_start()
        .trim_start_matches('(')
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    WRITE_KEYWORDS.contains(&head.as_str())
}

/// Quote an identifier only when it is not a plain `[A-Za-z_][A-Za-z0-9_]*` word.
pub fn quote_ident(ident: &str) -> String {
    let mut chars = ident.chars();
    let plain = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if plain {
        ident.to_string()
    } else {
        quote_always(ident)
    }
}

fn quote_always(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Rewrite `:name` placeholders to `?N`, numbering by first appearance.
///
/// Returns the rewritten statement and the parameter names in index order.
/// Quoted strings and identifiers are copied through untouched.
pub fn rewrite_named_params(sql: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            ':' if chars
                .peek()
                .is_some_and(|n| n.is_ascii_alphabetic() || *n == '_') =>
            {
                let mut name = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        name.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let index = match names.iter().position(|existing| *existing == name) {
                    Some(i) => i + 1,
                    None => {
                        names.push(name);
                        names.len()
                    }
                };
                out.push('?');
                out.push_str(&index.to_string());
            }
            _ => out.push(c),
        }
    }
    (out, names)
}

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

/// Convert a driver row to portable JSON by the value's storage class.
///
/// Dates stay ISO text (SQLite stores them as TEXT), non-finite floats
/// become null, blobs are decoded as lossy UTF-8.
fn row_to_json(row: &SqliteRow) -> Result<JsonRow> {
    let mut out = JsonRow::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let storage = raw.type_info().name().to_string();
            match storage.as_str() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(i)?),
                "REAL" => Number::from_f64(row.try_get_unchecked::<f64, _>(i)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "BLOB" => {
                    let bytes = row.try_get_unchecked::<Vec<u8>, _>(i)?;
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::String(row.try_get_unchecked::<String, _>(i)?),
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_source() -> SqliteDataSource {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE departments (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "CREATE TABLE employees (
                id INTEGER PRIMARY KEY,
                name TEXT,
                department_id INTEGER REFERENCES departments(id),
                compensation REAL,
                photo BLOB
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO departments (id, name) VALUES (1, 'Engineering')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO employees VALUES (1, 'Ada', 1, 120000.5, X'6869'), (2, 'Bob', 1, NULL, NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        SqliteDataSource::new(pool)
    }

    #[test]
    fn test_rewrite_named_params() {
        let (sql, names) =
            rewrite_named_params("SELECT * FROM t WHERE a = :x AND b = ':y' AND c = :x AND d = :z");
        assert_eq!(
            sql,
            "SELECT * FROM t WHERE a = ?1 AND b = ':y' AND c = ?1 AND d = ?2"
        );
        assert_eq!(names, vec!["x".to_string(), "z".to_string()]);
    }

    #[test]
    fn test_write_statement_detection() {
        assert!(is_write_statement("  delete from t"));
        assert!(is_write_statement("UPDATE t SET a = 1"));
        assert!(!is_write_statement("SELECT * FROM updates"));
        assert!(!is_write_statement("WITH x AS (SELECT 1) SELECT * FROM x"));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("employees"), "employees");
        assert_eq!(quote_ident("pay rate"), "\"pay rate\"");
        assert_eq!(quote_ident("1st"), "\"1st\"");
    }

    #[tokio::test]
    async fn test_introspect_tables_and_foreign_keys() {
        let source = memory_source().await;
        let tables = source.introspect().await.unwrap();
        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["departments", "employees"]);

        let employees = &tables[1];
        assert_eq!(employees.columns[2], ("department_id".into(), "INTEGER".into()));
        assert_eq!(
            employees.foreign_keys,
            vec![ForeignKey {
                referred_table: "departments".into(),
                columns: vec![("department_id".into(), "id".into())],
            }]
        );
    }

    #[tokio::test]
    async fn test_execute_binds_named_params_and_converts_values() {
        let source = memory_source().await;
        let mut params = BTreeMap::new();
        params.insert("name".to_string(), Value::from("ada"));
        let outcome = source
            .execute(
                "SELECT id, compensation, photo FROM employees WHERE lower(name) = :name",
                &params,
            )
            .await
            .unwrap();
        let ExecOutcome::Rows(rows) = outcome else {
            panic!("expected rows");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], Value::from(1));
        assert_eq!(rows[0]["compensation"], Value::from(120000.5));
        assert_eq!(rows[0]["photo"], Value::from("hi"));
    }

    #[tokio::test]
    async fn test_execute_write_reports_affected_rows() {
        let source = memory_source().await;
        let outcome = source
            .execute("UPDATE employees SET compensation = 1", &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(outcome, ExecOutcome::Affected(2));
    }

    #[tokio::test]
    async fn test_missing_parameter_is_validation_error() {
        let source = memory_source().await;
        let err = source
            .execute("SELECT * FROM employees WHERE id = :id", &BTreeMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_bad_statement_is_execution_error() {
        let source = memory_source().await;
        let err = source
            .execute("SELECT * FROM nowhere", &BTreeMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Execution);
    }

    #[tokio::test]
    async fn test_sample_limits_rows() {
        let source = memory_source().await;
        let rows = source.sample("employees", 1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].contains_key("name"));
    }
}
