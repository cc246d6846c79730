use hybridq::config::Config;
use hybridq::engine::Engine;
use hybridq::models::QueryType;
use hybridq::progress::NoProgress;
use hybridq::registry::EngineRegistry;
use std::sync::Arc;
use tempfile::TempDir;

async fn seeded(tmp: &TempDir) -> String {
    let path = tmp.path().join("hr.db");
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await
        .unwrap();
    for stmt in [
        "CREATE TABLE departments (id INTEGER PRIMARY KEY, name TEXT)",
        "CREATE TABLE employees (id INTEGER PRIMARY KEY, name TEXT, \
         department_id INTEGER REFERENCES departments(id), compensation REAL, \
         skills TEXT, hire_date TEXT)",
        "INSERT INTO departments VALUES (1, 'Engineering'), (2, 'Sales')",
        "INSERT INTO employees VALUES \
         (1, 'Alice', 1, 120000, 'Python, SQL', '2021-03-01'), \
         (2, 'Bob', 1, 95000, 'Rust', '2022-07-15'), \
         (3, 'Carol', 2, 70000, 'Negotiation', '2023-01-10')",
    ] {
        sqlx::query(stmt).execute(&pool).await.unwrap();
    }
    pool.close().await;
    format!("sqlite:{}", path.display())
}

#[tokio::test]
async fn test_sql_then_document_queries() {
    let tmp = TempDir::new().unwrap();
    let url = seeded(&tmp).await;
    let engine = Engine::connect(&url, &Config::default()).await.unwrap();

    let count = engine
        .process_query("How many employees do we have?", 5)
        .await
        .unwrap();
    assert_eq!(count.query_type, QueryType::Sql);
    assert_eq!(count.results[0]["total"], serde_json::json!(3));

    let resume = tmp.path().join("resume.txt");
    std::fs::write(&resume, "Objective\nBackend role\n\nSkills\nPython and Django").unwrap();
    engine
        .ingest_documents(&[resume], &NoProgress)
        .await
        .unwrap();

    let docs = engine
        .process_query("Find resumes mentioning Python skills", 5)
        .await
        .unwrap();
    assert_eq!(docs.query_type, QueryType::Document);
    let sources = docs.sources.expect("document sources");
    assert!(sources.iter().any(|c| c.content.contains("Python")));
    assert_eq!(docs.metrics.doc_index_size, engine.index_size());

    let history = engine.get_history();
    assert_eq!(history[0].query, "Find resumes mentioning Python skills");
    assert_eq!(history[1].query_type, QueryType::Sql);
}

#[tokio::test]
async fn test_refresh_picks_up_new_tables() {
    let tmp = TempDir::new().unwrap();
    let url = seeded(&tmp).await;
    let registry = EngineRegistry::new(Config::default());
    let engine = registry.get_engine(&url).await.unwrap();
    assert_eq!(engine.schema().tables.len(), 2);

    let pool = sqlx::SqlitePool::connect(&url).await.unwrap();
    sqlx::query("CREATE TABLE projects (id INTEGER PRIMARY KEY, title TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let refreshed = engine.refresh_schema().await.unwrap();
    assert_eq!(refreshed.tables.len(), 3);
    assert!(refreshed.table("projects").is_some());

    let again = registry.get_engine(&url).await.unwrap();
    assert!(Arc::ptr_eq(&engine, &again));
    assert_eq!(again.schema().tables.len(), 3);
}
