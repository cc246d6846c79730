//! Per-connection retrieval orchestrator.
//!
//! One [`Engine`] wraps one relational source together with its schema
//! snapshot, SQL generator, embedding provider, vector index, result cache
//! and query history. A query flows:
//!
//! ```text
//! cache → classify → SQL path (map → synthesize → optimize → execute)
//!                  → document path (embed → search)
//!       → merge → cache → history
//! ```
//!
//! Either path failing fails the whole query; there are no partial answers.

use parking_lot::RwLock;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::TtlCache;
use crate::classifier::classify;
use crate::config::Config;
use crate::datasource::{DataSource, ExecOutcome, SqliteDataSource};
use crate::db;
use crate::embedding::{create_provider, embed_query, EmbeddingProvider};
use crate::error::Result;
use crate::history::QueryHistory;
use crate::ingest::{DocumentProcessor, IngestSummary};
use crate::models::{DocumentChunk, HistoryRecord, QueryMetrics, QueryResponse, QueryType, Row};
use crate::progress::IngestProgressReporter;
use crate::schema::{analyze, map_query, SchemaSnapshot};
use crate::sql::{create_generator, optimize_sql, SqlGenerator};
use crate::vector_index::VectorIndex;

pub struct Engine {
    source: Arc<dyn DataSource>,
    schema: RwLock<Arc<SchemaSnapshot>>,
    generator: Box<dyn SqlGenerator>,
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    cache: TtlCache<QueryResponse>,
    history: QueryHistory,
    config: Config,
}

impl Engine {
    /// Connect to `url` and build an engine from `config`.
    pub async fn connect(url: &str, config: &Config) -> Result<Self> {
        let pool = db::connect(url, &config.db).await?;
        let source: Arc<dyn DataSource> = Arc::new(SqliteDataSource::new(pool));
        let generator = create_generator(&config.sql, &config.llm)?;
        let provider: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
        Self::new(source, generator, provider, config.clone()).await
    }

    /// Build an engine over explicit collaborators. Analyzes the schema once.
    pub async fn new(
        source: Arc<dyn DataSource>,
        generator: Box<dyn SqlGenerator>,
        provider: Arc<dyn EmbeddingProvider>,
        config: Config,
    ) -> Result<Self> {
        let snapshot = analyze(source.as_ref()).await?;
        let index = Arc::new(VectorIndex::new(provider.dims()));
        tracing::info!(
            "engine ready: generator={}, embeddings={} ({} dims)",
            generator.name(),
            provider.model_name(),
            provider.dims()
        );

        Ok(Self {
            source,
            schema: RwLock::new(Arc::new(snapshot)),
            generator,
            provider,
            index,
            cache: TtlCache::new(
                Duration::from_secs(config.cache.ttl_seconds),
                config.cache.max_size,
            ),
            history: QueryHistory::new(config.history.capacity),
            config,
        })
    }

    /// Answer one natural-language query.
    pub async fn process_query(&self, text: &str, top_k: usize) -> Result<QueryResponse> {
        let started = Instant::now();

        if let Some(mut cached) = self.cache.get(text) {
            tracing::debug!("cache hit for {:?}", text);
            cached.metrics.cache_hit = true;
            return Ok(cached);
        }

        let classified = classify(text);
        tracing::debug!("classified {:?} as {}", text, classified);

        let results = if classified.wants_sql() {
            self.structured(text).await?
        } else {
            Vec::new()
        };
        let sources = if classified.wants_documents() {
            self.unstructured(text, top_k).await?
        } else {
            Vec::new()
        };

        let query_type = match (!results.is_empty(), !sources.is_empty()) {
            (true, false) => QueryType::Sql,
            (false, true) => QueryType::Document,
            (true, true) => QueryType::Hybrid,
            (false, false) => classified,
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let response = QueryResponse {
            query: text.to_string(),
            query_type,
            results,
            metrics: QueryMetrics {
                response_ms: (elapsed_ms * 100.0).round() / 100.0,
                cache_hit: false,
                doc_index_size: self.index.size(),
            },
            sources: if sources.is_empty() {
                None
            } else {
                Some(sources)
            },
        };

        self.cache.set(text, response.clone());
        self.history.add(text, query_type);
        tracing::info!(
            "answered {:?}: type={}, rows={}, sources={}",
            text,
            query_type,
            response.results.len(),
            response.sources.as_ref().map_or(0, Vec::len)
        );
        Ok(response)
    }

    async fn structured(&self, text: &str) -> Result<Vec<Row>> {
        let snapshot = self.schema();
        let mapping = map_query(text, &snapshot);
        let table = mapping.likely_tables.first().map(String::as_str);

        let Some(plan) = self.generator.generate(text, &snapshot, table).await else {
            tracing::debug!("no SQL plan for {:?}", text);
            return Ok(Vec::new());
        };

        let sql = optimize_sql(&plan.sql, self.config.retrieval.row_limit);
        tracing::debug!("executing plan ({}): {}", plan.description, sql);
        match self.source.execute(&sql, &plan.params).await? {
            ExecOutcome::Rows(rows) => Ok(rows),
            ExecOutcome::Affected(n) => {
                let mut row = Row::new();
                row.insert("affected_rows".to_string(), Value::from(n));
                row.insert("status".to_string(), Value::from("success"));
                Ok(vec![row])
            }
        }
    }

    async fn unstructured(&self, text: &str, top_k: usize) -> Result<Vec<DocumentChunk>> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }
        let vector = embed_query(self.provider.as_ref(), text).await?;
        self.index.search(&vector, top_k)
    }

    /// Recent queries, most recent first.
    pub fn get_history(&self) -> Vec<HistoryRecord> {
        self.history.list()
    }

    /// Current schema snapshot.
    pub fn schema(&self) -> Arc<SchemaSnapshot> {
        self.schema.read().clone()
    }

    /// Re-introspect the source and swap the snapshot. Cached answers are
    /// dropped since they were planned against the old schema.
    pub async fn refresh_schema(&self) -> Result<Arc<SchemaSnapshot>> {
        let snapshot = Arc::new(analyze(self.source.as_ref()).await?);
        *self.schema.write() = Arc::clone(&snapshot);
        self.cache.clear();
        Ok(snapshot)
    }

    /// Chunk, embed and index documents. Cached answers are dropped so new
    /// sources become visible immediately.
    pub async fn ingest_documents(
        &self,
        paths: &[PathBuf],
        progress: &dyn IngestProgressReporter,
    ) -> Result<IngestSummary> {
        let processor = DocumentProcessor::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.index),
            self.config.embedding.batch_size,
            self.config.ingest.clone(),
        );
        let summary = processor.process(paths, progress).await;
        self.cache.clear();
        summary
    }

    pub fn index_size(&self) -> usize {
        self.index.size()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingProvider;
    use crate::error::{EngineError, ErrorKind};
    use crate::progress::NoProgress;
    use crate::sql::HeuristicSynthesizer;
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::collections::BTreeMap;

    const HYBRID_COUNT: &str = "How many employees are mentioned in the policy document?";

    struct UnavailableProvider;

    #[async_trait]
    impl EmbeddingProvider for UnavailableProvider {
        fn model_name(&self) -> &str {
            "unavailable"
        }

        fn dims(&self) -> usize {
            4
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(EngineError::Embedding("embedding service unavailable".into()))
        }
    }

    async fn seeded_engine() -> Engine {
        seeded_engine_with(Arc::new(HashingProvider::new(64))).await
    }

    async fn seeded_engine_with(provider: Arc<dyn EmbeddingProvider>) -> Engine {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
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

        let config = Config::default();
        Engine::new(
            Arc::new(SqliteDataSource::new(pool)),
            Box::new(HeuristicSynthesizer::new()),
            provider,
            config,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_count_query_then_cache_hit() {
        let engine = seeded_engine().await;
        let first = engine
            .process_query("How many employees do we have?", 5)
            .await
            .unwrap();
        assert_eq!(first.query_type, QueryType::Sql);
        assert_eq!(first.results[0]["total"], Value::from(3));
        assert!(!first.metrics.cache_hit);
        assert!(first.sources.is_none());

        let second = engine
            .process_query("How many employees do we have?", 5)
            .await
            .unwrap();
        assert!(second.metrics.cache_hit);
        assert_eq!(second.results, first.results);
        assert_eq!(engine.get_history().len(), 1);

        // Hits hand out copies; the stored answer is untouched.
        let stored = engine.cache.get("How many employees do we have?").unwrap();
        assert!(!stored.metrics.cache_hit);
    }

    #[tokio::test]
    async fn test_rows_and_sources_make_hybrid() {
        let engine = seeded_engine().await;
        let tmp = tempfile::TempDir::new().unwrap();
        let policy = tmp.path().join("policy.txt");
        std::fs::write(&policy, "Remote work is allowed two days a week.").unwrap();
        engine.ingest_documents(&[policy], &NoProgress).await.unwrap();

        let response = engine.process_query(HYBRID_COUNT, 5).await.unwrap();
        assert_eq!(response.query_type, QueryType::Hybrid);
        assert!(response.results[0].contains_key("total"));
        assert_eq!(response.sources.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_document_path_fails_whole_query() {
        let engine = seeded_engine_with(Arc::new(UnavailableProvider)).await;
        engine
            .index
            .add(
                vec![vec![0.0; 4]],
                vec![DocumentChunk {
                    chunk_id: "policy-0".into(),
                    document_id: "policy.txt".into(),
                    content: "Remote work is allowed two days a week.".into(),
                    metadata: BTreeMap::new(),
                }],
            )
            .unwrap();

        let err = engine.process_query(HYBRID_COUNT, 5).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Embedding);
        assert!(engine.cache.is_empty());
        assert!(engine.get_history().is_empty());
    }

    #[tokio::test]
    async fn test_reingest_keeps_index_size() {
        let engine = seeded_engine().await;
        let tmp = tempfile::TempDir::new().unwrap();
        let policy = tmp.path().join("policy.txt");
        std::fs::write(&policy, "Remote work is allowed two days a week.").unwrap();

        engine.ingest_documents(&[policy.clone()], &NoProgress).await.unwrap();
        let size = engine.index_size();
        engine.ingest_documents(&[policy], &NoProgress).await.unwrap();
        assert_eq!(engine.index_size(), size);

        let response = engine.process_query("what does the policy say", 5).await.unwrap();
        let ids: Vec<_> = response.sources.unwrap().into_iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec!["policy-0"]);
    }

    #[tokio::test]
    async fn test_empty_index_falls_back_to_classifier_label() {
        let engine = seeded_engine().await;
        let response = engine
            .process_query("what does the pdf say", 5)
            .await
            .unwrap();
        assert_eq!(response.query_type, QueryType::Document);
        assert!(response.results.is_empty());
        assert!(response.sources.is_none());
        assert_eq!(response.metrics.doc_index_size, 0);
    }

    #[tokio::test]
    async fn test_document_query_after_ingest() {
        let engine = seeded_engine().await;
        let tmp = tempfile::TempDir::new().unwrap();
        let resume = tmp.path().join("alice_resume.txt");
        std::fs::write(
            &resume,
            "Alice\n\nSkills\nPython, data engineering\n\nExperience\nBuilt ETL jobs",
        )
        .unwrap();

        let summary = engine.ingest_documents(&[resume], &NoProgress).await.unwrap();
        assert_eq!(summary.indexed, 1);
        assert_eq!(engine.index_size(), summary.vector_store_size);

        let response = engine
            .process_query("Find resumes mentioning Python skills", 3)
            .await
            .unwrap();
        assert_eq!(response.query_type, QueryType::Document);
        let sources = response.sources.unwrap();
        assert!(sources.iter().all(|c| c.document_id == "alice_resume.txt"));
        assert!(sources.iter().any(|c| c.content.contains("Python")));
    }

    #[tokio::test]
    async fn test_refresh_schema_is_idempotent() {
        let engine = seeded_engine().await;
        let before = engine.schema();
        let once = engine.refresh_schema().await.unwrap();
        let twice = engine.refresh_schema().await.unwrap();
        assert_eq!(*before, *once);
        assert_eq!(*once, *twice);
    }

    #[tokio::test]
    async fn test_execution_error_propagates() {
        let engine = seeded_engine().await;
        let err = engine
            .source
            .execute("SELECT * FROM missing_table", &Default::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
    }
}
