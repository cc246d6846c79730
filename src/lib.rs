//! # hybridq
//!
//! Hybrid natural-language retrieval over a previously unseen relational
//! database and a corpus of uploaded documents.
//!
//! Each query is classified, then answered by synthesizing SQL against the
//! introspected schema, by nearest-neighbor search over embedded document
//! chunks, or by both, with results merged, cached and logged.
//!
//! ## Architecture
//!
//! ```text
//!              ┌────────────┐
//!  query ────▶ │ Classifier │
//!              └─────┬──────┘
//!          ┌─────────┴──────────┐
//!          ▼                    ▼
//!  ┌───────────────┐    ┌───────────────┐
//!  │ Schema mapper │    │ Embedding     │
//!  │ + SQL synth   │    │ + VectorIndex │
//!  └───────┬───────┘    └───────┬───────┘
//!          ▼                    ▼
//!  ┌───────────────┐    ┌───────────────┐
//!  │  DataSource   │    │   Chunks      │
//!  └───────┬───────┘    └───────┬───────┘
//!          └─────────┬──────────┘
//!                    ▼
//!          merge → cache → history
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed engine failures |
//! | [`models`] | Core data types |
//! | [`db`] | SQLite pool construction |
//! | [`datasource`] | Relational source trait and SQLite implementation |
//! | [`schema`] | Schema introspection and synonym mapping |
//! | [`classifier`] | Query-type classification |
//! | [`sql`] | Heuristic and LLM SQL generation |
//! | [`extract`] | Text extraction from PDF, DOCX, JSON and text files |
//! | [`chunk`] | Content-aware chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_index`] | In-memory nearest-neighbor index |
//! | [`ingest`] | Document ingestion pipeline |
//! | [`progress`] | Ingestion progress reporting |
//! | [`jobs`] | Background ingestion job tracking |
//! | [`cache`] | TTL result cache |
//! | [`history`] | Query history |
//! | [`engine`] | Per-connection orchestrator |
//! | [`registry`] | Engines keyed by connection string |
//! | [`sanitize`] | Query input hygiene |
//! | [`server`] | JSON HTTP API |
//! | [`commands`] | CLI subcommands |
//! | [`logging`] | Tracing subscriber setup |

pub mod cache;
pub mod chunk;
pub mod classifier;
pub mod commands;
pub mod config;
pub mod datasource;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod history;
pub mod ingest;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod progress;
pub mod registry;
pub mod sanitize;
pub mod schema;
pub mod server;
pub mod sql;
pub mod vector_index;
