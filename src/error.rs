//! Typed failures surfaced by the retrieval engine.
//!
//! Every failure the core can raise is an [`EngineError`], and every
//! [`EngineError`] answers [`EngineError::kind`] so the transport layer can
//! map it to a client-facing status without string matching.
//!
//! "No SQL plan could be produced" is deliberately *not* an error: the
//! synthesizers return `Option::None` and the document path still runs.

use thiserror::Error;

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required capability is missing or misconfigured.
    Configuration,
    /// The relational data source could not be reached.
    Connection,
    /// An embedding width does not match the vector index dimension.
    DimensionMismatch,
    /// The data source rejected a synthesized statement.
    Execution,
    /// Malformed caller input.
    Validation,
    /// The embedding capability failed.
    Embedding,
    /// A source document could not be read or decoded.
    Extraction,
}

impl ErrorKind {
    /// Stable snake_case code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration_error",
            ErrorKind::Connection => "connection_error",
            ErrorKind::DimensionMismatch => "dimension_mismatch",
            ErrorKind::Execution => "execution_error",
            ErrorKind::Validation => "validation_error",
            ErrorKind::Embedding => "embedding_error",
            ErrorKind::Extraction => "extraction_error",
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("execution error: {0}")]
    Execution(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to extract {path}: {message}")]
    Extraction { path: String, message: String },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Configuration(_) => ErrorKind::Configuration,
            EngineError::Connection(_) => ErrorKind::Connection,
            EngineError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            EngineError::Execution(_) => ErrorKind::Execution,
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Embedding(_) => ErrorKind::Embedding,
            EngineError::Io { .. } | EngineError::Extraction { .. } => ErrorKind::Extraction,
        }
    }
}

/// Maps driver failures onto the engine taxonomy.
///
/// Pool, socket, TLS and URL problems mean the source is unreachable;
/// everything else is the database refusing the statement.
impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => EngineError::Connection(err.to_string()),
            other => EngineError::Execution(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
