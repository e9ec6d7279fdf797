//! Error types for the retrieval core.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building, loading or querying the index.
#[derive(Debug, Error)]
pub enum RagError {
    /// An external model (embedding, reranker, chat) failed or was unreachable.
    #[error("service unavailable: {0}")]
    Service(#[source] anyhow::Error),

    /// Encoder output had an unusable shape.
    #[error("shape error: {0}")]
    Shape(String),

    /// Dimension mismatch between a query vector and the index.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension provided.
        actual: usize,
    },

    /// Index and metadata disagree, or an artifact is corrupt.
    #[error("index integrity error: {0}")]
    IndexIntegrity(String),

    /// Index artifacts or chunk files are missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// A chunk file line could not be parsed.
    #[error("malformed chunk at {path}:{line}: {message}")]
    MalformedChunk {
        /// Chunk file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Parser message.
        message: String,
    },

    /// Persistence operation failed.
    #[error("persistence error at {path}: {source}")]
    Persistence {
        /// Path where the error occurred.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// IO operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration value out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The question was rejected before any work was done.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl RagError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` when the error means "nothing has been built yet".
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
