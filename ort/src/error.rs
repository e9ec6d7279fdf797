//! Error types for the ONNX Runtime reranker crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading or running an ONNX cross-encoder.
#[derive(Debug, Error)]
pub enum OrtError {
    /// Failed to load or run the ONNX model.
    #[error("onnx runtime error: {0}")]
    Ort(ort::Error),

    /// Failed to load the tokenizer.
    #[error("failed to load tokenizer from {path}: {message}")]
    Tokenizer {
        /// Path to the tokenizer file.
        path: PathBuf,
        /// Error message from tokenizers crate.
        message: String,
    },

    /// Model path was not specified in the builder.
    #[error("model path not specified")]
    MissingModelPath,

    /// Tokenizer file not found in the model directory.
    #[error("tokenizer.json not found in {0}")]
    TokenizerNotFound(PathBuf),

    /// Model file not found in the specified path.
    #[error("model file not found: {0}")]
    ModelNotFound(PathBuf),

    /// The model produced no `logits` output.
    #[error("model has no logits output")]
    MissingLogits,

    /// A previous inference panicked while holding the session.
    #[error("onnx session lock poisoned")]
    SessionPoisoned,

    /// Tokenization failed.
    #[error("tokenization failed: {0}")]
    Tokenization(String),

    /// Tensor shape did not match the batch.
    #[error("shape error: {0}")]
    Shape(String),
}

impl From<ort::Error> for OrtError {
    fn from(e: ort::Error) -> Self {
        Self::Ort(e)
    }
}

impl OrtError {
    /// Creates a tokenizer error from a path and error message.
    pub fn tokenizer(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Tokenizer {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
