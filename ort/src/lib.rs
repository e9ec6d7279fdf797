//! Local ONNX Runtime cross-encoder reranking for docqa.
//!
//! This crate provides [`OrtReranker`], an implementation of [`docqa_core::Reranker`] that
//! runs a sequence-classification model (for example `BAAI/bge-reranker-base` exported to
//! ONNX) over `(query, passage)` pairs and returns the raw relevance logit of each pair.
//!
//! # Features
//!
//! - **No auto-download**: you provide the model and tokenizer paths
//! - **Batched scoring**: pairs are padded to the longest member of each batch
//! - **GPU acceleration**: CUDA and `CoreML` enabled by default
//!
//! # Example
//!
//! ```rust,no_run
//! use docqa_ort::OrtReranker;
//! use docqa_core::Reranker;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Auto-finds model.onnx and tokenizer.json
//! let reranker = OrtReranker::from_directory("./models/bge-reranker-base")?;
//! let scores = reranker
//!     .score("how do I rotate keys?", &["Rotating keys: run ...", "Pricing tiers"])
//!     .await?;
//! assert_eq!(scores.len(), 2);
//! # Ok(())
//! # }
//! ```

mod error;

pub use error::OrtError;

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use docqa_core::Reranker;
use ndarray::ArrayD;
use ort::session::{Session, SessionInputValue, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};

/// Default number of pairs sent through the model in one run.
pub const DEFAULT_BATCH_SIZE: usize = 16;

/// Default token budget per `(query, passage)` pair.
pub const DEFAULT_MAX_LENGTH: usize = 512;

/// A cross-encoder reranker backed by ONNX Runtime.
///
/// ```rust,no_run
/// use docqa_ort::OrtReranker;
///
/// // Simple: load from directory
/// let reranker = OrtReranker::from_directory("./model")?;
///
/// // Custom: use builder
/// let reranker = OrtReranker::builder()
///     .model_path("./model/model.onnx")
///     .tokenizer_path("./model/tokenizer.json")
///     .batch_size(8)
///     .build()?;
/// # Ok::<(), docqa_ort::OrtError>(())
/// ```
pub struct OrtReranker {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    wants_token_types: bool,
    batch_size: usize,
}

impl std::fmt::Debug for OrtReranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtReranker")
            .field("wants_token_types", &self.wants_token_types)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl OrtReranker {
    /// Load a cross-encoder from a directory.
    ///
    /// Locates `model.onnx` (or files in an `onnx/` subdirectory) and `tokenizer.json`
    /// within the specified directory.
    ///
    /// # Errors
    /// Returns an error if the model or tokenizer cannot be found or loaded.
    pub fn from_directory(path: impl AsRef<Path>) -> Result<Self, OrtError> {
        let dir = path.as_ref();
        let model_path = find_model_file(dir)?;
        let tokenizer_path = find_tokenizer_file(dir)?;

        Self::builder()
            .model_path(model_path)
            .tokenizer_path(tokenizer_path)
            .build()
    }

    /// Create a builder for custom configuration.
    #[must_use]
    pub fn builder() -> OrtRerankerBuilder {
        OrtRerankerBuilder::default()
    }

    /// Returns how many pairs are scored per model run.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Scores one batch of pairs; the output has one logit per pair.
    fn score_batch(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, OrtError> {
        let pairs: Vec<(&str, &str)> = passages.iter().map(|passage| (query, *passage)).collect();
        let encodings = self
            .tokenizer
            .encode_batch(pairs, true)
            .map_err(|e| OrtError::Tokenization(e.to_string()))?;

        let rows = encodings.len();
        let seq_len = encodings.first().map_or(0, tokenizers::Encoding::len);
        let mut input_ids = Vec::with_capacity(rows * seq_len);
        let mut attention_mask = Vec::with_capacity(rows * seq_len);
        let mut token_type_ids = Vec::with_capacity(rows * seq_len);
        for encoding in &encodings {
            if encoding.len() != seq_len {
                return Err(OrtError::Shape(format!(
                    "unpadded batch: {} tokens vs {seq_len}",
                    encoding.len()
                )));
            }
            input_ids.extend(encoding.get_ids().iter().map(|&id| i64::from(id)));
            attention_mask.extend(encoding.get_attention_mask().iter().map(|&m| i64::from(m)));
            token_type_ids.extend(encoding.get_type_ids().iter().map(|&t| i64::from(t)));
        }

        let mut inputs: Vec<(Cow<'_, str>, SessionInputValue<'_>)> = ort::inputs![
            "input_ids" => Tensor::from_array(([rows, seq_len], input_ids.into_boxed_slice()))?,
            "attention_mask" => Tensor::from_array(([rows, seq_len], attention_mask.into_boxed_slice()))?,
        ];
        if self.wants_token_types {
            let tensor = Tensor::from_array(([rows, seq_len], token_type_ids.into_boxed_slice()))?;
            inputs.push(("token_type_ids".into(), tensor.into()));
        }

        // Copy logits out before releasing the session lock
        let logits: ArrayD<f32> = {
            let mut session = self.session.lock().map_err(|_| OrtError::SessionPoisoned)?;
            let outputs = session.run(inputs)?;
            let logits = outputs
                .get("logits")
                .or_else(|| outputs.get("output"))
                .ok_or(OrtError::MissingLogits)?;
            logits.try_extract_array::<f32>()?.to_owned()
        };

        first_logit_per_row(&logits, rows)
    }
}

impl Reranker for OrtReranker {
    async fn score(&self, query: &str, passages: &[&str]) -> docqa_core::Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(passages.len());
        for batch in passages.chunks(self.batch_size) {
            scores.extend(self.score_batch(query, batch)?);
        }
        tracing::debug!(pairs = passages.len(), "cross-encoder scored");
        Ok(scores)
    }
}

/// Builder for [`OrtReranker`].
#[derive(Debug)]
pub struct OrtRerankerBuilder {
    model_path: Option<PathBuf>,
    tokenizer_path: Option<PathBuf>,
    batch_size: usize,
    max_length: usize,
}

impl Default for OrtRerankerBuilder {
    fn default() -> Self {
        Self {
            model_path: None,
            tokenizer_path: None,
            batch_size: DEFAULT_BATCH_SIZE,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

impl OrtRerankerBuilder {
    /// Set the path to the ONNX model file.
    #[must_use]
    pub fn model_path(mut self, path: impl AsRef<Path>) -> Self {
        self.model_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the path to the tokenizer.json file.
    #[must_use]
    pub fn tokenizer_path(mut self, path: impl AsRef<Path>) -> Self {
        self.tokenizer_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Pairs per model run. Zero is treated as one.
    #[must_use]
    pub const fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = if size == 0 { 1 } else { size };
        self
    }

    /// Token budget per pair; longer pairs are truncated from the passage side.
    #[must_use]
    pub const fn max_length(mut self, tokens: usize) -> Self {
        self.max_length = tokens;
        self
    }

    /// Build the [`OrtReranker`] instance.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Model path is not specified
    /// - Model file cannot be loaded
    /// - Tokenizer file cannot be loaded or configured
    pub fn build(self) -> Result<OrtReranker, OrtError> {
        let model_path = self.model_path.ok_or(OrtError::MissingModelPath)?;
        if !model_path.exists() {
            return Err(OrtError::ModelNotFound(model_path));
        }

        let tokenizer_path = self.tokenizer_path.ok_or_else(|| {
            OrtError::TokenizerNotFound(model_path.parent().unwrap_or(&model_path).to_path_buf())
        })?;
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| OrtError::tokenizer(&tokenizer_path, e))?;
        tokenizer.with_padding(Some(PaddingParams::default()));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: self.max_length,
                strategy: tokenizers::TruncationStrategy::OnlySecond,
                ..TruncationParams::default()
            }))
            .map_err(|e| OrtError::tokenizer(&tokenizer_path, e))?;

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_cpus())?
            .commit_from_file(&model_path)?;

        let wants_token_types = session
            .inputs()
            .iter()
            .any(|input| input.name() == "token_type_ids");
        tracing::info!(
            model = %model_path.display(),
            wants_token_types,
            "loaded cross-encoder"
        );

        Ok(OrtReranker {
            session: Mutex::new(session),
            tokenizer,
            wants_token_types,
            batch_size: self.batch_size,
        })
    }
}

/// Reads column 0 of a `[rows, labels]` or `[rows]` logit tensor.
fn first_logit_per_row(logits: &ArrayD<f32>, rows: usize) -> Result<Vec<f32>, OrtError> {
    let flat: Vec<f32> = logits.iter().copied().collect();
    if rows == 0 {
        return Ok(Vec::new());
    }
    if flat.is_empty() || flat.len() % rows != 0 {
        return Err(OrtError::Shape(format!(
            "{} logits for {rows} pairs",
            flat.len()
        )));
    }
    let per_row = flat.len() / rows;
    Ok(flat.chunks(per_row).map(|row| row[0]).collect())
}

/// Find the ONNX model file in a directory.
fn find_model_file(dir: &Path) -> Result<PathBuf, OrtError> {
    let candidates = [
        dir.join("model.onnx"),
        dir.join("onnx/model.onnx"),
        dir.join("onnx/model_fp32.onnx"),
        dir.join("onnx/model_fp16.onnx"),
        dir.join("onnx/model_quantized.onnx"),
    ];

    for candidate in &candidates {
        if candidate.exists() {
            return Ok(candidate.clone());
        }
    }

    // Any .onnx file, top level first
    for search_dir in [dir.to_path_buf(), dir.join("onnx")] {
        if let Ok(entries) = std::fs::read_dir(&search_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "onnx") {
                    return Ok(path);
                }
            }
        }
    }

    Err(OrtError::ModelNotFound(dir.to_path_buf()))
}

/// Find the tokenizer.json file in a directory.
fn find_tokenizer_file(dir: &Path) -> Result<PathBuf, OrtError> {
    let candidates = [dir.join("tokenizer.json"), dir.join("onnx/tokenizer.json")];

    for candidate in &candidates {
        if candidate.exists() {
            return Ok(candidate.clone());
        }
    }

    Err(OrtError::TokenizerNotFound(dir.to_path_buf()))
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(4)
}
