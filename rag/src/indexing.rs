//! Building the persisted index from chunk files, with progress tracking.

use std::collections::HashSet;

use docqa_core::EmbeddingModel;

use crate::config::RagConfig;
use crate::dedup::ContentKey;
use crate::encoder::VectorEncoder;
use crate::error::{RagError, Result};
use crate::index::AnnIndex;
use crate::{ingest, persistence};

/// Progress update during an index build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexProgress {
    /// Units finished in the current stage.
    pub processed: usize,
    /// Units in the current stage.
    pub total: usize,
    /// Current stage.
    pub stage: IndexStage,
}

impl IndexProgress {
    /// Creates a new progress update.
    #[must_use]
    pub const fn new(processed: usize, total: usize, stage: IndexStage) -> Self {
        Self {
            processed,
            total,
            stage,
        }
    }
}

/// Stages of an index build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStage {
    /// Reading chunk files.
    Loading,
    /// Encoding chunk text; `processed`/`total` count chunks.
    Embedding,
    /// Building the HNSW graph.
    Building,
    /// Writing artifacts.
    Saving,
    /// Build completed successfully.
    Done,
}

/// Outcome of a successful build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    /// Chunks in the new index.
    pub chunks: usize,
    /// Exact duplicates skipped.
    pub duplicates: usize,
    /// Vector width.
    pub dimension: usize,
}

/// Builds and saves the index from `config.chunks_dir` into `config.index_dir`.
///
/// # Errors
/// See [`build_from_chunks_with_progress`].
pub async fn build_from_chunks<M: EmbeddingModel>(
    encoder: &VectorEncoder<M>,
    config: &RagConfig,
) -> Result<BuildReport> {
    build_from_chunks_with_progress(encoder, config, |_| {}).await
}

/// Builds and saves the index, reporting each stage to `on_progress`.
///
/// Exact duplicate content is indexed once, keeping the first occurrence.
///
/// # Errors
/// - [`RagError::NotFound`] when there are no chunks
/// - [`RagError::MalformedChunk`] for an unparsable chunk line
/// - encoder, index and persistence errors unchanged
pub async fn build_from_chunks_with_progress<M, F>(
    encoder: &VectorEncoder<M>,
    config: &RagConfig,
    mut on_progress: F,
) -> Result<BuildReport>
where
    M: EmbeddingModel,
    F: FnMut(IndexProgress) + Send,
{
    config.validate()?;
    on_progress(IndexProgress::new(0, 0, IndexStage::Loading));

    let rows = ingest::load_chunks(&config.chunks_dir)?;
    if rows.is_empty() {
        return Err(RagError::NotFound(format!(
            "no chunks found in {}; run crawler and preprocess first",
            config.chunks_dir.display()
        )));
    }

    let total_rows = rows.len();
    let mut seen = HashSet::with_capacity(total_rows);
    let chunks: Vec<_> = rows
        .into_iter()
        .filter(|chunk| seen.insert(ContentKey::of(chunk)))
        .collect();
    let duplicates = total_rows - chunks.len();
    if duplicates > 0 {
        tracing::info!(duplicates, kept = chunks.len(), "skipped duplicate chunks");
    }

    let total = chunks.len();
    on_progress(IndexProgress::new(0, total, IndexStage::Embedding));
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    let vectors = encoder
        .embed_with_progress(&texts, |done, total| {
            on_progress(IndexProgress::new(done, total, IndexStage::Embedding));
        })
        .await?;

    on_progress(IndexProgress::new(0, total, IndexStage::Building));
    let index = AnnIndex::build(vectors, chunks, config.hnsw_params())?;

    on_progress(IndexProgress::new(total, total, IndexStage::Saving));
    persistence::save(&index, &config.index_dir)?;

    on_progress(IndexProgress::new(total, total, IndexStage::Done));
    tracing::info!(chunks = total, dimension = index.dimension(), "index built");

    Ok(BuildReport {
        chunks: total,
        duplicates,
        dimension: index.dimension(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    struct Letters;

    #[allow(clippy::cast_precision_loss)]
    impl EmbeddingModel for Letters {
        fn dim(&self) -> usize {
            4
        }

        async fn embed(&self, text: &str) -> docqa_core::Result<Vec<f32>> {
            let count = |c: char| text.matches(c).count() as f32;
            Ok(vec![count('a'), count('e'), count('o'), 1.0])
        }
    }

    fn config_in(dir: &std::path::Path) -> RagConfig {
        RagConfig::builder()
            .index_dir(dir.join("index"))
            .chunks_dir(dir.join("chunks"))
            .embed_batch_size(2)
            .build()
    }

    #[tokio::test]
    async fn builds_dedups_and_reports_progress() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        fs::create_dir_all(&config.chunks_dir).unwrap();
        fs::write(
            config.chunks_dir.join("ksc.jsonl"),
            [
                r#"{"id": "a", "text": "banana", "meta": {"sha256": "h1"}}"#,
                r#"{"id": "b", "text": "orange", "meta": {"sha256": "h2"}}"#,
                r#"{"id": "c", "text": "banana again", "meta": {"sha256": "h1"}}"#,
                r#"{"id": "d", "text": "apple"}"#,
            ]
            .join("\n"),
        )
        .unwrap();

        let mut stages = Vec::new();
        let encoder = VectorEncoder::new(Letters).with_batch_size(config.embed_batch_size);
        let report = build_from_chunks_with_progress(&encoder, &config, |p| stages.push(p))
            .await
            .unwrap();

        assert_eq!(
            report,
            BuildReport {
                chunks: 3,
                duplicates: 1,
                dimension: 4
            }
        );
        assert_eq!(stages.first().map(|p| p.stage), Some(IndexStage::Loading));
        assert_eq!(stages.last().map(|p| p.stage), Some(IndexStage::Done));
        assert!(stages.contains(&IndexProgress::new(2, 3, IndexStage::Embedding)));
        assert!(stages.contains(&IndexProgress::new(3, 3, IndexStage::Embedding)));

        let index = persistence::load(&config.index_dir, 64).unwrap();
        let ids: Vec<_> = index.chunks().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "d"]);
    }

    #[tokio::test]
    async fn no_chunks_is_not_found() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let err = build_from_chunks(&VectorEncoder::new(Letters), &config)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!persistence::artifacts_exist(&config.index_dir));
    }
}
