//! Question answering: search, rerank, filter, generate, cite.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use async_lock::OnceCell;
use docqa_core::{EmbeddingModel, Reranker};
use serde::Serialize;

use crate::config::RagConfig;
use crate::consistency::filter_by_majority_product;
use crate::encoder::VectorEncoder;
use crate::error::{RagError, Result};
use crate::generate::AnswerGenerator;
use crate::indexing::build_from_chunks;
use crate::retriever::{LazyReranker, Retriever};
use crate::types::{SearchHit, Source};
use crate::{ingest, persistence};

/// Longest accepted question, in characters.
pub const MAX_QUESTION_CHARS: usize = 512;

/// An answer with its citations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    /// Generated answer, or the no-answer sentinel.
    pub answer: String,
    /// Cited pages, one per distinct URL, in context order.
    pub sources: Vec<Source>,
    /// Slot ids of every context passage, in context order.
    pub used_chunks: Vec<usize>,
}

impl Answer {
    /// Splits into `(answer, sources, used_chunk_ids)`.
    #[must_use]
    pub fn into_parts(self) -> (String, Vec<Source>, Vec<usize>) {
        (self.answer, self.sources, self.used_chunks)
    }
}

/// Checks that a question is 1 to [`MAX_QUESTION_CHARS`] characters and not blank.
///
/// # Errors
/// [`RagError::InvalidInput`] otherwise.
pub fn validate_question(question: &str) -> Result<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(RagError::InvalidInput("question is empty".into()));
    }
    let chars = question.chars().count();
    if chars > MAX_QUESTION_CHARS {
        return Err(RagError::InvalidInput(format!(
            "question is {chars} characters, limit is {MAX_QUESTION_CHARS}"
        )));
    }
    Ok(trimmed)
}

/// The query path over one loaded index.
pub struct QueryPipeline<M, R, G> {
    retriever: Retriever<M, R>,
    generator: G,
    topk: usize,
    topn: usize,
}

impl<M, R, G> std::fmt::Debug for QueryPipeline<M, R, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPipeline")
            .field("retriever", &self.retriever)
            .field("topk", &self.topk)
            .field("topn", &self.topn)
            .finish_non_exhaustive()
    }
}

impl<M, R, G> QueryPipeline<M, R, G>
where
    M: EmbeddingModel,
    R: Reranker,
    G: AnswerGenerator,
{
    /// Assembles a pipeline using `config.topk` and `config.topn_context`.
    pub const fn new(retriever: Retriever<M, R>, generator: G, config: &RagConfig) -> Self {
        Self {
            retriever,
            generator,
            topk: config.topk,
            topn: config.topn_context,
        }
    }

    /// Returns the retriever.
    pub const fn retriever(&self) -> &Retriever<M, R> {
        &self.retriever
    }

    /// Answers `question`.
    ///
    /// A question with no matching passages still yields an answer (the generator's
    /// no-answer text) with empty sources and ids.
    ///
    /// # Errors
    /// [`RagError::InvalidInput`] for a rejected question; encoder, index, reranker and
    /// generator errors abort the call.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let question = validate_question(question)?;
        let hits = self.retriever.ann_search(question, self.topk).await?;
        let reranked = self.retriever.rerank(question, hits, self.topn).await?;
        let contexts = filter_by_majority_product(reranked);
        let answer = self.generator.generate(question, &contexts).await?;

        let answer = Answer {
            answer,
            sources: cite(&contexts),
            used_chunks: contexts.iter().map(|h| h.slot).collect(),
        };
        tracing::debug!(
            contexts = contexts.len(),
            sources = answer.sources.len(),
            "answered"
        );
        Ok(answer)
    }
}

/// One [`Source`] per distinct URL; the first hit with a URL supplies its headings.
fn cite(contexts: &[SearchHit]) -> Vec<Source> {
    let mut seen = HashSet::new();
    contexts
        .iter()
        .filter_map(Source::from_hit)
        .filter(|source| seen.insert(source.url.clone()))
        .collect()
}

/// Produces chunk files when none exist yet.
///
/// Crawling and chunking live outside this crate; implementations run them (or check
/// they have run) so that [`build_from_chunks`] has input.
pub trait Bootstrap: Send + Sync {
    /// Ensures `config.chunks_dir` holds chunk files.
    fn prepare(&self, config: &RagConfig) -> impl Future<Output = Result<()>> + Send;
}

/// Bootstrap that expects chunk files to already be on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunksOnDisk;

impl Bootstrap for ChunksOnDisk {
    async fn prepare(&self, config: &RagConfig) -> Result<()> {
        if ingest::list_chunk_files(&config.chunks_dir)?.is_empty() {
            return Err(RagError::NotFound(format!(
                "no chunk files in {}; run crawler and preprocess first",
                config.chunks_dir.display()
            )));
        }
        Ok(())
    }
}

/// A [`QueryPipeline`] created on first use.
///
/// The first caller loads the index, building it from chunk files when it is missing;
/// concurrent callers wait for that one initialization. The pipeline is published only
/// after a successful load, and a failed initialization is retried by the next caller.
pub struct PipelineCell<M, R, G, B = ChunksOnDisk> {
    config: Arc<RagConfig>,
    model: M,
    reranker: Arc<LazyReranker<R>>,
    generator: G,
    bootstrap: B,
    pipeline: OnceCell<QueryPipeline<M, R, G>>,
}

impl<M, R, G, B> std::fmt::Debug for PipelineCell<M, R, G, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCell")
            .field("config", &self.config)
            .field("ready", &self.pipeline.is_initialized())
            .finish_non_exhaustive()
    }
}

impl<M, R, G> PipelineCell<M, R, G, ChunksOnDisk>
where
    M: EmbeddingModel + Clone,
    R: Reranker,
    G: AnswerGenerator + Clone,
{
    /// Creates an uninitialized cell.
    pub fn new(
        config: RagConfig,
        model: M,
        reranker: impl Into<Arc<LazyReranker<R>>>,
        generator: G,
    ) -> Self {
        Self {
            config: Arc::new(config),
            model,
            reranker: reranker.into(),
            generator,
            bootstrap: ChunksOnDisk,
            pipeline: OnceCell::new(),
        }
    }
}

impl<M, R, G, B> PipelineCell<M, R, G, B>
where
    M: EmbeddingModel + Clone,
    R: Reranker,
    G: AnswerGenerator + Clone,
    B: Bootstrap,
{
    /// Replaces the bootstrap step.
    pub fn with_bootstrap<B2: Bootstrap>(self, bootstrap: B2) -> PipelineCell<M, R, G, B2> {
        PipelineCell {
            config: self.config,
            model: self.model,
            reranker: self.reranker,
            generator: self.generator,
            bootstrap,
            pipeline: self.pipeline,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Returns `true` once a pipeline has been published.
    pub fn is_ready(&self) -> bool {
        self.pipeline.is_initialized()
    }

    /// Returns the pipeline, loading or building the index on first use.
    ///
    /// # Errors
    /// Bootstrap, build and load errors; nothing is cached on failure.
    pub async fn get(&self) -> Result<&QueryPipeline<M, R, G>> {
        self.pipeline.get_or_try_init(|| self.initialize()).await
    }

    /// Answers `question` through the shared pipeline.
    ///
    /// # Errors
    /// See [`get`](Self::get) and [`QueryPipeline::ask`].
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        self.get().await?.ask(question).await
    }

    async fn initialize(&self) -> Result<QueryPipeline<M, R, G>> {
        self.config.validate()?;
        let encoder =
            VectorEncoder::new(self.model.clone()).with_batch_size(self.config.embed_batch_size);
        let ef_search = self.config.hnsw_params().ef_search;

        let index = match persistence::load(&self.config.index_dir, ef_search) {
            Ok(index) => index,
            Err(RagError::NotFound(reason)) => {
                tracing::info!(%reason, "index missing, bootstrapping");
                self.bootstrap.prepare(&self.config).await?;
                let report = build_from_chunks(&encoder, &self.config).await?;
                tracing::info!(chunks = report.chunks, "bootstrap finished");
                persistence::load(&self.config.index_dir, ef_search)?
            }
            Err(err) => return Err(err),
        };

        let retriever = Retriever::new(encoder, Arc::new(index), Arc::clone(&self.reranker));
        Ok(QueryPipeline::new(
            retriever,
            self.generator.clone(),
            &self.config,
        ))
    }
}
