//! Candidate retrieval and cross-encoder reranking.

use std::sync::Arc;

use async_lock::OnceCell;
use docqa_core::{EmbeddingModel, Reranker};
use ordered_float::OrderedFloat;

use crate::encoder::VectorEncoder;
use crate::error::{RagError, Result};
use crate::index::{AnnIndex, SENTINEL_SLOT};
use crate::types::SearchHit;

type RerankerInit<R> = Box<dyn Fn() -> anyhow::Result<R> + Send + Sync>;

/// A reranker constructed on first use.
///
/// Loading a cross-encoder is slow, so it is deferred until a query actually has candidates
/// to rerank. Concurrent first callers wait for one construction; a failed construction is
/// not cached and the next caller tries again.
pub struct LazyReranker<R> {
    cell: OnceCell<R>,
    init: Option<RerankerInit<R>>,
}

impl<R> std::fmt::Debug for LazyReranker<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyReranker")
            .field("initialized", &self.cell.is_initialized())
            .finish_non_exhaustive()
    }
}

impl<R: Reranker> LazyReranker<R> {
    /// Defers construction to `init`.
    ///
    /// `init` runs synchronously on the task that first calls [`get`](Self::get); callers
    /// on an async runtime should move heavy loading off the executor inside `init`.
    pub fn new<F>(init: F) -> Self
    where
        F: Fn() -> anyhow::Result<R> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            init: Some(Box::new(init)),
        }
    }

    /// Wraps an already constructed reranker.
    pub fn ready(reranker: R) -> Self {
        Self {
            cell: OnceCell::from(reranker),
            init: None,
        }
    }

    /// Returns `true` once the reranker exists.
    pub fn is_initialized(&self) -> bool {
        self.cell.is_initialized()
    }

    /// Returns the reranker, constructing it if needed.
    ///
    /// # Errors
    /// [`RagError::Service`] if construction fails.
    pub async fn get(&self) -> Result<&R> {
        self.cell
            .get_or_try_init(|| async {
                let init = self
                    .init
                    .as_ref()
                    .ok_or_else(|| RagError::Service(anyhow::anyhow!("reranker unavailable")))?;
                tracing::info!("initializing reranker");
                init().map_err(RagError::Service)
            })
            .await
    }
}

/// Encoder plus index for first-pass search, plus a reranker for the second pass.
pub struct Retriever<M, R> {
    encoder: VectorEncoder<M>,
    index: Arc<AnnIndex>,
    reranker: Arc<LazyReranker<R>>,
}

impl<M, R> std::fmt::Debug for Retriever<M, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("index", &self.index)
            .field("reranker", &self.reranker)
            .finish_non_exhaustive()
    }
}

impl<M: EmbeddingModel, R: Reranker> Retriever<M, R> {
    /// Creates a retriever over a loaded index.
    pub fn new(
        encoder: VectorEncoder<M>,
        index: Arc<AnnIndex>,
        reranker: impl Into<Arc<LazyReranker<R>>>,
    ) -> Self {
        Self {
            encoder,
            index,
            reranker: reranker.into(),
        }
    }

    /// Returns the index.
    #[must_use]
    pub fn index(&self) -> &AnnIndex {
        &self.index
    }

    /// Returns the reranker handle.
    #[must_use]
    pub fn reranker(&self) -> &LazyReranker<R> {
        &self.reranker
    }

    /// Encodes `query` and returns up to `topk` hits in similarity order.
    ///
    /// Sentinel and out-of-range slots are dropped; `rank` keeps the raw result position.
    ///
    /// # Errors
    /// Encoder errors, or [`RagError::DimensionMismatch`] when the query width differs from
    /// the index (the index was built with another embedding model and must be rebuilt).
    pub async fn ann_search(&self, query: &str, topk: usize) -> Result<Vec<SearchHit>> {
        let vector = self.encoder.embed_one(query).await?;
        let results = self.index.search(&vector, topk)?;

        let mut hits = Vec::with_capacity(results.len());
        let mut dropped = 0usize;
        for (rank, slot) in results.slots.iter().copied().enumerate() {
            match (self.index.chunk(slot), usize::try_from(slot)) {
                (Some(chunk), Ok(slot)) => hits.push(SearchHit {
                    slot,
                    rank,
                    similarity: results.similarities[rank],
                    rerank_score: None,
                    chunk: chunk.clone(),
                }),
                _ if slot == SENTINEL_SLOT => {}
                _ => dropped += 1,
            }
        }
        if dropped > 0 {
            tracing::warn!(dropped, "dropped out-of-range slots");
        }
        tracing::debug!(hits = hits.len(), topk, "ann search");
        Ok(hits)
    }

    /// Scores each hit against `query`, sorts by score descending and keeps `topn`.
    ///
    /// The sort is stable, so equal scores keep their `ann_search` order. An empty input
    /// returns immediately without touching the reranker.
    ///
    /// # Errors
    /// [`RagError::Service`] if the reranker cannot be built or fails, [`RagError::Shape`]
    /// if it returns the wrong number of scores.
    pub async fn rerank(
        &self,
        query: &str,
        mut hits: Vec<SearchHit>,
        topn: usize,
    ) -> Result<Vec<SearchHit>> {
        if hits.is_empty() {
            return Ok(hits);
        }
        let reranker = self.reranker.get().await?;
        let passages: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        let scores = reranker
            .score(query, &passages)
            .await
            .map_err(RagError::Service)?;
        if scores.len() != hits.len() {
            return Err(RagError::Shape(format!(
                "reranker returned {} scores for {} passages",
                scores.len(),
                hits.len()
            )));
        }

        for (hit, score) in hits.iter_mut().zip(scores) {
            hit.rerank_score = Some(score);
        }
        hits.sort_by_key(|hit| {
            let score = hit.rerank_score.filter(|s| !s.is_nan());
            std::cmp::Reverse(OrderedFloat(score.unwrap_or(f32::NEG_INFINITY)))
        });
        hits.truncate(topn);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::l2_normalize;
    use crate::index::HnswParams;
    use crate::types::Chunk;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Maps a query word to a fixed axis.
    struct Axis;

    impl EmbeddingModel for Axis {
        fn dim(&self) -> usize {
            3
        }

        async fn embed(&self, text: &str) -> docqa_core::Result<Vec<f32>> {
            Ok(match text {
                "x" => vec![1.0, 0.0, 0.0],
                "y" => vec![0.0, 1.0, 0.0],
                _ => vec![0.0, 0.0, 1.0],
            })
        }
    }

    /// Scores a passage by its length.
    struct ByLength {
        calls: AtomicUsize,
    }

    #[allow(clippy::cast_precision_loss)]
    impl Reranker for ByLength {
        async fn score(&self, _query: &str, passages: &[&str]) -> docqa_core::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(passages.iter().map(|p| p.len() as f32).collect())
        }
    }

    struct Constant;

    impl Reranker for Constant {
        async fn score(&self, _query: &str, passages: &[&str]) -> docqa_core::Result<Vec<f32>> {
            Ok(vec![1.0; passages.len()])
        }
    }

    fn index(n: usize) -> Arc<AnnIndex> {
        #[allow(clippy::cast_precision_loss)]
        let vectors = (0..n)
            .map(|i| {
                let mut v = vec![1.0, i as f32 * 0.1, 0.0];
                l2_normalize(&mut v);
                v
            })
            .collect();
        let chunks = (0..n)
            .map(|i| Chunk::new(format!("c{i}"), "t".repeat(i + 1)))
            .collect();
        Arc::new(AnnIndex::build(vectors, chunks, HnswParams::default()).unwrap())
    }

    fn hit(slot: usize, text: &str) -> SearchHit {
        SearchHit {
            slot,
            rank: slot,
            similarity: 0.0,
            rerank_score: None,
            chunk: Chunk::new(format!("c{slot}"), text),
        }
    }

    #[tokio::test]
    async fn ann_search_yields_only_valid_slots() {
        let retriever = Retriever::new(
            VectorEncoder::new(Axis),
            index(4),
            LazyReranker::ready(Constant),
        );
        let hits = retriever.ann_search("x", 10).await.unwrap();
        assert_eq!(hits.len(), 4);
        assert_eq!(hits[0].slot, 0);
        assert!(hits.iter().all(|h| h.slot < 4));
        let ranks: Vec<_> = hits.iter().map(|h| h.rank).collect();
        assert_eq!(ranks, [0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn rerank_empty_skips_model_construction() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let retriever = Retriever::new(
            VectorEncoder::new(Axis),
            index(2),
            LazyReranker::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Constant)
            }),
        );
        let out = retriever.rerank("x", Vec::new(), 3).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(built.load(Ordering::SeqCst), 0);
        assert!(!retriever.reranker().is_initialized());
    }

    #[tokio::test]
    async fn rerank_sorts_and_truncates() {
        let retriever = Retriever::new(
            VectorEncoder::new(Axis),
            index(1),
            LazyReranker::ready(ByLength {
                calls: AtomicUsize::new(0),
            }),
        );
        let hits = vec![hit(0, "aa"), hit(1, "aaaa"), hit(2, "a"), hit(3, "aaa")];
        let out = retriever.rerank("q", hits, 3).await.unwrap();
        let slots: Vec<_> = out.iter().map(|h| h.slot).collect();
        assert_eq!(slots, [1, 3, 0]);
        assert_eq!(out[0].rerank_score, Some(4.0));
    }

    #[tokio::test]
    async fn rerank_is_stable_and_idempotent() {
        let retriever = Retriever::new(
            VectorEncoder::new(Axis),
            index(1),
            LazyReranker::ready(Constant),
        );
        let hits = vec![hit(5, "a"), hit(2, "b"), hit(9, "c")];
        let once = retriever.rerank("q", hits, 10).await.unwrap();
        let slots: Vec<_> = once.iter().map(|h| h.slot).collect();
        assert_eq!(slots, [5, 2, 9]);
        let twice = retriever.rerank("q", once.clone(), 10).await.unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn reranker_built_once() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let lazy = Arc::new(LazyReranker::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ByLength {
                calls: AtomicUsize::new(0),
            })
        }));
        let retriever = Retriever::new(VectorEncoder::new(Axis), index(1), Arc::clone(&lazy));

        let (a, b) = tokio::join!(
            retriever.rerank("q", vec![hit(0, "a")], 3),
            retriever.rerank("q", vec![hit(1, "bb")], 3),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.get().await.unwrap().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_init_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let lazy = LazyReranker::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("model files still downloading");
            }
            Ok(Constant)
        });
        assert!(matches!(lazy.get().await, Err(RagError::Service(_))));
        assert!(lazy.get().await.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
