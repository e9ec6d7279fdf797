//! Retrieval and ranking core for grounded question answering over documentation.
//!
//! Chunks of crawled documentation are encoded with any
//! [`EmbeddingModel`](docqa_core::EmbeddingModel), stored in an HNSW index and persisted to
//! disk. A query goes through four stages:
//!
//! 1. [`Retriever::ann_search`] encodes the question and fetches `topk` candidates.
//! 2. [`Retriever::rerank`] scores them with a cross-encoder and keeps `topn`.
//! 3. [`filter_by_majority_product`] drops candidates from minority products.
//! 4. An [`AnswerGenerator`] writes the answer from what is left.
//!
//! [`QueryPipeline`] runs those stages and attaches deduplicated citations.
//! [`PipelineCell`] creates the pipeline on first use, building the index from chunk files
//! when nothing has been persisted yet.
//!
//! # Example
//!
//! ```rust,no_run
//! use docqa_core::{EmbeddingModel, LanguageModel, Reranker};
//! use docqa_rag::{ContextAnswerer, LazyReranker, PipelineCell, RagConfig};
//!
//! async fn ask<M, R, L>(model: M, reranker: R, chat: L) -> docqa_rag::Result<()>
//! where
//!     M: EmbeddingModel + Clone,
//!     R: Reranker,
//!     L: LanguageModel + Clone,
//! {
//!     let cell = PipelineCell::new(
//!         RagConfig::default(),
//!         model,
//!         LazyReranker::ready(reranker),
//!         ContextAnswerer::new(chat),
//!     );
//!     let answer = cell.ask("Which port does the console use?").await?;
//!     println!("{}", answer.answer);
//!     for source in &answer.sources {
//!         println!("  {}", source.url);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod consistency;
pub mod dedup;
pub mod encoder;
pub mod error;
pub mod generate;
pub mod index;
pub mod indexing;
pub mod ingest;
pub mod persistence;
pub mod pipeline;
pub mod retriever;
pub mod types;

pub use config::{RagConfig, RagConfigBuilder};
pub use consistency::{filter_by_majority_product, majority_product};
pub use encoder::VectorEncoder;
pub use error::{RagError, Result};
pub use generate::{AnswerGenerator, ContextAnswerer, NO_ANSWER};
pub use index::{AnnIndex, HnswParams, SENTINEL_SLOT, SearchResults};
pub use indexing::{
    BuildReport, IndexProgress, IndexStage, build_from_chunks, build_from_chunks_with_progress,
};
pub use pipeline::{Answer, Bootstrap, ChunksOnDisk, PipelineCell, QueryPipeline};
pub use retriever::{LazyReranker, Retriever};
pub use types::{Chunk, ChunkMeta, SearchHit, Source};
