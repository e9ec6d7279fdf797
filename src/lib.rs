#![no_std]
//! # docqa
//!
//! Facade crate for grounded question answering over documentation. It re-exports the
//! provider-neutral traits from [`docqa_core`] and, behind features, the retrieval core and
//! the provider crates.
//!
//! | Feature | Re-export | Contents |
//! |---------|-----------|----------|
//! | `rag` (default) | [`rag`] | HNSW index, reranking, consistency filter, query pipeline |
//! | `ollama` | `ollama` | Ollama HTTP client for embeddings and chat |
//! | `ort` | `ort` | ONNX Runtime cross-encoder reranker |
//!
//! ## Example
//!
//! ```rust,ignore
//! use docqa::ollama::Ollama;
//! use docqa::ort::OrtReranker;
//! use docqa::rag::{ContextAnswerer, LazyReranker, PipelineCell, RagConfig};
//!
//! async fn demo() -> anyhow::Result<()> {
//!     let ollama = Ollama::new()?;
//!     let cell = PipelineCell::new(
//!         RagConfig::default(),
//!         ollama.clone(),
//!         LazyReranker::new(|| Ok(OrtReranker::from_directory("models/bge-reranker-base")?)),
//!         ContextAnswerer::new(ollama),
//!     );
//!     let answer = cell.ask("How do I reset the agent password?").await?;
//!     println!("{}", answer.answer);
//!     Ok(())
//! }
//! ```

pub use docqa_core::*;

#[cfg(feature = "rag")]
#[doc(inline)]
pub use docqa_rag as rag;

#[cfg(feature = "ollama")]
pub use docqa_ollama as ollama;

#[cfg(feature = "ort")]
pub use docqa_ort as ort;
