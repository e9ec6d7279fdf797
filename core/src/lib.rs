//! # docqa-core
//!
//! Provider-neutral trait APIs shared by the rest of the workspace. The retrieval core in
//! `docqa-rag` only talks to these traits; provider crates (`docqa-ollama`, `docqa-ort`)
//! implement them.
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │   docqa-rag     │───▶│   docqa-core     │◀───│   Providers     │
//! │                 │    │   (this crate)   │    │                 │
//! │ - encoder       │    │ - EmbeddingModel │    │ - ollama (HTTP) │
//! │ - retriever     │    │ - Reranker       │    │ - ort (ONNX)    │
//! │ - pipeline      │    │ - LanguageModel  │    │                 │
//! └─────────────────┘    └──────────────────┘    └─────────────────┘
//! ```
//!
//! | Capability | Trait | Description |
//! |------------|-------|-------------|
//! | **Embeddings** | [`EmbeddingModel`] | Convert text to vectors for semantic search |
//! | **Reranking** | [`Reranker`] | Score `(query, passage)` pairs with a cross-encoder |
//! | **Chat** | [`LanguageModel`] | Produce a completion for a list of chat messages |
//!
//! ## Modules
//!
//! - [`embedding`]: turn text into dense vectors.
//! - [`rerank`]: relevance scoring of candidate passages.
//! - [`llm`]: chat messages, sampling parameters and the completion trait.

#![no_std]
extern crate alloc;

/// Text embeddings.
pub mod embedding;
pub mod llm;
/// Cross-encoder relevance scoring.
pub mod rerank;

#[doc(inline)]
pub use embedding::EmbeddingModel;
#[doc(inline)]
pub use llm::LanguageModel;
#[doc(inline)]
pub use rerank::Reranker;

use alloc::string::String;

/// Result type used throughout the crate.
///
/// Type alias for [`anyhow::Result<T>`](anyhow::Result) with [`String`] as default success type.
pub type Result<T = String> = anyhow::Result<T>;

pub use anyhow::Error;
