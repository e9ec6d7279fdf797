//! Ollama integration for docqa, built on `reqwest` and the shared `docqa-core` traits.
//!
//! One [`Ollama`] value serves both roles the pipeline needs: it implements
//! [`EmbeddingModel`](docqa_core::EmbeddingModel) through `/api/embeddings` and
//! [`LanguageModel`](docqa_core::LanguageModel) through `/api/chat`, falling back to
//! `/api/generate` on servers that do not expose the chat endpoint.
//!
//! ```no_run
//! use docqa_core::{EmbeddingModel, llm::{LanguageModel, oneshot}};
//! use docqa_ollama::Ollama;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let ollama = Ollama::builder().chat_model("llama3.2").build()?;
//! let vector = ollama.embed("hello").await?;
//! let reply = ollama.complete(oneshot("Be brief.", "Say hi.")).await?;
//! println!("{} dims, {reply}", vector.len());
//! # Ok(()) }
//! ```

mod chat;
mod client;
mod embedding;
mod error;

pub use client::{Builder, Ollama};
pub use error::OllamaError;

/// Default server address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
/// Default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "llama3.2";

pub(crate) const DEFAULT_EMBEDDING_DIM: usize = 768;
pub(crate) const DEFAULT_TEMPERATURE: f32 = 0.2;
pub(crate) const DEFAULT_MAX_TOKENS: u32 = 192;
