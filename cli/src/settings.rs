//! Layered CLI settings: built-in defaults, then `docqa.toml`, then `DOCQA_*` variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use docqa_core::llm::Parameters;
use docqa_ollama::Ollama;
use docqa_rag::RagConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

/// Settings file read from the working directory unless `--config` says otherwise.
pub const DEFAULT_CONFIG_FILE: &str = "docqa.toml";

/// Everything the binary needs to reach its models and data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Ollama server base URL.
    pub ollama_url: String,
    /// Ollama embedding model.
    pub embed_model: String,
    /// Width of `embed_model` vectors.
    pub embed_dim: usize,
    /// Ollama chat model.
    pub llm_model: String,
    /// Directory with the cross-encoder `model.onnx` and `tokenizer.json`.
    pub rerank_model_dir: PathBuf,
    /// Root of `chunks/`, `index/` and `eval/`.
    pub data_dir: PathBuf,
    /// Candidates fetched from the index per question.
    pub topk: usize,
    /// Candidates kept after reranking and handed to the chat model.
    pub topn_context: usize,
    /// HNSW connectivity used when building.
    pub hnsw_m: usize,
    /// HNSW candidate list size used when building.
    pub hnsw_ef_construction: usize,
    /// HNSW candidate list size used when searching; raised to `topk` if lower.
    pub hnsw_ef_search: usize,
    /// Texts sent per embedding batch.
    pub embed_batch_size: usize,
    /// Chat sampling temperature.
    pub temperature: f32,
    /// Chat completion length cap.
    pub max_tokens: u32,
    /// Per-request timeout against Ollama, in seconds.
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let rag = RagConfig::default();
        Self {
            ollama_url: docqa_ollama::DEFAULT_BASE_URL.into(),
            embed_model: docqa_ollama::DEFAULT_EMBEDDING_MODEL.into(),
            embed_dim: 768,
            llm_model: docqa_ollama::DEFAULT_CHAT_MODEL.into(),
            rerank_model_dir: PathBuf::from("models/bge-reranker-base"),
            data_dir: PathBuf::from("data"),
            topk: rag.topk,
            topn_context: rag.topn_context,
            hnsw_m: rag.hnsw_m,
            hnsw_ef_construction: rag.hnsw_ef_construction,
            hnsw_ef_search: rag.hnsw_ef_search,
            embed_batch_size: rag.embed_batch_size,
            temperature: 0.2,
            max_tokens: 192,
            timeout_secs: 300,
        }
    }
}

impl Settings {
    /// Loads defaults, then `path` if it exists, then `DOCQA_*` environment variables.
    ///
    /// # Errors
    /// Returns the figment error for unparsable files or mistyped values.
    pub fn load(path: &Path) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("DOCQA_"))
            .extract()
            .map_err(Box::new)
    }

    /// Retrieval configuration rooted at `data_dir`.
    #[must_use]
    pub fn rag_config(&self) -> RagConfig {
        RagConfig::builder()
            .index_dir(self.data_dir.join("index"))
            .chunks_dir(self.data_dir.join("chunks"))
            .topk(self.topk)
            .topn_context(self.topn_context)
            .hnsw_m(self.hnsw_m)
            .hnsw_ef_construction(self.hnsw_ef_construction)
            .hnsw_ef_search(self.hnsw_ef_search)
            .embed_batch_size(self.embed_batch_size)
            .build()
    }

    /// Sampling parameters for answer generation.
    #[must_use]
    pub fn parameters(&self) -> Parameters {
        Parameters::default()
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
    }

    /// Ollama client for both embeddings and chat.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn ollama(&self) -> Result<Ollama, docqa_ollama::OllamaError> {
        Ollama::builder()
            .base_url(&self.ollama_url)
            .embedding_model(&self.embed_model)
            .embedding_dimensions(self.embed_dim)
            .chat_model(&self.llm_model)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_the_retrieval_core() {
        let settings = Settings::default();
        let config = settings.rag_config();
        assert_eq!(config.index_dir, PathBuf::from("data/index"));
        assert_eq!(config.chunks_dir, PathBuf::from("data/chunks"));
        assert_eq!(config.topk, 15);
        assert_eq!(config.hnsw_ef_search, 64);
    }

    #[test]
    fn file_then_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                    llm_model = "qwen2.5"
                    topk = 20
                    data_dir = "/srv/docqa"
                "#,
            )?;
            jail.set_env("DOCQA_TOPK", "25");
            jail.set_env("DOCQA_OLLAMA_URL", "http://gpu-box:11434");

            let settings = Settings::load(Path::new(DEFAULT_CONFIG_FILE)).map_err(|e| *e)?;
            assert_eq!(settings.llm_model, "qwen2.5");
            assert_eq!(settings.topk, 25);
            assert_eq!(settings.ollama_url, "http://gpu-box:11434");
            assert_eq!(settings.rag_config().index_dir, PathBuf::from("/srv/docqa/index"));
            assert_eq!(settings.embed_model, "nomic-embed-text");
            Ok(())
        });
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        Jail::expect_with(|_| {
            let settings = Settings::load(Path::new("absent.toml")).map_err(|e| *e)?;
            assert_eq!(settings, Settings::default());
            Ok(())
        });
    }
}
