//! Configuration for the retrieval pipeline.

use std::path::PathBuf;

use crate::error::{RagError, Result};
use crate::index::HnswParams;

/// Configuration for index building and query answering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RagConfig {
    /// Directory holding the persisted index artifacts.
    pub index_dir: PathBuf,
    /// Directory holding the `*.jsonl` chunk files.
    pub chunks_dir: PathBuf,
    /// Candidates fetched from the ANN index per query.
    pub topk: usize,
    /// Candidates kept after reranking.
    pub topn_context: usize,
    /// HNSW connectivity.
    pub hnsw_m: usize,
    /// HNSW build-time candidate list size.
    pub hnsw_ef_construction: usize,
    /// HNSW query-time candidate list size.
    pub hnsw_ef_search: usize,
    /// Texts per embedding batch.
    pub embed_batch_size: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("data/index"),
            chunks_dir: PathBuf::from("data/chunks"),
            topk: 15,
            topn_context: 3,
            hnsw_m: 32,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 64,
            embed_batch_size: 32,
        }
    }
}

impl RagConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for custom configuration.
    #[must_use]
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::new()
    }

    /// Index parameters derived from this configuration.
    ///
    /// The search breadth is never below `topk`, so a query can always fill its candidate list.
    #[must_use]
    pub const fn hnsw_params(&self) -> HnswParams {
        let ef_search = if self.hnsw_ef_search < self.topk {
            self.topk
        } else {
            self.hnsw_ef_search
        };
        HnswParams {
            m: self.hnsw_m,
            ef_construction: self.hnsw_ef_construction,
            ef_search,
        }
    }

    /// Rejects values the pipeline cannot run with.
    ///
    /// # Errors
    /// Returns [`RagError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("topk", self.topk, 1),
            ("topn_context", self.topn_context, 1),
            ("hnsw_m", self.hnsw_m, 2),
            ("hnsw_ef_construction", self.hnsw_ef_construction, 1),
            ("hnsw_ef_search", self.hnsw_ef_search, 1),
            ("embed_batch_size", self.embed_batch_size, 1),
        ];
        for (name, value, min) in checks {
            if value < min {
                return Err(RagError::Config(format!("{name} must be >= {min}, got {value}")));
            }
        }
        Ok(())
    }
}

/// Builder for [`RagConfig`].
#[derive(Debug, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Creates a new configuration builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RagConfig::default(),
        }
    }

    /// Sets the index directory.
    #[must_use]
    pub fn index_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.index_dir = path.into();
        self
    }

    /// Sets the chunk directory.
    #[must_use]
    pub fn chunks_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chunks_dir = path.into();
        self
    }

    /// Sets how many ANN candidates are fetched.
    #[must_use]
    pub const fn topk(mut self, k: usize) -> Self {
        self.config.topk = k;
        self
    }

    /// Sets how many candidates survive reranking.
    #[must_use]
    pub const fn topn_context(mut self, n: usize) -> Self {
        self.config.topn_context = n;
        self
    }

    /// Sets HNSW connectivity.
    #[must_use]
    pub const fn hnsw_m(mut self, m: usize) -> Self {
        self.config.hnsw_m = m;
        self
    }

    /// Sets the HNSW build-time candidate list size.
    #[must_use]
    pub const fn hnsw_ef_construction(mut self, ef: usize) -> Self {
        self.config.hnsw_ef_construction = ef;
        self
    }

    /// Sets the HNSW query-time candidate list size.
    #[must_use]
    pub const fn hnsw_ef_search(mut self, ef: usize) -> Self {
        self.config.hnsw_ef_search = ef;
        self
    }

    /// Sets the embedding batch size.
    #[must_use]
    pub const fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> RagConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = RagConfig::default();
        assert_eq!(config.index_dir, PathBuf::from("data/index"));
        assert_eq!(config.topk, 15);
        assert_eq!(config.topn_context, 3);
        assert_eq!(
            config.hnsw_params(),
            HnswParams {
                m: 32,
                ef_construction: 200,
                ef_search: 64
            }
        );
        assert_eq!(config.embed_batch_size, 32);
        config.validate().unwrap();
    }

    #[test]
    fn builder_config() {
        let config = RagConfig::builder()
            .index_dir("/srv/index")
            .chunks_dir("/srv/chunks")
            .topk(10)
            .topn_context(5)
            .hnsw_ef_search(128)
            .build();

        assert_eq!(config.index_dir, PathBuf::from("/srv/index"));
        assert_eq!(config.chunks_dir, PathBuf::from("/srv/chunks"));
        assert_eq!(config.topk, 10);
        assert_eq!(config.topn_context, 5);
        assert_eq!(config.hnsw_ef_search, 128);
    }

    #[test]
    fn search_breadth_covers_topk() {
        let config = RagConfig::builder().topk(40).hnsw_ef_search(16).build();
        assert_eq!(config.hnsw_params().ef_search, 40);

        let config = RagConfig::builder().topk(10).hnsw_ef_search(64).build();
        assert_eq!(config.hnsw_params().ef_search, 64);
    }

    #[test]
    fn validate_rejects_degenerate_values() {
        let err = RagConfig::builder().hnsw_m(1).build().validate().unwrap_err();
        assert!(err.to_string().contains("hnsw_m"));
        assert!(RagConfig::builder().topk(0).build().validate().is_err());
    }
}
