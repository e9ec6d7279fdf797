//! Core types for the retrieval pipeline.

use serde::{Deserialize, Serialize};

/// Per-chunk metadata written by the chunker.
///
/// Empty strings are normalized to `None` at ingestion, so downstream code only has to
/// check for presence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// Product the page belongs to.
    pub product: Option<String>,
    /// Product version.
    pub version: Option<String>,
    /// Canonical page URL.
    pub url: Option<String>,
    /// First-level heading of the page.
    pub h1: Option<String>,
    /// Second-level heading of the page.
    pub h2: Option<String>,
    /// Hex SHA-256 of the normalized chunk text.
    pub sha256: Option<String>,
}

impl ChunkMeta {
    /// Trims every field and drops the empty ones.
    #[must_use]
    pub fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        }
        Self {
            product: clean(self.product),
            version: clean(self.version),
            url: clean(self.url),
            h1: clean(self.h1),
            h2: clean(self.h2),
            sha256: clean(self.sha256),
        }
    }
}

/// An immutable unit of retrievable text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier (`{product}_{version}:{page}:{ordinal}`).
    pub id: String,
    /// Chunk text.
    pub text: String,
    /// Chunk metadata.
    #[serde(default)]
    pub meta: ChunkMeta,
}

impl Chunk {
    /// Creates a chunk with empty metadata.
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            meta: ChunkMeta::default(),
        }
    }

    /// Creates a chunk with metadata.
    #[must_use]
    pub fn with_meta(id: impl Into<String>, text: impl Into<String>, meta: ChunkMeta) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            meta,
        }
    }

    /// Product label, if any.
    #[must_use]
    pub fn product(&self) -> Option<&str> {
        self.meta.product.as_deref()
    }

    /// Source URL, if any.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.meta.url.as_deref()
    }
}

/// A chunk matched by a query.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchHit {
    /// Slot of the chunk in the index.
    pub slot: usize,
    /// Position in the raw similarity-ordered candidate list.
    pub rank: usize,
    /// Inner product between query and chunk vectors.
    pub similarity: f32,
    /// Cross-encoder relevance, set by reranking.
    pub rerank_score: Option<f32>,
    /// The matched chunk.
    pub chunk: Chunk,
}

/// A cited page in an answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Page URL.
    pub url: String,
    /// First-level heading.
    pub h1: Option<String>,
    /// Second-level heading.
    pub h2: Option<String>,
}

impl Source {
    /// Citation for a hit, or `None` when the chunk has no URL.
    #[must_use]
    pub fn from_hit(hit: &SearchHit) -> Option<Self> {
        let meta = &hit.chunk.meta;
        Some(Self {
            url: meta.url.clone()?,
            h1: meta.h1.clone(),
            h2: meta.h2.clone(),
        })
    }
}
