//! Second-pass relevance scoring.
//!
//! A first-pass vector search is cheap but coarse. A [`Reranker`] reads the query and each
//! candidate passage together (cross-encoder style) and produces one relevance score per
//! pair. Scores are unbounded; only their order matters.

use alloc::vec::Vec;
use core::future::Future;

/// Scores `(query, passage)` pairs.
///
/// Implementations must be deterministic for a fixed model: scoring the same pairs twice
/// returns the same values in the same order. The returned vector has exactly one score per
/// passage.
pub trait Reranker: Send + Sync {
    /// Scores every passage against `query`.
    fn score(
        &self,
        query: &str,
        passages: &[&str],
    ) -> impl Future<Output = crate::Result<Vec<f32>>> + Send;
}

impl<T: Reranker> Reranker for alloc::sync::Arc<T> {
    fn score(
        &self,
        query: &str,
        passages: &[&str],
    ) -> impl Future<Output = crate::Result<Vec<f32>>> + Send {
        (**self).score(query, passages)
    }
}
