//! # Embedding Module
//!
//! Embeddings are dense vector representations of text. Two passages about the same topic
//! produce vectors that point in a similar direction, which is what the retrieval index
//! exploits.
//!
//! This module provides the [`EmbeddingModel`] trait that abstracts over different
//! embedding backends, so the retrieval core never depends on a particular service.
//!
//! ```rust
//! use docqa_core::EmbeddingModel;
//!
//! async fn example<T: EmbeddingModel>(model: &T) -> docqa_core::Result<()> {
//!     let embedding = model.embed("How do I rotate the admin certificate?").await?;
//!     assert_eq!(embedding.len(), model.dim());
//!     Ok(())
//! }
//! ```

use alloc::vec::Vec;
use core::future::Future;

/// A type alias for an embedding vector of 32-bit floats.
pub type Embedding = Vec<f32>;

/// Converts text to vector representations.
///
/// Implementations are expected to be stateless apart from their connection to the backing
/// model: embedding the same text twice yields the same vector.
///
/// # Example
///
/// ```rust
/// use docqa_core::EmbeddingModel;
///
/// struct Bag;
///
/// impl EmbeddingModel for Bag {
///     fn dim(&self) -> usize {
///         4
///     }
///
///     async fn embed(&self, text: &str) -> docqa_core::Result<Vec<f32>> {
///         let mut vector = vec![0.0; 4];
///         for (idx, byte) in text.bytes().enumerate() {
///             vector[idx % 4] += f32::from(byte);
///         }
///         Ok(vector)
///     }
/// }
/// ```
pub trait EmbeddingModel: Send + Sync {
    /// Returns the embedding vector dimension advertised by the backend.
    ///
    /// This is a hint; the encoder validates the width of what actually comes back.
    fn dim(&self) -> usize;

    /// Converts text to an embedding vector.
    fn embed(&self, text: &str) -> impl Future<Output = crate::Result<Embedding>> + Send;
}

impl<T: EmbeddingModel> EmbeddingModel for alloc::sync::Arc<T> {
    fn dim(&self) -> usize {
        (**self).dim()
    }

    fn embed(&self, text: &str) -> impl Future<Output = crate::Result<Embedding>> + Send {
        (**self).embed(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use alloc::vec;

    struct MockEmbeddingModel {
        dimension: usize,
    }

    impl EmbeddingModel for MockEmbeddingModel {
        fn dim(&self) -> usize {
            self.dimension
        }

        #[allow(clippy::cast_precision_loss)]
        async fn embed(&self, text: &str) -> crate::Result<Vec<f32>> {
            let mut embedding = vec![0.0; self.dimension];
            for (i, value) in embedding.iter_mut().enumerate() {
                *value = (text.len() + i) as f32 * 0.01;
            }
            Ok(embedding)
        }
    }

    #[tokio::test]
    async fn embedding_generation() {
        let model = MockEmbeddingModel { dimension: 4 };
        let embedding = model.embed("test").await.unwrap();

        assert_eq!(embedding.len(), 4);
        assert!((embedding[0] - 0.04).abs() < f32::EPSILON);
        assert!((embedding[3] - 0.07).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn shared_model_delegates() {
        let model = Arc::new(MockEmbeddingModel { dimension: 3 });
        assert_eq!(model.dim(), 3);
        let direct = model.embed("ab").await.unwrap();
        let shared = Arc::clone(&model).embed("ab").await.unwrap();
        assert_eq!(direct, shared);
    }
}
