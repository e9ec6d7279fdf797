//! Batched, normalized text encoding.

use docqa_core::EmbeddingModel;

use crate::error::{RagError, Result};

/// Default number of texts per batch.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Added to every norm before division so zero vectors stay finite.
pub const NORM_EPSILON: f32 = 1e-12;

/// Turns text into unit-length vectors through an [`EmbeddingModel`].
///
/// All similarity downstream is an inner product, which equals cosine similarity only
/// because every vector leaving this type has norm 1 (or is the zero vector).
#[derive(Debug, Clone)]
pub struct VectorEncoder<M> {
    model: M,
    batch_size: usize,
}

impl<M: EmbeddingModel> VectorEncoder<M> {
    /// Wraps `model` with the default batch size.
    pub const fn new(model: M) -> Self {
        Self {
            model,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets the batch size. Zero is treated as one.
    #[must_use]
    pub const fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = if size == 0 { 1 } else { size };
        self
    }

    /// Returns the batch size.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns the wrapped model.
    pub const fn model(&self) -> &M {
        &self.model
    }

    /// Encodes one text.
    ///
    /// # Errors
    /// [`RagError::Service`] if the model fails, [`RagError::Shape`] if it returns an empty
    /// vector.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut rows = self.embed(&[text]).await?;
        rows.pop()
            .ok_or_else(|| RagError::Shape("model returned no rows".into()))
    }

    /// Encodes `texts`, one row per input, in input order.
    ///
    /// # Errors
    /// See [`embed_with_progress`](Self::embed_with_progress).
    pub async fn embed<S>(&self, texts: &[S]) -> Result<Vec<Vec<f32>>>
    where
        S: AsRef<str> + Sync,
    {
        self.embed_with_progress(texts, |_, _| {}).await
    }

    /// Encodes `texts` and reports `(done, total)` after every batch.
    ///
    /// # Errors
    /// - [`RagError::Shape`] for empty input, a zero-width row, or rows of differing width
    /// - [`RagError::Service`] if the model call fails
    pub async fn embed_with_progress<S, F>(
        &self,
        texts: &[S],
        mut on_batch: F,
    ) -> Result<Vec<Vec<f32>>>
    where
        S: AsRef<str> + Sync,
        F: FnMut(usize, usize) + Send,
    {
        if texts.is_empty() {
            return Err(RagError::Shape("no texts to encode".into()));
        }

        let total = texts.len();
        let mut rows: Vec<Vec<f32>> = Vec::with_capacity(total);
        for batch in texts.chunks(self.batch_size) {
            for text in batch {
                let mut vector = self
                    .model
                    .embed(text.as_ref())
                    .await
                    .map_err(RagError::Service)?;
                check_width(&rows, &vector)?;
                l2_normalize(&mut vector);
                rows.push(vector);
            }
            tracing::debug!(done = rows.len(), total, "encoded batch");
            on_batch(rows.len(), total);
        }

        if rows.len() != total {
            return Err(RagError::Shape(format!(
                "expected {total} rows, got {}",
                rows.len()
            )));
        }
        Ok(rows)
    }
}

fn check_width(rows: &[Vec<f32>], vector: &[f32]) -> Result<()> {
    if vector.is_empty() {
        return Err(RagError::Shape("model returned a zero-width vector".into()));
    }
    if let Some(first) = rows.first() {
        if first.len() != vector.len() {
            return Err(RagError::Shape(format!(
                "inconsistent vector width: {} then {}",
                first.len(),
                vector.len()
            )));
        }
    }
    Ok(())
}

/// Divides `vector` by its L2 norm plus [`NORM_EPSILON`].
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt() + NORM_EPSILON;
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds text as `[len, vowels, 1]`; `"zero"` maps to the zero vector.
    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[allow(clippy::cast_precision_loss)]
    impl EmbeddingModel for Counting {
        fn dim(&self) -> usize {
            3
        }

        async fn embed(&self, text: &str) -> docqa_core::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text == "zero" {
                return Ok(vec![0.0; 3]);
            }
            let vowels = text.chars().filter(|c| "aeiou".contains(*c)).count();
            Ok(vec![text.len() as f32, vowels as f32, 1.0])
        }
    }

    struct Ragged;

    impl EmbeddingModel for Ragged {
        fn dim(&self) -> usize {
            2
        }

        async fn embed(&self, text: &str) -> docqa_core::Result<Vec<f32>> {
            Ok(vec![1.0; text.len()])
        }
    }

    struct Down;

    impl EmbeddingModel for Down {
        fn dim(&self) -> usize {
            2
        }

        async fn embed(&self, _text: &str) -> docqa_core::Result<Vec<f32>> {
            Err(anyhow::anyhow!("connection refused"))
        }
    }

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn outputs_unit_vectors() {
        let encoder = VectorEncoder::new(Counting::default());
        let rows = encoder
            .embed(&["install the agent", "rotate keys", "a"])
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert!((norm(row) - 1.0).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn zero_vector_stays_finite() {
        let encoder = VectorEncoder::new(Counting::default());
        let row = encoder.embed_one("zero").await.unwrap();
        assert!(row.iter().all(|x| x.is_finite() && *x == 0.0));
    }

    #[tokio::test]
    async fn batching_does_not_change_values() {
        let texts: Vec<String> = (0..7).map(|i| format!("text number {i}")).collect();
        let whole = VectorEncoder::new(Counting::default())
            .with_batch_size(32)
            .embed(&texts)
            .await
            .unwrap();
        let mut seen = Vec::new();
        let split = VectorEncoder::new(Counting::default())
            .with_batch_size(3)
            .embed_with_progress(&texts, |done, total| seen.push((done, total)))
            .await
            .unwrap();
        assert_eq!(whole, split);
        assert_eq!(seen, [(3, 7), (6, 7), (7, 7)]);
    }

    #[tokio::test]
    async fn empty_input_is_a_shape_error() {
        let encoder = VectorEncoder::new(Counting::default());
        let err = encoder.embed::<&str>(&[]).await.unwrap_err();
        assert!(matches!(err, RagError::Shape(_)));
        assert_eq!(encoder.model().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ragged_rows_are_rejected() {
        let encoder = VectorEncoder::new(Ragged);
        assert!(matches!(
            encoder.embed(&["ab", "abc"]).await,
            Err(RagError::Shape(_))
        ));
        assert!(matches!(encoder.embed(&[""]).await, Err(RagError::Shape(_))));
    }

    #[tokio::test]
    async fn backend_failure_is_a_service_error() {
        let encoder = VectorEncoder::new(Down);
        let err = encoder.embed_one("hello").await.unwrap_err();
        assert!(matches!(err, RagError::Service(_)));
    }

    #[test]
    fn normalize_matches_reference() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }
}
