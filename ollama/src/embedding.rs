use crate::{client::Ollama, error::OllamaError};
use docqa_core::{EmbeddingModel, Result as CoreResult};
use serde::Serialize;
use serde_json::Value;

impl EmbeddingModel for Ollama {
    fn dim(&self) -> usize {
        self.config().embedding_dimensions
    }

    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        Ok(self.embed_raw(text).await?)
    }
}

impl Ollama {
    /// Embeds `text`, keeping the typed [`OllamaError`].
    ///
    /// # Errors
    /// See [`OllamaError`].
    pub async fn embed_raw(&self, text: &str) -> Result<Vec<f32>, OllamaError> {
        let request = EmbeddingRequest {
            model: &self.config().embedding_model,
            prompt: text,
        };
        self.post_extract("/api/embeddings", &request, extract_embedding)
            .await
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// Reads `embedding`, or the first row of `embeddings` as newer servers answer.
#[allow(clippy::cast_possible_truncation)]
fn extract_embedding(body: &Value) -> Option<Vec<f32>> {
    let row = match body.get("embedding") {
        Some(Value::Array(row)) => row,
        _ => match body.get("embeddings") {
            Some(Value::Array(rows)) => match rows.first() {
                Some(Value::Array(row)) => row,
                _ => return None,
            },
            _ => return None,
        },
    };
    row.iter()
        .map(|value| value.as_f64().map(|v| v as f32))
        .collect()
}
