use crate::{
    DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_DIM, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, error::OllamaError,
};
use serde::Serialize;
use serde_json::Value;
use std::{sync::Arc, time::Duration};

/// Default request timeout (5 minutes - generous for cold model loads).
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Extra attempts granted to a 200 response whose body lacks the expected field.
const MALFORMED_RETRIES: usize = 1;

/// Client for a local or remote Ollama server.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone, Debug)]
pub struct Ollama {
    inner: Arc<Config>,
    http: reqwest::Client,
}

impl Ollama {
    /// Create a client for `http://localhost:11434` with default models.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, OllamaError> {
        Self::builder().build()
    }

    /// Start building an [`Ollama`] client with custom configuration.
    #[must_use]
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Returns the embedding model identifier.
    #[must_use]
    pub fn embedding_model(&self) -> &str {
        &self.inner.embedding_model
    }

    /// Returns the chat model identifier.
    #[must_use]
    pub fn chat_model(&self) -> &str {
        &self.inner.chat_model
    }

    /// Checks that the server answers `GET /api/tags`.
    ///
    /// # Errors
    /// Returns the transport or status error when the server is not usable.
    pub async fn health(&self) -> Result<(), OllamaError> {
        let url = self.inner.request_url("/api/tags");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| OllamaError::from_transport(&url, err))?;
        let status = response.status();
        if status.is_success() {
            tracing::debug!(%url, "ollama health check passed");
            Ok(())
        } else {
            Err(OllamaError::Status {
                url,
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }

    pub(crate) fn config(&self) -> &Config {
        &self.inner
    }

    /// Posts `payload` and applies `extract` to the JSON body.
    ///
    /// A 200 answer that does not parse, or from which `extract` yields nothing, is re-sent
    /// once with the identical payload before giving up.
    pub(crate) async fn post_extract<P, T, F>(
        &self,
        path: &str,
        payload: &P,
        extract: F,
    ) -> Result<T, OllamaError>
    where
        P: Serialize + Sync,
        F: Fn(&Value) -> Option<T> + Send,
    {
        let url = self.inner.request_url(path);
        let mut detail = String::new();
        for attempt in 0..=MALFORMED_RETRIES {
            let body = self.post_raw(&url, payload).await?;
            match serde_json::from_slice::<Value>(&body) {
                Ok(value) => {
                    if let Some(extracted) = extract(&value) {
                        return Ok(extracted);
                    }
                    detail = "expected field missing from response".to_owned();
                }
                Err(err) => detail = format!("invalid JSON body: {err}"),
            }
            tracing::warn!(%url, attempt = attempt + 1, %detail, "malformed ollama response");
        }
        Err(OllamaError::Malformed { url, detail })
    }

    async fn post_raw<P: Serialize + Sync>(
        &self,
        url: &str,
        payload: &P,
    ) -> Result<Vec<u8>, OllamaError> {
        let response = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|err| OllamaError::from_transport(url, err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(OllamaError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| OllamaError::from_transport(url, err))?;
        Ok(bytes.to_vec())
    }
}

/// Builder for [`Ollama`].
#[derive(Debug, Clone)]
pub struct Builder {
    base_url: String,
    chat_model: String,
    embedding_model: String,
    embedding_dimensions: usize,
    temperature: f32,
    max_tokens: u32,
    request_timeout: Duration,
}

impl Builder {
    fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: DEFAULT_EMBEDDING_DIM,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the server base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Select the chat model (e.g., `llama3.2`).
    #[must_use]
    pub fn chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Select the embedding model (e.g., `nomic-embed-text`).
    #[must_use]
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Advertised embedding dimension.
    #[must_use]
    pub const fn embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_dimensions = dimensions;
        self
    }

    /// Default sampling temperature for requests that do not set one.
    #[must_use]
    pub const fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Default generated-token limit for requests that do not set one.
    #[must_use]
    pub const fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Per-request timeout covering connect, send and body.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Build the client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn build(self) -> Result<Ollama, OllamaError> {
        let http = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .user_agent("docqa-ollama/0.1")
            .build()?;
        Ok(Ollama {
            inner: Arc::new(Config {
                base_url: self.base_url,
                chat_model: self.chat_model,
                embedding_model: self.embedding_model,
                embedding_dimensions: self.embedding_dimensions,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            }),
            http,
        })
    }
}

#[derive(Debug)]
pub(crate) struct Config {
    pub(crate) base_url: String,
    pub(crate) chat_model: String,
    pub(crate) embedding_model: String,
    pub(crate) embedding_dimensions: usize,
    pub(crate) temperature: f32,
    pub(crate) max_tokens: u32,
}

impl Config {
    pub(crate) fn request_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
