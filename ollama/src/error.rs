use thiserror::Error;

/// Errors that can arise when calling an Ollama server.
#[derive(Debug, Error)]
pub enum OllamaError {
    /// The server could not be reached at all.
    #[error("ollama unreachable at {url}: {source}")]
    Unreachable {
        /// Endpoint that was called.
        url: String,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The request did not complete within the configured timeout.
    #[error("ollama request to {url} timed out")]
    Timeout {
        /// Endpoint that was called.
        url: String,
    },
    /// The server answered with a non-success status.
    #[error("ollama returned {status} for {url}: {body}")]
    Status {
        /// Endpoint that was called.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },
    /// The server answered 200 but the body lacked the expected field, twice in a row.
    #[error("ollama response from {url} is malformed: {detail}")]
    Malformed {
        /// Endpoint that was called.
        url: String,
        /// What was missing or unparsable.
        detail: String,
    },
    /// Other HTTP-layer failures.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl OllamaError {
    pub(crate) fn from_transport(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_owned(),
            }
        } else if err.is_connect() {
            Self::Unreachable {
                url: url.to_owned(),
                source: err,
            }
        } else {
            Self::Http(err)
        }
    }

    /// Returns `true` for the 404 answer that signals a missing chat endpoint.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}
