//! # Language Models
//!
//! A deliberately small chat abstraction: the retrieval pipeline only ever needs "give me a
//! completion for these messages". Streaming, tools and structured output are not part of
//! this surface.
//!
//! ```rust
//! use docqa_core::llm::{LanguageModel, Message, Request};
//!
//! async fn ask(model: impl LanguageModel) -> docqa_core::Result {
//!     let request = Request::new([
//!         Message::system("Answer briefly."),
//!         Message::user("What port does the admin console use?"),
//!     ]);
//!     model.complete(request).await
//! }
//! ```

mod message;

pub use message::{Message, Role};

use alloc::{string::String, vec::Vec};
use core::future::Future;

/// Sampling parameters forwarded to the backend.
///
/// `None` leaves the backend default in place.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Parameters {
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Upper bound on generated tokens.
    pub max_tokens: Option<u32>,
}

impl Parameters {
    /// Sets the sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the generated token limit.
    #[must_use]
    pub const fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A chat request: ordered messages plus sampling parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    messages: Vec<Message>,
    parameters: Parameters,
}

impl Request {
    /// Creates a request from messages with default parameters.
    pub fn new(messages: impl IntoIterator<Item = Message>) -> Self {
        Self {
            messages: messages.into_iter().collect(),
            parameters: Parameters::default(),
        }
    }

    /// Replaces the sampling parameters.
    #[must_use]
    pub const fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Returns the conversation messages.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the sampling parameters.
    #[must_use]
    pub const fn parameters(&self) -> &Parameters {
        &self.parameters
    }
}

/// Creates a two-message request: one system prompt, one user prompt.
pub fn oneshot(system: impl Into<String>, user: impl Into<String>) -> Request {
    Request::new([Message::system(system), Message::user(user)])
}

/// A chat-capable language model.
pub trait LanguageModel: Send + Sync {
    /// Produces the full completion text for `request`.
    fn complete(&self, request: Request) -> impl Future<Output = crate::Result> + Send;
}

impl<T: LanguageModel> LanguageModel for alloc::sync::Arc<T> {
    fn complete(&self, request: Request) -> impl Future<Output = crate::Result> + Send {
        (**self).complete(request)
    }
}
