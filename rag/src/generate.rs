//! Answer generation over the final context.

use std::fmt::Write as _;
use std::future::Future;

use docqa_core::llm::{LanguageModel, Parameters, oneshot};

use crate::error::{RagError, Result};
use crate::types::SearchHit;

/// Answer returned when the context cannot support one.
pub const NO_ANSWER: &str = "I don't know.";

/// Instructions sent as the system message.
pub const SYSTEM_PROMPT: &str = "Answer only from the provided context. If the context does not \
contain the answer, reply \"I don't know.\" End the answer with the source URLs you relied on.";

/// Turns a question and its context passages into an answer.
pub trait AnswerGenerator: Send + Sync {
    /// Produces the answer text. Must not fail on an empty context.
    fn generate(
        &self,
        question: &str,
        contexts: &[SearchHit],
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Asks a [`LanguageModel`] to answer from numbered context passages.
#[derive(Debug, Clone)]
pub struct ContextAnswerer<L> {
    model: L,
    parameters: Parameters,
}

impl<L: LanguageModel> ContextAnswerer<L> {
    /// Wraps `model` with backend-default sampling.
    pub fn new(model: L) -> Self {
        Self {
            model,
            parameters: Parameters::default(),
        }
    }

    /// Overrides sampling parameters.
    #[must_use]
    pub const fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Returns the wrapped model.
    pub const fn model(&self) -> &L {
        &self.model
    }
}

impl<L: LanguageModel> AnswerGenerator for ContextAnswerer<L> {
    async fn generate(&self, question: &str, contexts: &[SearchHit]) -> Result<String> {
        if contexts.is_empty() {
            return Ok(NO_ANSWER.to_owned());
        }
        let request = oneshot(SYSTEM_PROMPT, build_user_prompt(question, contexts))
            .with_parameters(self.parameters);
        let raw = self
            .model
            .complete(request)
            .await
            .map_err(RagError::Service)?;
        Ok(sanitize_answer(&raw))
    }
}

/// Lays out the question followed by `[i] h1 / h2`, source URL and text per passage.
#[must_use]
pub fn build_user_prompt(question: &str, contexts: &[SearchHit]) -> String {
    let mut blocks = Vec::with_capacity(contexts.len());
    for (i, hit) in contexts.iter().enumerate() {
        let meta = &hit.chunk.meta;
        let mut block = String::new();
        let _ = writeln!(block, "Source: {}", meta.url.as_deref().unwrap_or(""));
        let _ = writeln!(
            block,
            "[{}] {} / {}",
            i + 1,
            meta.h1.as_deref().unwrap_or(""),
            meta.h2.as_deref().unwrap_or("")
        );
        block.push_str(&hit.chunk.text);
        blocks.push(block);
    }
    format!(
        "Question: {question}\n\nContext:\n{}\n\nAnswer:",
        blocks.join("\n\n")
    )
}

/// Drops lines containing CJK characters, collapses runs of blank lines and trims.
///
/// An answer that ends up empty becomes [`NO_ANSWER`].
#[must_use]
pub fn sanitize_answer(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut blank_run = 0usize;
    for line in text.lines().filter(|line| !line.chars().any(is_cjk)) {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push(line);
    }
    let answer = out.join("\n").trim().to_owned();
    if answer.is_empty() {
        NO_ANSWER.to_owned()
    } else {
        answer
    }
}

const fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30ff}'
        | '\u{3400}'..='\u{4dbf}'
        | '\u{4e00}'..='\u{9fff}'
        | '\u{f900}'..='\u{faff}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, ChunkMeta};
    use docqa_core::llm::{Message, Request};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Request>>,
        reply: String,
    }

    impl LanguageModel for Recorder {
        async fn complete(&self, request: Request) -> docqa_core::Result {
            self.seen.lock().unwrap().push(request);
            Ok(self.reply.clone())
        }
    }

    fn context() -> Vec<SearchHit> {
        vec![SearchHit {
            slot: 7,
            rank: 0,
            similarity: 0.9,
            rerank_score: Some(3.2),
            chunk: Chunk::with_meta(
                "KSC:1:0",
                "The console listens on port 13299.",
                ChunkMeta {
                    url: Some("https://docs.example/ksc/ports".into()),
                    h1: Some("Ports".into()),
                    ..ChunkMeta::default()
                },
            ),
        }]
    }

    #[tokio::test]
    async fn empty_context_skips_the_model() {
        let answerer = ContextAnswerer::new(Recorder::default());
        let answer = answerer.generate("anything?", &[]).await.unwrap();
        assert_eq!(answer, NO_ANSWER);
        assert!(answerer.model().seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn prompt_carries_context_and_parameters() {
        let answerer = ContextAnswerer::new(Recorder {
            reply: "Port 13299.\nhttps://docs.example/ksc/ports".into(),
            ..Recorder::default()
        })
        .with_parameters(Parameters::default().temperature(0.2).max_tokens(192));

        let answer = answerer.generate("Which port?", &context()).await.unwrap();
        assert!(answer.starts_with("Port 13299."));

        let seen = answerer.model().seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.parameters().max_tokens, Some(192));
        assert_eq!(request.messages()[0], Message::system(SYSTEM_PROMPT));
        let user = request.messages()[1].content();
        assert!(user.starts_with("Question: Which port?"));
        assert!(user.contains("Source: https://docs.example/ksc/ports\n[1] Ports / \n"));
        assert!(user.ends_with("Answer:"));
    }

    #[test]
    fn sanitize_drops_cjk_and_collapses_blank_lines() {
        let raw = "First line.\n这是中文\n\n\n\nSecond line.\n";
        assert_eq!(sanitize_answer(raw), "First line.\n\nSecond line.");
    }

    #[test]
    fn sanitize_empty_becomes_sentinel() {
        assert_eq!(sanitize_answer("  \n日本語\n"), NO_ANSWER);
    }
}
