use crate::{client::Ollama, error::OllamaError};
use docqa_core::{
    LanguageModel, Result as CoreResult,
    llm::{Message, Request, Role},
};
use serde::Serialize;
use serde_json::Value;

impl LanguageModel for Ollama {
    async fn complete(&self, request: Request) -> CoreResult {
        Ok(self.chat(&request).await?)
    }
}

impl Ollama {
    /// Runs a non-streaming completion.
    ///
    /// Tries `/api/chat` first; a 404 from it means an older server, so the same request is
    /// flattened into a single prompt for `/api/generate`.
    ///
    /// # Errors
    /// See [`OllamaError`].
    pub async fn chat(&self, request: &Request) -> Result<String, OllamaError> {
        let options = self.options(request);
        let payload = ChatPayload {
            model: &self.config().chat_model,
            messages: request.messages(),
            options,
            stream: false,
        };
        match self.post_extract("/api/chat", &payload, extract_chat).await {
            Err(err) if err.is_not_found() => {
                tracing::info!(model = %self.config().chat_model, "chat endpoint missing, using generate");
                let (system, prompt) = flatten(request.messages());
                let payload = GeneratePayload {
                    model: &self.config().chat_model,
                    system: (!system.is_empty()).then_some(system),
                    prompt,
                    options,
                    stream: false,
                };
                self.post_extract("/api/generate", &payload, extract_generate)
                    .await
            }
            other => other,
        }
    }

    fn options(&self, request: &Request) -> Options {
        let params = request.parameters();
        Options {
            temperature: params.temperature.unwrap_or(self.config().temperature),
            num_predict: params.max_tokens.unwrap_or(self.config().max_tokens),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
struct Options {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    messages: &'a [Message],
    options: Options,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct GeneratePayload<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    prompt: String,
    options: Options,
    stream: bool,
}

/// System messages joined by newlines; everything else joined by blank lines.
fn flatten(messages: &[Message]) -> (String, String) {
    let mut system = Vec::new();
    let mut prompt = Vec::new();
    for message in messages {
        match message.role() {
            Role::System => system.push(message.content()),
            Role::User | Role::Assistant => prompt.push(message.content()),
        }
    }
    (system.join("\n"), prompt.join("\n\n"))
}

fn extract_chat(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(|message| message.get("content"))
        .or_else(|| body.get("response"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn extract_generate(body: &Value) -> Option<String> {
    body.get("response")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::llm::{Parameters, oneshot};
    use serde_json::json;

    #[test]
    fn chat_payload_uses_role_tagged_messages() {
        let request = oneshot("only use context", "what is the port?");
        let payload = ChatPayload {
            model: "llama3.2",
            messages: request.messages(),
            options: Options {
                temperature: 0.2,
                num_predict: 192,
            },
            stream: false,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["messages"][0], json!({"role": "system", "content": "only use context"}));
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["options"]["num_predict"], 192);
        assert_eq!(value["stream"], false);
    }

    #[test]
    fn request_parameters_override_client_defaults() {
        let client = Ollama::builder().temperature(0.7).max_tokens(64).build().unwrap();
        let plain = Request::new([Message::user("hi")]);
        let opts = client.options(&plain);
        assert!((opts.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(opts.num_predict, 64);

        let tuned = plain.with_parameters(Parameters::default().max_tokens(10));
        assert_eq!(client.options(&tuned).num_predict, 10);
    }

    #[test]
    fn flatten_separates_system_text() {
        let (system, prompt) = flatten(&[
            Message::system("a"),
            Message::system("b"),
            Message::user("q1"),
            Message::assistant("r1"),
            Message::user("q2"),
        ]);
        assert_eq!(system, "a\nb");
        assert_eq!(prompt, "q1\n\nr1\n\nq2");
    }

    #[test]
    fn generate_payload_omits_empty_system() {
        let (system, prompt) = flatten(&[Message::user("q")]);
        let payload = GeneratePayload {
            model: "m",
            system: (!system.is_empty()).then_some(system),
            prompt,
            options: Options {
                temperature: 0.2,
                num_predict: 192,
            },
            stream: false,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("system").is_none());
        assert_eq!(value["prompt"], "q");
    }

    #[test]
    fn chat_extraction_accepts_both_shapes() {
        let chat = json!({"message": {"role": "assistant", "content": "Port 8443."}});
        assert_eq!(extract_chat(&chat).as_deref(), Some("Port 8443."));
        let legacy = json!({"response": "Port 8443."});
        assert_eq!(extract_chat(&legacy).as_deref(), Some("Port 8443."));
        assert_eq!(extract_chat(&json!({"done": true})), None);
        assert_eq!(extract_generate(&json!({"message": {}})), None);
    }
}
