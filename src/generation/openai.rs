//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{build_messages, GenerationError, GenerationRequest, GenerationResult, GenerativeModel};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat model reached over HTTP.
///
/// The API key is optional so local OpenAI-compatible servers (Ollama,
/// vLLM, LM Studio) can be used without credentials.
#[derive(Debug, Clone)]
pub struct OpenAiChatModel {
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiChatModel {
    /// Create a client with a per-request timeout.
    ///
    /// # Errors
    /// Returns [`GenerationError::Transport`] if the HTTP client cannot be built.
    pub fn new(api_key: Option<String>, model: Option<String>, timeout: Duration) -> GenerationResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: 0.2,
            max_tokens: 1024,
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn map_transport(e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            GenerationError::Timeout(e.to_string())
        } else {
            GenerationError::Transport(e.to_string())
        }
    }
}

/// Map an error status and body onto a generation error.
fn status_error(status: u16, body: &str) -> GenerationError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json["error"]["message"]
                .as_str()
                .or_else(|| json["message"].as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        429 => GenerationError::RateLimited(message),
        408 | 504 => GenerationError::Timeout(message),
        _ => GenerationError::Api { status, message },
    }
}

/// Pull the first non-empty choice out of a completion body.
fn parse_completion(body: &str) -> GenerationResult<String> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| GenerationError::MalformedResponse("response carried no answer text".to_string()))
}

#[async_trait]
impl GenerativeModel for OpenAiChatModel {
    async fn generate(&self, request: &GenerationRequest<'_>) -> GenerationResult<String> {
        let body = serde_json::json!({
            "model": &self.model,
            "messages": build_messages(request),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await.map_err(Self::map_transport)?;
        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(Self::map_transport)?;
        debug!(status, model = %self.model, bytes = text.len(), "chat completion returned");

        if status >= 400 {
            return Err(status_error(status, &text));
        }
        parse_completion(&text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  Graphs [1].  "}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "Graphs [1].");
    }

    #[test]
    fn test_parse_completion_without_choices_is_malformed() {
        assert!(matches!(
            parse_completion(r#"{"choices":[]}"#),
            Err(GenerationError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_completion(r#"{"choices":[{"message":{"content":null}}]}"#),
            Err(GenerationError::MalformedResponse(_))
        ));
        assert!(matches!(parse_completion("not json"), Err(GenerationError::MalformedResponse(_))));
    }

    #[test]
    fn test_status_error_mapping() {
        let quota = status_error(429, r#"{"error":{"message":"You exceeded your current quota"}}"#);
        assert!(matches!(quota, GenerationError::RateLimited(ref m) if m.contains("quota")));

        match status_error(401, r#"{"error":{"message":"Invalid API key"}}"#) {
            GenerationError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid API key");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(matches!(status_error(504, "gateway timeout"), GenerationError::Timeout(_)));
    }

    #[test]
    fn test_builder_options() {
        let model = OpenAiChatModel::new(None, None, Duration::from_secs(5))
            .unwrap()
            .with_base_url("http://localhost:11434/v1/")
            .with_sampling(0.0, 256);
        assert_eq!(model.base_url, "http://localhost:11434/v1");
        assert_eq!(model.model_name(), DEFAULT_MODEL);
        assert_eq!(model.max_tokens, 256);
    }
}
