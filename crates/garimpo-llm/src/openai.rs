//! OpenAI-compatible provider implementation.
//!
//! Talks to a chat-completions endpoint in JSON-object response mode. The
//! provider is single-shot by design; callers own the retry policy and the
//! cancellation deadline (dropping the future aborts the in-flight
//! request).

use crate::{payload, prompt};
use async_trait::async_trait;
use garimpo_domain::{FieldRecord, LlmExtractor, ProviderError, Schema};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

/// Default model
pub const DEFAULT_MODEL: &str = "gpt-5-mini";

/// Environment variable holding the API credential
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Characters of document text sent per call; the layout-bearing head of
/// the document is what matters for extraction
pub const DEFAULT_MAX_TEXT_CHARS: usize = 4_000;

/// Outer HTTP timeout; the per-item watchdog deadline is usually tighter
const HTTP_TIMEOUT_SECS: u64 = 60;

/// Chat-completions provider for structured field extraction.
pub struct OpenAiExtractor {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_text_chars: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl OpenAiExtractor {
    /// Create a provider with an explicit credential and model
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: model.into(),
            api_key: api_key.into(),
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
        }
    }

    /// Create a provider from the `OPENAI_API_KEY` environment variable
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var(API_KEY_VAR)
            .map_err(|_| ProviderError::Auth(format!("{API_KEY_VAR} is not set")))?;
        Ok(Self::new(api_key, DEFAULT_MODEL))
    }

    /// Point at a different OpenAI-compatible endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Override the per-call document-text budget
    pub fn with_max_text_chars(mut self, max_text_chars: usize) -> Self {
        self.max_text_chars = max_text_chars;
        self
    }

    async fn chat(&self, user_prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt::SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ProviderError::Auth(format!("HTTP {status}")));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Transient(format!("HTTP {status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Malformed(format!("HTTP {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("bad response envelope: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::Malformed("response has no choices".into()))
    }
}

#[async_trait]
impl LlmExtractor for OpenAiExtractor {
    async fn extract_all(
        &self,
        schema: &Schema,
        text: &str,
    ) -> Result<FieldRecord, ProviderError> {
        let text = prompt::truncate(text, self.max_text_chars);
        let user_prompt = prompt::extract_all(schema, text);
        debug!(model = %self.model, prompt_chars = user_prompt.len(), "extract_all dispatch");

        let content = self.chat(&user_prompt).await?;
        payload::parse_record(&content, schema)
    }

    async fn extract_missing(
        &self,
        schema: &Schema,
        text: &str,
        partial: &FieldRecord,
    ) -> Result<FieldRecord, ProviderError> {
        let text = prompt::truncate(text, self.max_text_chars);
        let user_prompt = prompt::extract_missing(schema, text, partial);
        debug!(model = %self.model, prompt_chars = user_prompt.len(), "extract_missing dispatch");

        let content = self.chat(&user_prompt).await?;
        let record = payload::parse_record(&content, schema)?;

        // Keep only answers for fields that were actually missing.
        let mut out = FieldRecord::new();
        for field in partial.null_fields(schema) {
            out.set(&field, record.value(&field).map(str::to_string));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let provider = OpenAiExtractor::new("sk-test", "gpt-5-mini");
        assert_eq!(provider.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(provider.max_text_chars, DEFAULT_MAX_TEXT_CHARS);
    }

    #[test]
    fn test_builder_overrides() {
        let provider = OpenAiExtractor::new("sk-test", "gpt-5-mini")
            .with_endpoint("http://localhost:8080/v1")
            .with_max_text_chars(1_000);
        assert_eq!(provider.endpoint, "http://localhost:8080/v1");
        assert_eq!(provider.max_text_chars, 1_000);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient() {
        let provider = OpenAiExtractor::new("sk-test", "gpt-5-mini")
            .with_endpoint("http://127.0.0.1:9"); // discard port, nothing listens
        let schema: Schema = [("nome", "Nome")].into_iter().collect();

        let err = provider.extract_all(&schema, "texto").await.unwrap_err();
        assert!(err.is_retryable(), "expected transient, got {err:?}");
    }
}
