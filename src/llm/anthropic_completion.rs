//! Anthropic legacy text-completions codec.
//!
//! This backend predates the Messages API: the conversation travels as a
//! single prompt string with `\n\nHuman:` / `\n\nAssistant:` markers, and
//! the reply comes back in a `completion` field.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::sse;
use super::{api_error, AiClient, AiError, OnDelta, REQUEST_TIMEOUT, STREAMING_TIMEOUT};
use crate::types::{Backend, ChatMessage, Role};

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS_TO_SAMPLE: u32 = 1000;
const TEMPERATURE: f32 = 0.7;

pub struct AnthropicCompletionClient {
    api_key: String,
    api_base: String,
    client: reqwest::Client,
}

// --- API types ---

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    prompt: String,
    max_tokens_to_sample: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct ApiResponse {
    completion: String,
}

/// Streamed events carry `{"delta": {"text": "..."}}`.
fn extract_delta_text(payload: &serde_json::Value) -> Option<String> {
    payload
        .get("delta")?
        .get("text")?
        .as_str()
        .map(|s| s.to_string())
}

/// Encode the history plus the new turn as one completion prompt.
///
/// System entries have no slot in the raw prompt format and are dropped.
fn build_prompt(text: &str, history: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for msg in history {
        match msg.role {
            Role::User => {
                prompt.push_str("\n\nHuman: ");
                prompt.push_str(&msg.content);
            }
            Role::Assistant => {
                prompt.push_str("\n\nAssistant: ");
                prompt.push_str(&msg.content);
            }
            Role::System => {}
        }
    }
    prompt.push_str("\n\nHuman: ");
    prompt.push_str(text);
    prompt.push_str("\n\nAssistant:");
    prompt
}

// --- Implementation ---

impl AnthropicCompletionClient {
    pub fn new(api_key: String, api_base: Option<String>) -> Self {
        Self {
            api_key,
            api_base: api_base.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/complete", self.api_base.trim_end_matches('/'))
    }

    fn build_request(&self, text: &str, model: &str, history: &[ChatMessage]) -> ApiRequest {
        ApiRequest {
            model: model.to_string(),
            prompt: build_prompt(text, history),
            max_tokens_to_sample: MAX_TOKENS_TO_SAMPLE,
            temperature: TEMPERATURE,
            stream: None,
        }
    }

    async fn send(
        &self,
        request: &ApiRequest,
        timeout: std::time::Duration,
    ) -> Result<reqwest::Response, AiError> {
        let response = self
            .client
            .post(self.endpoint())
            .timeout(timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(AiError::Network)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(Backend::AnthropicCompletion, status, &body));
        }
        Ok(response)
    }
}

#[async_trait]
impl AiClient for AnthropicCompletionClient {
    async fn complete(
        &self,
        text: &str,
        model: &str,
        history: &[ChatMessage],
    ) -> Result<String, AiError> {
        let request = self.build_request(text, model, history);
        let response = self.send(&request, REQUEST_TIMEOUT).await?;

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                AiError::InvalidResponse
            } else {
                AiError::Network(e)
            }
        })?;
        Ok(api_response.completion.trim().to_string())
    }

    async fn complete_streaming(
        &self,
        text: &str,
        model: &str,
        history: &[ChatMessage],
        on_delta: OnDelta<'_>,
    ) -> Result<String, AiError> {
        let mut request = self.build_request(text, model, history);
        request.stream = Some(true);
        let response = self.send(&request, STREAMING_TIMEOUT).await?;
        sse::read_stream(response, extract_delta_text, on_delta).await
    }

    fn backend(&self) -> Backend {
        Backend::AnthropicCompletion
    }
}
