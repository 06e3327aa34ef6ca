//! Anthropic Messages codec.
//!
//! Unlike the legacy completions backend, this one takes the conversation
//! as a role/content message array and returns content blocks. Its
//! streamed events use the same `{"delta": {"text"}}` payload shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::sse;
use super::{api_error, AiClient, AiError, OnDelta, REQUEST_TIMEOUT, STREAMING_TIMEOUT};
use crate::types::{Backend, ChatMessage, Role};

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1000;
const TEMPERATURE: f32 = 0.7;

pub struct AnthropicMessagesClient {
    api_key: String,
    api_base: String,
    client: reqwest::Client,
}

// --- API types ---

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: String,
}

fn extract_delta_text(payload: &serde_json::Value) -> Option<String> {
    payload
        .get("delta")?
        .get("text")?
        .as_str()
        .map(|s| s.to_string())
}

/// Convert the history plus the new turn to the wire message array.
///
/// This envelope has no top-level system field, so system entries are
/// dropped rather than forwarded under a role the endpoint would reject.
fn build_messages(text: &str, history: &[ChatMessage]) -> Vec<ApiMessage> {
    let mut messages: Vec<ApiMessage> = Vec::with_capacity(history.len() + 1);
    for msg in history {
        let role = match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => continue,
        };
        messages.push(ApiMessage {
            role: role.to_string(),
            content: msg.content.clone(),
        });
    }
    messages.push(ApiMessage {
        role: "user".to_string(),
        content: text.to_string(),
    });
    messages
}

// --- Implementation ---

impl AnthropicMessagesClient {
    pub fn new(api_key: String, api_base: Option<String>) -> Self {
        Self {
            api_key,
            api_base: api_base.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.api_base.trim_end_matches('/'))
    }

    fn build_request(&self, text: &str, model: &str, history: &[ChatMessage]) -> ApiRequest {
        ApiRequest {
            model: model.to_string(),
            messages: build_messages(text, history),
            max_tokens: MAX_TOKENS,
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
            return Err(api_error(Backend::AnthropicMessages, status, &body));
        }
        Ok(response)
    }

    fn parse_response(api_response: ApiResponse) -> Result<String, AiError> {
        api_response
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or(AiError::InvalidResponse)
    }
}

#[async_trait]
impl AiClient for AnthropicMessagesClient {
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
        Self::parse_response(api_response)
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
        Backend::AnthropicMessages
    }
}
