//! OpenRouter codec.
//!
//! OpenRouter fronts many upstream vendors behind one OpenAI-compatible
//! endpoint, which is why namespaced model ids ("vendor/model") always
//! route here. Requests carry two fixed identification headers on top of
//! the bearer credential.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::sse;
use super::{api_error, AiClient, AiError, OnDelta, REQUEST_TIMEOUT, STREAMING_TIMEOUT};
use crate::types::{Backend, ChatMessage, Role};

const REFERER: &str = "Router Chat";
const TITLE: &str = "Router Chat";
const TEMPERATURE: f32 = 0.7;

pub struct OpenRouterClient {
    api_key: String,
    api_base: String,
    client: reqwest::Client,
}

// --- API types ---

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
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
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Deserialize)]
struct ApiResponseMessage {
    content: String,
}

/// Streamed events carry `{"choices": [{"delta": {"content": "..."}}]}`.
fn extract_choice_delta(payload: &serde_json::Value) -> Option<String> {
    payload
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

/// Convert the history plus the new turn to the wire message array.
/// System entries pass through; this protocol has a "system" role.
fn build_messages(text: &str, history: &[ChatMessage]) -> Vec<ApiMessage> {
    let mut messages: Vec<ApiMessage> = Vec::with_capacity(history.len() + 1);
    for msg in history {
        let role = match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
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

impl OpenRouterClient {
    pub fn new(api_key: String, api_base: Option<String>) -> Self {
        Self {
            api_key,
            api_base: api_base.unwrap_or_else(|| "https://openrouter.ai/api/v1".to_string()),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    fn build_request(&self, text: &str, model: &str, history: &[ChatMessage]) -> ApiRequest {
        ApiRequest {
            model: model.to_string(),
            messages: build_messages(text, history),
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
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
            .json(request)
            .send()
            .await
            .map_err(AiError::Network)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(Backend::OpenRouter, status, &body));
        }
        Ok(response)
    }

    fn parse_response(api_response: ApiResponse) -> Result<String, AiError> {
        api_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(AiError::InvalidResponse)
    }
}

#[async_trait]
impl AiClient for OpenRouterClient {
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
        sse::read_stream(response, extract_choice_delta, on_delta).await
    }

    fn backend(&self) -> Backend {
        Backend::OpenRouter
    }
}
