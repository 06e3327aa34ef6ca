//! Core data types used throughout routerchat.
//!
//! This module defines the transcript entry, the role enum, and the
//! backend identifiers that flow between all components.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Roles ---

/// The role of a transcript entry.
///
/// - `System`: instructions to the model (invisible to the user)
/// - `User`: the human's input
/// - `Assistant`: the model's reply
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

// --- Backends ---

/// The upstream model-serving backends.
///
/// Each backend speaks its own wire protocol; the matching codec lives
/// under `crate::llm`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Anthropic's legacy text-completions endpoint (`/v1/complete`).
    AnthropicCompletion,
    /// Anthropic's Messages endpoint (`/v1/messages`).
    AnthropicMessages,
    /// OpenRouter's OpenAI-compatible aggregation endpoint. Namespaced
    /// model ids ("vendor/model") can only be served here.
    OpenRouter,
}

impl Backend {
    pub fn all() -> [Backend; 3] {
        [
            Backend::AnthropicCompletion,
            Backend::AnthropicMessages,
            Backend::OpenRouter,
        ]
    }

    /// Human-readable name, used in error messages and the selector.
    pub fn label(&self) -> &'static str {
        match self {
            Backend::AnthropicCompletion => "Anthropic (completions)",
            Backend::AnthropicMessages => "Anthropic (messages)",
            Backend::OpenRouter => "OpenRouter",
        }
    }

    /// Name the credential store files this backend's API key under.
    pub fn credential_name(&self) -> &'static str {
        match self {
            Backend::AnthropicCompletion => "anthropic-completion-api-key",
            Backend::AnthropicMessages => "anthropic-messages-api-key",
            Backend::OpenRouter => "openrouter-api-key",
        }
    }

    /// Known model ids for this backend, used by the model selector.
    pub fn models(&self) -> &'static [&'static str] {
        match self {
            Backend::AnthropicCompletion => &["claude-2", "claude-instant"],
            Backend::AnthropicMessages => &[
                "claude-3-opus-20240229",
                "claude-3-sonnet-20240229",
                "claude-3-haiku-20240307",
            ],
            Backend::OpenRouter => &[
                "openai/gpt-4o",
                "openai/gpt-4o-mini",
                "openai/o3-mini",
                "openai/gpt-4-turbo-preview",
                "anthropic/claude-3-opus",
                "anthropic/claude-3.5-sonnet",
                "anthropic/claude-3.7-sonnet",
                "google/gemini-2.0-flash-001",
                "google/gemini-pro",
                "meta-llama/llama-4-scout:free",
                "deepseek/deepseek-chat:free",
                "qwen/qwq-32b:free",
            ],
        }
    }

    pub fn default_model(&self) -> &'static str {
        self.models()[0]
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Backend::AnthropicCompletion => "anthropic_completion",
            Backend::AnthropicMessages => "anthropic_messages",
            Backend::OpenRouter => "openrouter",
        };
        f.write_str(token)
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic_completion" | "anthropic-completion" => Ok(Backend::AnthropicCompletion),
            "anthropic_messages" | "anthropic-messages" | "anthropic" => {
                Ok(Backend::AnthropicMessages)
            }
            "openrouter" | "open_router" => Ok(Backend::OpenRouter),
            other => Err(format!(
                "Unknown backend: '{}'. Supported: 'anthropic_completion', \
                 'anthropic_messages', 'openrouter'",
                other
            )),
        }
    }
}

/// Strip the aggregator namespace from a model id for display.
///
/// "anthropic/claude-3-opus" renders as "claude-3-opus"; plain ids are
/// returned unchanged.
pub fn model_display_name(model: &str) -> &str {
    match model.split_once('/') {
        Some((_, name)) if !name.is_empty() => name,
        _ => model,
    }
}

// --- Transcript entry ---

/// One turn (user or assistant) in a conversation.
///
/// `backend` and `model` are fixed at creation. An assistant entry may be
/// created empty as a streaming placeholder and filled exactly once on
/// completion; a placeholder whose turn fails is removed, never kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    pub backend: Backend,
    pub model: String,
}

impl ChatMessage {
    pub fn new(
        content: impl Into<String>,
        role: Role,
        backend: Backend,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            role,
            timestamp: Utc::now(),
            backend,
            model: model.into(),
        }
    }

    /// Create a user entry.
    pub fn user(content: impl Into<String>, backend: Backend, model: impl Into<String>) -> Self {
        Self::new(content, Role::User, backend, model)
    }

    /// Create an assistant entry.
    pub fn assistant(
        content: impl Into<String>,
        backend: Backend,
        model: impl Into<String>,
    ) -> Self {
        Self::new(content, Role::Assistant, backend, model)
    }
}
