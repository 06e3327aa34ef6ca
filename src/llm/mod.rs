//! AI client module.
//!
//! This module defines the `AiClient` trait that abstracts over the
//! supported chat backends, and provides one concrete codec per wire
//! protocol.
//!
//! Key concepts:
//! - **Provider pattern**: each backend has its own request/response
//!   format, but they all implement the same trait so the orchestrator
//!   does not care which one it is talking to.
//! - **Cumulative deltas**: the streaming method reports the whole text
//!   accumulated so far on every update, not the latest fragment, so a
//!   consumer can always render the latest-known-good full reply.
//! - **Uniform error mapping**: all three codecs classify failures into
//!   the same `AiError` taxonomy.

pub mod anthropic;
pub mod anthropic_completion;
pub mod openrouter;
pub mod router;
pub mod sse;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Backend, ChatMessage};

/// Client-side timeout for a whole-response request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client-side timeout for a streaming request. Streaming is allowed more
/// wall-clock time because output arrives incrementally rather than as one
/// blocking call.
pub const STREAMING_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors produced by the AI clients.
#[derive(Debug, Error)]
pub enum AiError {
    /// The backend rejected the request and said why.
    #[error("{0}")]
    Api(String),
    /// Transport-level failure: connection, DNS, TLS, timeout.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    /// A 2xx body that does not have the expected shape.
    #[error("invalid response from server")]
    InvalidResponse,
    /// A failure specific to the incremental path. Deltas already emitted
    /// are not retracted; the caller decides what to do with them.
    #[error("streaming error: {0}")]
    Streaming(String),
}

/// Callback invoked with the cumulative text-so-far during streaming.
pub type OnDelta<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Trait implemented by every backend codec.
///
/// `history` is the ordered sequence of prior transcript entries; the new
/// user turn travels separately in `text` and is appended by the codec in
/// the backend's native encoding.
#[async_trait]
pub trait AiClient: Send + Sync {
    /// Send one turn and wait for the whole reply.
    async fn complete(
        &self,
        text: &str,
        model: &str,
        history: &[ChatMessage],
    ) -> Result<String, AiError>;

    /// Send one turn and stream the reply. `on_delta` is invoked zero or
    /// more times with the cumulative text before the final return.
    async fn complete_streaming(
        &self,
        text: &str,
        model: &str,
        history: &[ChatMessage],
        on_delta: OnDelta<'_>,
    ) -> Result<String, AiError>;

    /// The backend this codec speaks for.
    fn backend(&self) -> Backend;
}

/// Map a non-2xx response body to an `AiError`.
///
/// Backends report errors as `{"error": {"message": "..."}}`; when that
/// shape is present the message is surfaced verbatim, otherwise the status
/// code is reported under the backend's name.
pub(crate) fn api_error(backend: Backend, status: reqwest::StatusCode, body: &str) -> AiError {
    let parsed: Option<String> = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")?
                .get("message")?
                .as_str()
                .map(|s| s.to_string())
        });
    match parsed {
        Some(message) => AiError::Api(message),
        None => AiError::Api(format!("{} HTTP {}", backend.label(), status.as_u16())),
    }
}
