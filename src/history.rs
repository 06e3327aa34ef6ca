//! Archived conversations.
//!
//! When a conversation ends, the orchestrator snapshots it into a
//! `ChatSession` and hands it to the history side over a channel. The
//! history keeps sessions newest-first and replaces on matching id, so
//! re-archiving an updated conversation never duplicates it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::types::ChatMessage;

const TITLE_LIMIT: usize = 30;
const PREVIEW_LIMIT: usize = 50;

/// An archived, named transcript snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub title: String,
    pub preview: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

impl ChatSession {
    /// Snapshot a transcript under a stable session id.
    ///
    /// Title and preview are truncations of the first and last entry.
    /// Returns `None` for an empty transcript; there is nothing to
    /// archive.
    pub fn from_messages(id: Uuid, messages: &[ChatMessage]) -> Option<Self> {
        let first = messages.first()?;
        let last = messages.last()?;
        Some(Self {
            id,
            title: truncate(&first.content, TITLE_LIMIT),
            preview: truncate(&last.content, PREVIEW_LIMIT),
            created_at: Utc::now(),
            messages: messages.to_vec(),
        })
    }
}

fn truncate(text: &str, limit: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= limit {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(limit).collect();
    format!("{}...", cut)
}

/// Channel endpoints for "new session available" events.
pub type SessionSender = mpsc::UnboundedSender<ChatSession>;
pub type SessionReceiver = mpsc::UnboundedReceiver<ChatSession>;

pub fn session_channel() -> (SessionSender, SessionReceiver) {
    mpsc::unbounded_channel()
}

/// The ordered session list, newest first.
#[derive(Default)]
pub struct ChatHistory {
    sessions: Vec<ChatSession>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the session with the same id in place, or prepend.
    pub fn upsert(&mut self, session: ChatSession) {
        match self.sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session,
            None => self.sessions.insert(0, session),
        }
    }

    pub fn delete(&mut self, index: usize) -> Option<ChatSession> {
        if index < self.sessions.len() {
            Some(self.sessions.remove(index))
        } else {
            None
        }
    }

    pub fn get(&self, index: usize) -> Option<&ChatSession> {
        self.sessions.get(index)
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
