//! Fire-and-forget feedback signaling.
//!
//! The orchestrator emits a feedback event at selection, success, and
//! error points; what a sink does with it (haptics on a phone, a bell in
//! a terminal, nothing at all) is its own business. Sinks must never
//! block or fail the turn.

use std::sync::Mutex;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    Success,
    Error,
    Selection,
    Light,
    Medium,
    Heavy,
}

pub trait FeedbackSink: Send + Sync {
    fn notify(&self, kind: FeedbackKind);
}

/// Terminal sink: rings the bell on errors, stays quiet otherwise.
pub struct TerminalFeedback;

impl FeedbackSink for TerminalFeedback {
    fn notify(&self, kind: FeedbackKind) {
        debug!(?kind, "feedback");
        if kind == FeedbackKind::Error {
            eprint!("\x07");
        }
    }
}

/// Recording sink for tests.
#[derive(Default)]
pub struct RecordingFeedback {
    events: Mutex<Vec<FeedbackKind>>,
}

impl RecordingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FeedbackKind> {
        self.events.lock().unwrap().clone()
    }
}

impl FeedbackSink for RecordingFeedback {
    fn notify(&self, kind: FeedbackKind) {
        self.events.lock().unwrap().push(kind);
    }
}
