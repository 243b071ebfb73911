//! Controller state and the snapshot handed to renderers.
//!
//! Lifecycle of one send:
//! - Idle -> Sending (message validated, request opened)
//! - Sending -> Streaming (headers OK, assistant message appended)
//! - Sending/Streaming -> Idle (completed, failed or aborted)
//! - Sending/Streaming -> Sending (a newer send preempts the current one)

use serde::Serialize;
use std::fmt;

use crate::error::FailureKind;
use crate::store::models::{Conversation, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Sending,
    Streaming,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Sending => write!(f, "Sending"),
            SessionState::Streaming => write!(f, "Streaming"),
        }
    }
}

impl SessionState {
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Idle, SessionState::Sending)
                | (SessionState::Sending, SessionState::Streaming)
                | (SessionState::Sending, SessionState::Idle)
                | (SessionState::Streaming, SessionState::Idle)
                // Preemption by a newer send
                | (SessionState::Sending, SessionState::Sending)
                | (SessionState::Streaming, SessionState::Sending)
        )
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

/// How a single send ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Stream ended after producing content.
    Completed,
    /// Stream ended without content; the fallback reply was written.
    Fallback,
    /// Surfaced to the user as an error.
    Failed(FailureKind),
    /// Cancelled by a newer send, a clear, or the deadline. Never surfaced.
    Aborted,
}

/// Everything a renderer needs, copied out under lock.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub conversations: Vec<Conversation>,
    pub active_conversation_id: Option<String>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub state: SessionState,
}

impl Snapshot {
    pub fn active(&self) -> Option<&Conversation> {
        let id = self.active_conversation_id.as_deref()?;
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Messages of the active conversation; empty when none is active.
    pub fn messages(&self) -> &[Message] {
        self.active().map(|c| c.messages.as_slice()).unwrap_or(&[])
    }
}
