use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder title until the first user message names the conversation.
pub const DEFAULT_TITLE: &str = "New Chat";

const TITLE_WORDS: usize = 4;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Same record with new content; role and timestamp are kept.
    pub fn with_content(&self, content: String) -> Self {
        Self {
            role: self.role,
            content,
            timestamp: self.timestamp,
        }
    }
}

/// One conversation and its message log.
///
/// `message_count` and `last_message` are caches over `messages` and are
/// only ever updated together with it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub last_message: String,
    pub timestamp: DateTime<Utc>,
    pub message_count: usize,
}

impl Conversation {
    pub(crate) fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            last_message: String::new(),
            timestamp: Utc::now(),
            message_count: 0,
        }
    }

    pub(crate) fn push(&mut self, message: Message) {
        if self.messages.is_empty() && message.role == Role::User {
            self.title = generate_title(&message.content);
        }
        self.last_message = message.content.clone();
        self.messages.push(message);
        self.message_count = self.messages.len();
        self.timestamp = Utc::now();
    }

    /// Rewrite the trailing message if it belongs to the assistant.
    pub(crate) fn rewrite_last_assistant(&mut self, content: String) -> bool {
        let Some(last) = self.messages.last() else {
            return false;
        };
        if last.role != Role::Assistant {
            return false;
        }
        let updated = last.with_content(content);
        self.last_message = updated.content.clone();
        let idx = self.messages.len() - 1;
        self.messages[idx] = updated;
        self.timestamp = Utc::now();
        true
    }

    pub(crate) fn clear(&mut self) {
        self.messages.clear();
        self.last_message.clear();
        self.message_count = 0;
    }
}

/// Title from the first user message: up to four space-separated words,
/// with "..." appended when the message was longer.
pub fn generate_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    let words: Vec<&str> = trimmed.split(' ').collect();
    if words.len() <= TITLE_WORDS {
        return trimmed.to_string();
    }
    format!("{}...", words[..TITLE_WORDS].join(" "))
}
