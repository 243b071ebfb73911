pub mod classifier;
pub mod decoder;
pub mod weather;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("No response body received from server")]
    EmptyBody,
}

impl AgentError {
    pub fn status(&self) -> Option<u16> {
        match self {
            AgentError::Api { status, .. } => Some(*status),
            AgentError::Http(e) => e.status().map(|s| s.as_u16()),
            AgentError::EmptyBody => None,
        }
    }
}

impl Serialize for AgentError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_display() {
        let err = AgentError::Api {
            status: 429,
            message: "slow down".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 429 - slow down");
        assert_eq!(err.status(), Some(429));

        let err = AgentError::EmptyBody;
        assert_eq!(err.to_string(), "No response body received from server");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_agent_error_serializes_as_string() {
        let err = AgentError::Api {
            status: 500,
            message: "boom".to_string(),
        };
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"API error: 500 - boom\"");
    }

    #[test]
    fn test_chat_message_user() {
        let msg = ChatMessage::user("Weather in Lima?");
        assert_eq!(msg.role, "user");
        assert_eq!(msg.content, "Weather in Lima?");
    }
}
