//! Error surface of the chat controller.

use serde::Serialize;

use crate::llm::AgentError;

/// Input rejected before any network activity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("Message too long. Please keep it under {0} characters.")]
    MessageTooLong(usize),
}

impl ChatError {
    pub fn kind_tag(&self) -> &'static str {
        "validation"
    }
}

impl Serialize for ChatError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Classified failure of a request that got past validation.
///
/// Cancellation is not a failure and never appears here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Http(u16),
    Timeout,
    EmptyResponse,
    Other(String),
}

impl FailureKind {
    /// Stable tag: `network`, `http_<status>`, `timeout`, `empty_response` or `unknown`.
    pub fn kind_tag(&self) -> String {
        match self {
            FailureKind::Network => "network".to_string(),
            FailureKind::Http(status) => format!("http_{}", status),
            FailureKind::Timeout => "timeout".to_string(),
            FailureKind::EmptyResponse => "empty_response".to_string(),
            FailureKind::Other(_) => "unknown".to_string(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            FailureKind::Network => "Network error: Unable to connect to the weather service. Please check your internet connection and try again.".to_string(),
            FailureKind::Http(status) => http_status_message(*status),
            FailureKind::Timeout => {
                "Request timed out. Please try again with a shorter message.".to_string()
            }
            FailureKind::EmptyResponse => {
                "Empty response received from server. Please try again.".to_string()
            }
            FailureKind::Other(message) => message.clone(),
        }
    }
}

fn http_status_message(status: u16) -> String {
    match status {
        400 => "Invalid request. Please check your message format and try again.".to_string(),
        401 => "Authentication error. Please refresh the page and try again.".to_string(),
        403 => "Access denied. Please check your API permissions.".to_string(),
        404 => "Weather service endpoint not found. Please try again later.".to_string(),
        408 => "Request timeout. The server took too long to respond. Please try again."
            .to_string(),
        429 => "Too many requests. Please wait a moment before trying again.".to_string(),
        500 => "Server error. The weather service is temporarily unavailable.".to_string(),
        502..=504 => {
            "Service temporarily unavailable. Please try again in a few moments.".to_string()
        }
        _ => format!("Server error ({}). Please try again later.", status),
    }
}

impl From<&AgentError> for FailureKind {
    fn from(err: &AgentError) -> Self {
        match err {
            AgentError::Api { status, .. } => FailureKind::Http(*status),
            AgentError::EmptyBody => FailureKind::EmptyResponse,
            AgentError::Http(e) if e.is_timeout() => FailureKind::Timeout,
            AgentError::Http(e) if e.is_connect() || e.is_request() => FailureKind::Network,
            AgentError::Http(e) => match err.status() {
                Some(status) => FailureKind::Http(status),
                None => FailureKind::Other(e.to_string()),
            },
        }
    }
}
