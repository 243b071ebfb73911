//! Demultiplexes the agent's line-oriented stream.
//!
//! The upstream protocol mixes several line shapes in one body and is not
//! self-describing, so classification is a best-effort heuristic: shapes are
//! tested in a fixed precedence order and the first match wins.
//!
//! | Shape           | Example                                  | Effect                 |
//! |-----------------|------------------------------------------|------------------------|
//! | SSE             | `data: {"type":"text","content":"Rain"}` | append to message      |
//! | Letter metadata | `f:{"messageId":"abc"}`                  | ignored                |
//! | Numeric frame   | `0:"Hello "`                             | running buffer replace |
//! | Bare JSON       | `{"usage":{"tokens":12}}`                | ignored                |
//! | Plain text      | `Sunny, 24C`                             | running buffer replace |
//!
//! Plain-text lines that contain any deny-listed marker (including `error`)
//! are dropped, even when they are genuine assistant text.

use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

static LETTER_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]:").expect("Invalid letter prefix regex"));

static NUMERIC_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+:").expect("Invalid numeric prefix regex"));

/// Substrings that mark an unshaped line as metadata rather than content.
pub const DEFAULT_METADATA_MARKERS: &[&str] = &[
    "messageId",
    "toolCallId",
    "finishReason",
    "usage",
    "isContinued",
    "error",
    "Error",
];

/// Deny-list deciding which unshaped lines are metadata.
#[derive(Debug, Clone)]
pub struct MetadataPolicy {
    markers: Vec<String>,
}

impl Default for MetadataPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_MARKERS.iter().map(|m| m.to_string()))
    }
}

impl MetadataPolicy {
    pub fn new(markers: impl IntoIterator<Item = String>) -> Self {
        Self {
            markers: markers.into_iter().filter(|m| !m.is_empty()).collect(),
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        let marker = marker.into();
        if !marker.is_empty() && !self.markers.contains(&marker) {
            self.markers.push(marker);
        }
        self
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    pub fn is_metadata(&self, line: &str) -> bool {
        LETTER_PREFIX_RE.is_match(line) || self.markers.iter().any(|m| line.contains(m.as_str()))
    }
}

/// What one stream line means for the assistant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// SSE text delta, appended to the message as-is.
    Append(String),
    /// Unescaped numeric-frame text, folded into the running buffer.
    Frame(String),
    /// Unshaped content line, folded into the running buffer.
    Text(String),
    /// Recognized metadata, no content.
    Metadata,
    /// SSE payload that was not valid JSON.
    Malformed(String),
    /// Blank, or a shape that carried nothing usable.
    Ignored,
}

#[derive(Deserialize)]
struct SsePayload {
    #[serde(rename = "type")]
    kind: Option<String>,
    content: Option<serde_json::Value>,
}

/// Classify a single decoded line.
pub fn classify_line(line: &str, policy: &MetadataPolicy) -> LineEvent {
    if line.trim().is_empty() {
        return LineEvent::Ignored;
    }

    if let Some(rest) = line.strip_prefix("data:") {
        return classify_sse(rest.trim());
    }

    if LETTER_PREFIX_RE.is_match(line) {
        return LineEvent::Metadata;
    }

    if NUMERIC_PREFIX_RE.is_match(line) {
        return classify_frame(line);
    }

    if line.starts_with('{') && line.ends_with('}') {
        return match serde_json::from_str::<serde_json::Value>(line) {
            Ok(_) => LineEvent::Metadata,
            Err(_) => LineEvent::Ignored,
        };
    }

    if policy.is_metadata(line) {
        return LineEvent::Metadata;
    }
    LineEvent::Text(line.to_string())
}

fn classify_sse(payload: &str) -> LineEvent {
    match serde_json::from_str::<SsePayload>(payload) {
        Ok(SsePayload {
            kind: Some(kind),
            content: Some(content),
        }) if kind == "text" => match content_text(content) {
            Some(text) => LineEvent::Append(text),
            None => LineEvent::Metadata,
        },
        Ok(_) => LineEvent::Metadata,
        Err(e) => LineEvent::Malformed(e.to_string()),
    }
}

/// Text carried by an SSE `content` field. Non-empty strings, non-zero
/// numbers and `true` count; containers and falsy scalars do not.
fn content_text(content: serde_json::Value) -> Option<String> {
    use serde_json::Value;
    match content {
        Value::String(text) if !text.is_empty() => Some(text),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

fn classify_frame(line: &str) -> LineEvent {
    let Some((_, body)) = line.split_once(':') else {
        return LineEvent::Ignored;
    };
    let Some(quoted) = body.strip_prefix('"').and_then(|b| b.strip_suffix('"')) else {
        return LineEvent::Ignored;
    };
    let text = quoted.replace("\\\"", "\"").replace("\\n", "\n");
    if text.is_empty() {
        LineEvent::Ignored
    } else {
        LineEvent::Frame(text)
    }
}

/// How the trailing assistant message should change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentUpdate {
    Append(String),
    Replace(String),
}

/// Per-request accumulator shared by numeric frames and plain-text lines.
///
/// Both shapes replace the visible message with the whole buffer instead
/// of appending a delta, so redelivered fragments do not stack up twice in
/// the rendered text.
#[derive(Debug, Default)]
pub struct RunningBuffer {
    text: String,
}

impl RunningBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Fold an event into the buffer. Returns `None` for events without content.
    pub fn apply(&mut self, event: LineEvent) -> Option<ContentUpdate> {
        match event {
            LineEvent::Append(delta) => Some(ContentUpdate::Append(delta)),
            LineEvent::Frame(text) => {
                self.text.push_str(&text);
                Some(ContentUpdate::Replace(self.text.clone()))
            }
            LineEvent::Text(line) => {
                self.text.push_str(&line);
                self.text.push('\n');
                Some(ContentUpdate::Replace(self.text.trim().to_string()))
            }
            LineEvent::Metadata | LineEvent::Malformed(_) | LineEvent::Ignored => None,
        }
    }
}
