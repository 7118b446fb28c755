//! The conversation data model: messages, content blocks, and tool definitions.
//!
//! This replaces the single `{role, content}` shape the original client used
//! with a closed, tagged sum type: a message is either something the user
//! sent, something the assistant produced, or a tool result feeding back into
//! the conversation. Each variant carries exactly the fields that kind of
//! message can have, so callers can't construct an assistant message without
//! a stop reason or a tool result without a call id.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Unix-epoch milliseconds. Monotonic non-decreasing ordering of timestamps
/// within one session is a caller responsibility (see `Message` invariants).
pub type Timestamp = i64;

pub(crate) fn now_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Reason the assistant's turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Stop,
    Length,
    ToolUse,
    Error,
    Aborted,
}

/// Detail level for an image content block, mirroring OpenAI's vision hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Low,
    High,
    #[default]
    Auto,
}

/// A tool-call directive emitted by the model: a name, an id that the
/// matching `ToolResult` must echo, and an argument mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One piece of message content. `Text` and `Thinking` carry plain prose;
/// `Image` carries inline base64 bytes; `ToolCall` carries a directive the
/// scheduler must dispatch before the next assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Thinking { text: String },
    Image { data: String, media_type: String, detail: ImageDetail },
    ToolCall(ToolCall),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        ContentBlock::Thinking { text: text.into() }
    }

    /// Builds an image block from raw base64 data and a MIME type
    /// (`"image/png"`, `"image/jpeg"`, ...). Mirrors the base64 path of the
    /// original SDK's `ImageBlock::from_base64`, minus the data-URI wrapper —
    /// the wire adapter is responsible for whatever envelope its provider wants.
    pub fn image(data: impl Into<String>, media_type: impl Into<String>) -> Result<Self> {
        let data = data.into();
        let media_type = media_type.into();
        if data.trim().is_empty() {
            return Err(Error::invalid_input("image data cannot be empty"));
        }
        if !media_type.starts_with("image/") {
            return Err(Error::invalid_input(format!(
                "invalid image MIME type: {media_type} (expected image/*)"
            )));
        }
        Ok(ContentBlock::Image {
            data,
            media_type,
            detail: ImageDetail::Auto,
        })
    }

    pub fn with_detail(self, detail: ImageDetail) -> Self {
        match self {
            ContentBlock::Image { data, media_type, .. } => ContentBlock::Image {
                data,
                media_type,
                detail,
            },
            other => other,
        }
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        ContentBlock::ToolCall(ToolCall::new(id, name, arguments))
    }

    /// Text content if this block carries any (Text or Thinking), else `None`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } | ContentBlock::Thinking { text } => Some(text),
            _ => None,
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCall> {
        match self {
            ContentBlock::ToolCall(call) => Some(call),
            _ => None,
        }
    }
}

/// Token-usage counters reported by the provider for one assistant message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_read_tokens + self.cache_write_tokens
    }
}

/// A tagged conversation entry. Exactly one of the three shapes the runtime
/// ever appends to history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        content: Vec<ContentBlock>,
        timestamp: Timestamp,
    },
    Assistant {
        content: Vec<ContentBlock>,
        model: String,
        provider: String,
        usage: Usage,
        stop_reason: StopReason,
        error: Option<String>,
        timestamp: Timestamp,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        content: Vec<ContentBlock>,
        details: Option<serde_json::Value>,
        is_error: bool,
        timestamp: Timestamp,
    },
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Message::User {
            content: vec![ContentBlock::text(text)],
            timestamp: now_ms(),
        }
    }

    pub fn user_with_blocks(content: Vec<ContentBlock>) -> Self {
        Message::User {
            content,
            timestamp: now_ms(),
        }
    }

    pub fn assistant(content: Vec<ContentBlock>, model: impl Into<String>, provider: impl Into<String>, stop_reason: StopReason) -> Self {
        Message::Assistant {
            content,
            model: model.into(),
            provider: provider.into(),
            usage: Usage::default(),
            stop_reason,
            error: None,
            timestamp: now_ms(),
        }
    }

    pub fn assistant_error(message: impl Into<String>, model: impl Into<String>, provider: impl Into<String>) -> Self {
        Message::Assistant {
            content: Vec::new(),
            model: model.into(),
            provider: provider.into(),
            usage: Usage::default(),
            stop_reason: StopReason::Error,
            error: Some(message.into()),
            timestamp: now_ms(),
        }
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: Vec<ContentBlock>,
        is_error: bool,
    ) -> Self {
        Message::ToolResult {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            content,
            details: None,
            is_error,
            timestamp: now_ms(),
        }
    }

    pub fn content(&self) -> &[ContentBlock] {
        match self {
            Message::User { content, .. } => content,
            Message::Assistant { content, .. } => content,
            Message::ToolResult { content, .. } => content,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            Message::User { timestamp, .. } => *timestamp,
            Message::Assistant { timestamp, .. } => *timestamp,
            Message::ToolResult { timestamp, .. } => *timestamp,
        }
    }

    /// Tool-call directives carried by an assistant message, in emitted order.
    /// Empty for non-assistant messages.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        match self {
            Message::Assistant { content, .. } => {
                content.iter().filter_map(ContentBlock::as_tool_call).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Concatenation of every Text block's text, in order. Used by
    /// `Agent::run` (sub-agent direct invocation) to produce `final_text`.
    pub fn text(&self) -> String {
        self.content()
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn role_tag(&self) -> &'static str {
        match self {
            Message::User { .. } => "user",
            Message::Assistant { .. } => "assistant",
            Message::ToolResult { .. } => "tool_result",
        }
    }
}

/// The static shape of a callable tool: its name, human-readable description,
/// and a JSON Schema describing its argument mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_message_round_trips() {
        let msg = Message::user("hello");
        let s = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&s).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn assistant_tool_calls_extracted_in_order() {
        let msg = Message::assistant(
            vec![
                ContentBlock::text("checking"),
                ContentBlock::tool_call("c1", "echo", json!({"text": "a"})),
                ContentBlock::tool_call("c2", "echo", json!({"text": "b"})),
            ],
            "local-model",
            "openai-compat",
            StopReason::ToolUse,
        );
        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[1].id, "c2");
    }

    #[test]
    fn image_block_rejects_bad_mime() {
        let err = ContentBlock::image("abc123", "text/plain").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn image_block_rejects_empty_data() {
        let err = ContentBlock::image("", "image/png").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn tool_result_round_trips_with_error_flag() {
        let msg = Message::tool_result("c1", "echo", vec![ContentBlock::text("echo:world")], false);
        let s = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&s).unwrap();
        assert_eq!(msg, back);
        assert!(!matches!(&back, Message::ToolResult { is_error, .. } if *is_error));
    }

    #[test]
    fn message_text_concatenates_text_blocks_only() {
        let msg = Message::assistant(
            vec![
                ContentBlock::text("a"),
                ContentBlock::thinking("ignored"),
                ContentBlock::text("b"),
            ],
            "m",
            "p",
            StopReason::Stop,
        );
        assert_eq!(msg.text(), "ab");
    }
}
