//! Conversation messages: roles and text-or-parts content.
//!
//! A [`Message`] is either plain text or an ordered list of [`ContentPart`]s.
//! Tool-result parts reference a tool-call by opaque call id; the
//! [`Conversation`](crate::conversation::Conversation) enforces that the
//! referenced call appeared earlier in the same conversation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// One element of a parts-based message body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ContentPart {
    Text { text: String },
    Image { url: String },
    File {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
    ToolCall {
        call_id: String,
        name: String,
        input: Value,
    },
    ToolResult { call_id: String, output: String },
}

/// Message body: plain text or an ordered part list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// True when there is nothing in the body (empty text or empty part list).
    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(s) => s.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }

    /// Concatenates text parts; ignores media, tool calls, and tool results.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// Cache marker attached to a message for providers that require explicit
/// prompt-cache control.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheControl {
    Ephemeral,
}

/// One message in a conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl Message {
    /// Creates a plain-text message with the given role.
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
            cache_control: None,
        }
    }

    /// Creates a parts-based message with the given role.
    pub fn parts(role: Role, parts: Vec<ContentPart>) -> Self {
        Self {
            role,
            content: MessageContent::Parts(parts),
            cache_control: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Creates a tool message carrying one tool result.
    pub fn tool_result(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::parts(
            Role::Tool,
            vec![ContentPart::ToolResult {
                call_id: call_id.into(),
                output: output.into(),
            }],
        )
    }

    /// True when the content body is empty.
    pub fn content_is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Concatenated text of the body; see [`MessageContent::as_text`].
    pub fn as_text(&self) -> String {
        self.content.as_text()
    }

    /// Names of tool calls carried in this message's parts.
    pub fn tool_call_names(&self) -> Vec<&str> {
        match &self.content {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ToolCall { name, .. } => Some(name.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }
}
