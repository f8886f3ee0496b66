//! Serializable result envelope returned by every tool invocation.
//!
//! The envelope round-trips through serde with one deliberate degradation:
//! `error.field` and `error.tool` are not serialized, and deserialize to the
//! sentinel `"unknown"`. Everything else is preserved exactly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ToolError;

/// Sentinel for error detail fields lost in serialization.
pub const UNKNOWN_SENTINEL: &str = "unknown";

fn unknown() -> String {
    UNKNOWN_SENTINEL.to_string()
}

/// Error kind carried inside an envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeErrorKind {
    Validation,
    Execution,
    System,
}

/// Error detail inside a failed envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub kind: EnvelopeErrorKind,
    pub message: String,
    /// Offending parameter for validation errors. Not serialized; degrades
    /// to "unknown" on deserialize.
    #[serde(skip_serializing, default = "unknown")]
    pub field: String,
    /// Failing tool for execution errors. Not serialized; degrades to
    /// "unknown" on deserialize.
    #[serde(skip_serializing, default = "unknown")]
    pub tool: String,
}

/// Result of one tool invocation, success or failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultEnvelope {
    pub success: bool,
    pub duration_ms: u64,
    pub tool_name: String,
    pub tool_args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

impl ToolResultEnvelope {
    /// Successful envelope with the human-readable output.
    pub fn success(
        tool_name: impl Into<String>,
        tool_args: Value,
        duration_ms: u64,
        output: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            duration_ms,
            tool_name: tool_name.into(),
            tool_args,
            output: Some(output.into()),
            error: None,
        }
    }

    /// Failed envelope built from a tool error.
    pub fn failure(
        tool_name: impl Into<String>,
        tool_args: Value,
        duration_ms: u64,
        error: &ToolError,
    ) -> Self {
        let tool_name = tool_name.into();
        let error = match error {
            ToolError::Validation { field, message } => EnvelopeError {
                kind: EnvelopeErrorKind::Validation,
                message: message.clone(),
                field: field.clone(),
                tool: tool_name.clone(),
            },
            ToolError::Execution { tool, message } => EnvelopeError {
                kind: EnvelopeErrorKind::Execution,
                message: message.clone(),
                field: String::new(),
                tool: tool.clone(),
            },
            ToolError::System { message } => EnvelopeError {
                kind: EnvelopeErrorKind::System,
                message: message.clone(),
                field: String::new(),
                tool: tool_name.clone(),
            },
        };
        Self {
            success: false,
            duration_ms,
            tool_name,
            tool_args,
            output: None,
            error: Some(error),
        }
    }

    /// The text that re-enters the model stream: the output on success, the
    /// error message on failure.
    pub fn model_text(&self) -> String {
        if self.success {
            self.output.clone().unwrap_or_default()
        } else {
            self.error
                .as_ref()
                .map(|e| format!("Error: {}", e.message))
                .unwrap_or_else(|| "Error: tool failed".to_string())
        }
    }
}
