//! Tool-plane error taxonomy: validation, execution, system.

use thiserror::Error;

/// Errors produced while validating or executing a tool invocation.
///
/// All three kinds stay inside the result envelope and re-enter the model as
/// a textual result; none of them terminates the turn.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    /// Bad input shape. `field` names the offending parameter when known.
    #[error("{message}")]
    Validation { field: String, message: String },
    /// The tool ran but failed (non-zero exit, I/O error, remote rejection).
    #[error("{message}")]
    Execution { tool: String, message: String },
    /// Unexpected internal error; logged at error level.
    #[error("{message}")]
    System { message: String },
}

impl ToolError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError::Execution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        ToolError::System {
            message: message.into(),
        }
    }

    /// Missing-required-parameter error. An empty field name renders the
    /// bare "Missing required parameter" message.
    pub fn missing_required(field: &str) -> Self {
        let message = if field.is_empty() {
            "Missing required parameter".to_string()
        } else {
            format!("Missing required parameter: {}", field)
        };
        ToolError::Validation {
            field: field.to_string(),
            message,
        }
    }
}
