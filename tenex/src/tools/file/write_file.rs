//! Write-file tool: create or overwrite a file within the sandbox.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::context::ExecutionContext;
use crate::tools::error::ToolError;
use crate::tools::r#trait::{Tool, ToolOutput, ToolSpec};

use super::path::resolve_sandboxed;

/// Tool name for writing a file.
pub const TOOL_WRITE_FILE: &str = "write_file";

/// Writes a file inside the working directory or the agent home, creating
/// parent directories as needed.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        TOOL_WRITE_FILE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            TOOL_WRITE_FILE,
            "Write content to a file, replacing it if it exists. The path must \
             be absolute and inside the working directory or your home directory \
             unless allow_outside_workdir is set.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Absolute path of the file to write."
                    },
                    "content": {
                        "type": "string",
                        "description": "Full content to write."
                    },
                    "allow_outside_workdir": {
                        "type": "boolean",
                        "description": "Permit writing outside the working directory."
                    }
                },
                "required": ["path", "content"]
            }),
        )
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<ToolOutput, ToolError> {
        let raw = input
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::missing_required("path"))?;
        let content = input
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::missing_required("content"))?;
        let allow_outside = input
            .get("allow_outside_workdir")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let path = resolve_sandboxed(raw, ctx, allow_outside)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ToolError::execution(
                    TOOL_WRITE_FILE,
                    format!("failed to create {}: {}", parent.display(), e),
                )
            })?;
        }
        tokio::fs::write(&path, content).await.map_err(|e| {
            ToolError::execution(
                TOOL_WRITE_FILE,
                format!("failed to write {}: {}", path.display(), e),
            )
        })?;

        Ok(
            ToolOutput::text(format!("Wrote {} bytes to {}", content.len(), path.display()))
                .with_typed(json!({
                    "path": path.display().to_string(),
                    "bytes": content.len(),
                })),
        )
    }

    fn describe_invocation(&self, input: &Value) -> Option<String> {
        input
            .get("path")
            .and_then(Value::as_str)
            .map(|p| format!("Writing {}", p))
    }
}
