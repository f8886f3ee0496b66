//! Read-file tool: return a file's contents from within the sandbox.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::context::ExecutionContext;
use crate::tools::error::ToolError;
use crate::tools::r#trait::{Tool, ToolOutput, ToolSpec};

use super::path::resolve_sandboxed;

/// Tool name for reading a file.
pub const TOOL_READ_FILE: &str = "read_file";

/// Reads a file inside the working directory or the agent home.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        TOOL_READ_FILE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            TOOL_READ_FILE,
            "Read a file. The path must be absolute and inside the working \
             directory or your home directory unless allow_outside_workdir is set.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Absolute path of the file to read."
                    },
                    "allow_outside_workdir": {
                        "type": "boolean",
                        "description": "Permit reading outside the working directory."
                    }
                },
                "required": ["path"]
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
        let allow_outside = input
            .get("allow_outside_workdir")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let path = resolve_sandboxed(raw, ctx, allow_outside)?;
        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
            ToolError::execution(
                TOOL_READ_FILE,
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;

        let line_count = contents.lines().count();
        Ok(ToolOutput::text(contents).with_typed(json!({
            "path": path.display().to_string(),
            "lines": line_count,
        })))
    }

    fn describe_invocation(&self, input: &Value) -> Option<String> {
        input
            .get("path")
            .and_then(Value::as_str)
            .map(|p| format!("Reading {}", p))
    }
}
