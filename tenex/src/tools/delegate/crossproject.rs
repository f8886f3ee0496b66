//! `delegate_crossproject`: delegate to an agent in another project.
//!
//! The todo precondition is enforced only when an execution context carries a
//! conversation. Headless (MCP-only) callers have no local todo list to
//! consult, so enforcement is skipped for them; this asymmetry is
//! intentional.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::nostr::EventPublisher;
use crate::ral::{ProjectsRegistry, RalRegistry};
use crate::tools::context::ExecutionContext;
use crate::tools::error::ToolError;
use crate::tools::r#trait::{Tool, ToolOutput, ToolSpec};

use super::{run_delegation, todos_required};

/// Tool name for cross-project delegation.
pub const TOOL_DELEGATE_CROSSPROJECT: &str = "delegate_crossproject";

/// Delegates a request into another project, resolving the target agent slug
/// through the daemon's project registry.
pub struct CrossProjectDelegateTool {
    ral: Arc<RalRegistry>,
    publisher: Arc<dyn EventPublisher>,
    projects: Arc<ProjectsRegistry>,
}

impl CrossProjectDelegateTool {
    pub fn new(
        ral: Arc<RalRegistry>,
        publisher: Arc<dyn EventPublisher>,
        projects: Arc<ProjectsRegistry>,
    ) -> Self {
        Self {
            ral,
            publisher,
            projects,
        }
    }
}

#[async_trait]
impl Tool for CrossProjectDelegateTool {
    fn name(&self) -> &str {
        TOOL_DELEGATE_CROSSPROJECT
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            TOOL_DELEGATE_CROSSPROJECT,
            "Delegate a task to an agent in another project and wait for the response.",
            json!({
                "type": "object",
                "properties": {
                    "project_id": {
                        "type": "string",
                        "description": "Target project id."
                    },
                    "agent": {
                        "type": "string",
                        "description": "Agent slug in the target project, or \"any\"."
                    },
                    "request": {
                        "type": "string",
                        "description": "The task to delegate."
                    },
                    "nudges": { "type": "array" }
                },
                "required": ["project_id", "request"]
            }),
        )
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<ToolOutput, ToolError> {
        // MCP-only callers (no conversation) bypass the todo precondition.
        if let Some(conversation) = &ctx.conversation {
            if conversation.todos().is_empty() {
                return Err(todos_required(TOOL_DELEGATE_CROSSPROJECT));
            }
        }

        let project_id = input
            .get("project_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::missing_required("project_id"))?;
        let agent = input.get("agent").and_then(Value::as_str).unwrap_or("any");
        let request = input
            .get("request")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::missing_required("request"))?;
        let nudges = input
            .get("nudges")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let recipient = self
            .projects
            .resolve_agent(project_id, agent)
            .map_err(|e| ToolError::execution(TOOL_DELEGATE_CROSSPROJECT, e.to_string()))?;

        run_delegation(
            &self.ral,
            &self.publisher,
            ctx,
            TOOL_DELEGATE_CROSSPROJECT,
            vec![recipient],
            request,
            nudges,
            None,
            project_id.to_string(),
        )
        .await
    }
}
