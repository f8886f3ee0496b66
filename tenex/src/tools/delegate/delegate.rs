//! `delegate` and `delegate_phase`: in-project delegation to named agents.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::nostr::EventPublisher;
use crate::ral::RalRegistry;
use crate::tools::context::ExecutionContext;
use crate::tools::error::ToolError;
use crate::tools::r#trait::{Tool, ToolOutput, ToolSpec};

use super::{enforce_todos, run_delegation};

/// Tool name for plain delegation.
pub const TOOL_DELEGATE: &str = "delegate";

/// Tool name for phase-tagged delegation.
pub const TOOL_DELEGATE_PHASE: &str = "delegate_phase";

fn string_array(input: &Value, field: &str) -> Result<Vec<String>, ToolError> {
    match input.get(field) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ToolError::validation(field, format!("{} must be strings", field)))
            })
            .collect(),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        None => Ok(Vec::new()),
        Some(_) => Err(ToolError::validation(
            field,
            format!("{} must be an array of strings", field),
        )),
    }
}

/// Delegates a request to one or more agents in the current project and
/// waits for all of their responses.
///
/// Requires a non-empty todo list on the conversation; the ledger record's
/// nudge set combines the triggering event's nudges with explicit ones.
pub struct DelegateTool {
    ral: Arc<RalRegistry>,
    publisher: Arc<dyn EventPublisher>,
}

impl DelegateTool {
    pub fn new(ral: Arc<RalRegistry>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { ral, publisher }
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        TOOL_DELEGATE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            TOOL_DELEGATE,
            "Delegate a task to one or more agents and wait for their responses.",
            json!({
                "type": "object",
                "properties": {
                    "recipients": {
                        "type": "array",
                        "description": "Pubkeys of the agents to delegate to."
                    },
                    "request": {
                        "type": "string",
                        "description": "The task to delegate."
                    },
                    "nudges": {
                        "type": "array",
                        "description": "Extra nudge event ids to attach."
                    }
                },
                "required": ["recipients", "request"]
            }),
        )
        .with_prompt_fragment(
            "Use delegate(recipients, request) to hand a sub-task to other \
             agents. Keep your todo list current with todo_write() first.",
        )
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<ToolOutput, ToolError> {
        enforce_todos(ctx, TOOL_DELEGATE)?;
        let recipients = string_array(&input, "recipients")?;
        let request = input
            .get("request")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::missing_required("request"))?;
        let nudges = string_array(&input, "nudges")?;
        let project_id = ctx.project.as_ref().map(|p| p.id.clone()).unwrap_or_default();

        run_delegation(
            &self.ral,
            &self.publisher,
            ctx,
            TOOL_DELEGATE,
            recipients,
            request,
            nudges,
            None,
            project_id,
        )
        .await
    }

    fn describe_invocation(&self, input: &Value) -> Option<String> {
        input
            .get("request")
            .and_then(Value::as_str)
            .map(|r| format!("Delegating: {}", r))
    }
}

/// Like [`DelegateTool`], with an explicit conversation phase tagged onto the
/// outbound event.
pub struct DelegatePhaseTool {
    ral: Arc<RalRegistry>,
    publisher: Arc<dyn EventPublisher>,
}

impl DelegatePhaseTool {
    pub fn new(ral: Arc<RalRegistry>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { ral, publisher }
    }
}

#[async_trait]
impl Tool for DelegatePhaseTool {
    fn name(&self) -> &str {
        TOOL_DELEGATE_PHASE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            TOOL_DELEGATE_PHASE,
            "Delegate a task for a specific phase of the conversation.",
            json!({
                "type": "object",
                "properties": {
                    "recipients": { "type": "array" },
                    "request": { "type": "string" },
                    "phase": {
                        "type": "string",
                        "description": "Phase tag for the delegation (e.g. plan, build, verify)."
                    },
                    "nudges": { "type": "array" }
                },
                "required": ["recipients", "request", "phase"]
            }),
        )
    }

    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<ToolOutput, ToolError> {
        enforce_todos(ctx, TOOL_DELEGATE_PHASE)?;
        let recipients = string_array(&input, "recipients")?;
        let request = input
            .get("request")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::missing_required("request"))?;
        let phase = input
            .get("phase")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::missing_required("phase"))?;
        let nudges = string_array(&input, "nudges")?;
        let project_id = ctx.project.as_ref().map(|p| p.id.clone()).unwrap_or_default();

        run_delegation(
            &self.ral,
            &self.publisher,
            ctx,
            TOOL_DELEGATE_PHASE,
            recipients,
            request,
            nudges,
            Some(phase),
            project_id,
        )
        .await
    }
}
