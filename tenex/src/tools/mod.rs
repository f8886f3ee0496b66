//! Tool plane: validated, sandboxed tool invocations with a serializable
//! result envelope.
//!
//! [`ToolRegistry`] owns the tool set for one service; [`ToolRegistry::run`]
//! is the single execution path: normalize the raw input, validate it against
//! the tool's schema, execute with a borrowed [`ExecutionContext`], time it,
//! and wrap the outcome in a [`ToolResultEnvelope`] regardless of success or
//! failure.

pub mod context;
pub mod delegate;
mod envelope;
mod error;
pub mod file;
pub mod publish;
mod schema;
mod r#trait;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

pub use context::{ExecutionContext, ProjectRef};
pub use delegate::{
    is_delegation_tool, CrossProjectDelegateTool, DelegateFollowupTool, DelegatePhaseTool,
    DelegateTool, DELEGATION_TOOL_NAMES, TOOL_DELEGATE, TOOL_DELEGATE_CROSSPROJECT,
    TOOL_DELEGATE_EXTERNAL, TOOL_DELEGATE_FOLLOWUP, TOOL_DELEGATE_PHASE,
};
pub use envelope::{EnvelopeError, EnvelopeErrorKind, ToolResultEnvelope, UNKNOWN_SENTINEL};
pub use error::ToolError;
pub use file::{GrepTool, ReadFileTool, WriteFileTool, TOOL_GREP, TOOL_READ_FILE, TOOL_WRITE_FILE};
pub use publish::{PublishAsUserTool, TOOL_PUBLISH_AS_USER};
pub use r#trait::{Tool, ToolOutput, ToolSpec};
pub use schema::{normalize_input, validate_input};

use crate::provider::ToolDefinition;

/// One transient invocation: raw input in, validated input recorded, one
/// execute call, envelope out.
#[derive(Clone, Debug)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub call_id: String,
    pub raw_input: Value,
    pub validated_input: Option<Value>,
}

/// Outcome of [`ToolRegistry::run`]: the envelope plus the typed payload
/// retained for audit (never forwarded to the model).
#[derive(Clone, Debug)]
pub struct InvocationResult {
    pub envelope: ToolResultEnvelope,
    pub typed_output: Option<Value>,
}

/// Name-keyed tool set. Registration replaces an existing tool of the same
/// name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Specs of all registered tools, sorted by name for determinism.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Model-facing tool definitions for a provider request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.specs()
            .into_iter()
            .map(|s| ToolDefinition {
                name: s.name,
                description: s.description,
                parameters: s.input_schema,
            })
            .collect()
    }

    /// Prompt fragments of all registered tools, in name order.
    pub fn prompt_fragments(&self) -> Vec<String> {
        self.specs()
            .into_iter()
            .filter_map(|s| s.prompt_fragment)
            .collect()
    }

    /// Runs one invocation end-to-end. Every outcome, including an unknown
    /// tool name or a validation failure, is returned as an envelope.
    pub async fn run(
        &self,
        mut invocation: ToolInvocation,
        ctx: &ExecutionContext,
    ) -> InvocationResult {
        let started = Instant::now();
        let name = invocation.tool_name.clone();
        let raw = invocation.raw_input.clone();

        let Some(tool) = self.tools.get(&name) else {
            let err = ToolError::execution(&name, format!("Tool not found: {}", name));
            return InvocationResult {
                envelope: ToolResultEnvelope::failure(
                    &name,
                    raw,
                    elapsed_ms(started),
                    &err,
                ),
                typed_output: None,
            };
        };

        let normalized = normalize_input(invocation.raw_input.clone());
        let validated = match validate_input(&tool.spec().input_schema, normalized) {
            Ok(v) => v,
            Err(err) => {
                tracing::debug!(tool = %name, error = %err, "tool input validation failed");
                return InvocationResult {
                    envelope: ToolResultEnvelope::failure(
                        &name,
                        raw,
                        elapsed_ms(started),
                        &err,
                    ),
                    typed_output: None,
                };
            }
        };
        invocation.validated_input = Some(validated.clone());

        match tool.execute(validated, ctx).await {
            Ok(output) => InvocationResult {
                envelope: ToolResultEnvelope::success(
                    &name,
                    raw,
                    elapsed_ms(started),
                    output.human,
                ),
                typed_output: output.typed,
            },
            Err(err) => {
                if matches!(err, ToolError::System { .. }) {
                    tracing::error!(tool = %name, error = %err, "tool system error");
                } else {
                    tracing::debug!(tool = %name, error = %err, "tool execution failed");
                }
                InvocationResult {
                    envelope: ToolResultEnvelope::failure(
                        &name,
                        raw,
                        elapsed_ms(started),
                        &err,
                    ),
                    typed_output: None,
                }
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec::new(
                "echo",
                "Echoes the text parameter.",
                json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"]
                }),
            )
        }

        async fn execute(
            &self,
            input: Value,
            _ctx: &ExecutionContext,
        ) -> Result<ToolOutput, ToolError> {
            let text = input.get("text").and_then(Value::as_str).unwrap_or("");
            Ok(ToolOutput::text(text).with_typed(json!({ "echoed": text })))
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("pk", "conv", "/tmp")
    }

    fn invocation(name: &str, raw: Value) -> ToolInvocation {
        ToolInvocation {
            tool_name: name.to_string(),
            call_id: "c1".to_string(),
            raw_input: raw,
            validated_input: None,
        }
    }

    #[tokio::test]
    async fn run_success_wraps_output_and_typed_payload() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let result = registry
            .run(invocation("echo", json!({ "text": "hi" })), &ctx())
            .await;
        assert!(result.envelope.success);
        assert_eq!(result.envelope.output.as_deref(), Some("hi"));
        assert_eq!(result.typed_output.unwrap()["echoed"], "hi");
    }

    #[tokio::test]
    async fn run_unknown_tool_yields_execution_error_envelope() {
        let registry = ToolRegistry::new();
        let result = registry.run(invocation("nope", json!({})), &ctx()).await;
        assert!(!result.envelope.success);
        let error = result.envelope.error.unwrap();
        assert_eq!(error.kind, EnvelopeErrorKind::Execution);
        assert!(error.message.contains("Tool not found"));
    }

    #[tokio::test]
    async fn run_normalizes_empty_string_input_before_validation() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        // "" normalizes to {}, which then fails required-field validation.
        let result = registry.run(invocation("echo", json!("")), &ctx()).await;
        let error = result.envelope.error.unwrap();
        assert_eq!(error.kind, EnvelopeErrorKind::Validation);
        assert_eq!(error.message, "Missing required parameter: text");
    }

    #[tokio::test]
    async fn registry_specs_are_name_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let specs = registry.specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "echo");
        assert_eq!(registry.definitions()[0].name, "echo");
    }
}
