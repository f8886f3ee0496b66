use async_trait::async_trait;
use serde_json::Value;

use super::context::ExecutionContext;
use super::error::ToolError;

/// Specification of one tool, shown to the model.
///
/// `input_schema` is a JSON-schema-shaped object with `properties`,
/// `required`, per-field `type`/`enum`/`description`. `prompt_fragment` is
/// optional text injected into the system prompt when the tool is offered.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub prompt_fragment: Option<String>,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            prompt_fragment: None,
        }
    }

    pub fn with_prompt_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.prompt_fragment = Some(fragment.into());
        self
    }
}

/// Output of one successful tool execution.
///
/// `human` is the string forwarded back into the model stream; `typed` is the
/// structured payload retained for audit, never sent to the model.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolOutput {
    pub human: String,
    pub typed: Option<Value>,
}

impl ToolOutput {
    pub fn text(human: impl Into<String>) -> Self {
        Self {
            human: human.into(),
            typed: None,
        }
    }

    pub fn with_typed(mut self, typed: Value) -> Self {
        self.typed = Some(typed);
        self
    }
}

/// Represents a single tool callable by the LLM.
///
/// Each tool has a unique name, a specification (description, schema, and an
/// optional prompt fragment), and an async executor. Tools are registered
/// with [`ToolRegistry`](super::ToolRegistry), which owns normalization,
/// schema validation, and the result envelope; executors receive the
/// validated input and a borrowed [`ExecutionContext`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name of this tool within a registry.
    fn name(&self) -> &str;

    /// Specification used to build the model-facing tool list.
    fn spec(&self) -> ToolSpec;

    /// Executes the tool with validated input.
    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<ToolOutput, ToolError>;

    /// Optional human-readable description of one invocation for trace UIs.
    fn describe_invocation(&self, _input: &Value) -> Option<String> {
        None
    }
}
