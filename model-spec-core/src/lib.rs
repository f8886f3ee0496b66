//! Model specification types shared by the runtime's resolvers.
//!
//! A [`ModelSpec`] carries the token limits and optional per-token cost of one
//! model. The JSON parser understands the models.dev shape
//! (`limit.context` / `limit.output`, `cost.input` / `cost.output`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Model token limit and cost specification.
///
/// The service attaches `context_limit` to finalized usage as the model's
/// declared context window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Context (input) token limit.
    pub context_limit: u32,
    /// Output token limit.
    pub output_limit: u32,
    /// Optional cache read token limit.
    #[serde(default)]
    pub cache_read: Option<u32>,
    /// Optional cache write token limit.
    #[serde(default)]
    pub cache_write: Option<u32>,
    /// Optional input cost in USD per million tokens.
    #[serde(default)]
    pub input_cost_per_mtok: Option<f64>,
    /// Optional output cost in USD per million tokens.
    #[serde(default)]
    pub output_cost_per_mtok: Option<f64>,
}

impl ModelSpec {
    /// Create a new `ModelSpec` with required limits.
    pub fn new(context_limit: u32, output_limit: u32) -> Self {
        Self {
            context_limit,
            output_limit,
            cache_read: None,
            cache_write: None,
            input_cost_per_mtok: None,
            output_cost_per_mtok: None,
        }
    }

    /// Set optional cache read limit.
    pub fn with_cache_read(mut self, limit: u32) -> Self {
        self.cache_read = Some(limit);
        self
    }

    /// Set optional cache write limit.
    pub fn with_cache_write(mut self, limit: u32) -> Self {
        self.cache_write = Some(limit);
        self
    }

    /// Set optional per-million-token costs.
    pub fn with_cost(mut self, input: f64, output: f64) -> Self {
        self.input_cost_per_mtok = Some(input);
        self.output_cost_per_mtok = Some(output);
        self
    }
}

/// Parse a `ModelSpec` from a model JSON object in the models.dev shape.
///
/// Requires `limit.context` and `limit.output`; `limit.cache_read`,
/// `limit.cache_write`, `cost.input`, and `cost.output` are optional.
pub fn parse_model_spec(model: &Value) -> Option<ModelSpec> {
    let limit = model.get("limit")?;
    let context = limit.get("context")?.as_u64()? as u32;
    let output = limit.get("output")?.as_u64()? as u32;

    let mut spec = ModelSpec::new(context, output);
    if let Some(v) = limit.get("cache_read").and_then(|v| v.as_u64()) {
        spec.cache_read = Some(v as u32);
    }
    if let Some(v) = limit.get("cache_write").and_then(|v| v.as_u64()) {
        spec.cache_write = Some(v as u32);
    }
    if let Some(cost) = model.get("cost") {
        spec.input_cost_per_mtok = cost.get("input").and_then(|v| v.as_f64());
        spec.output_cost_per_mtok = cost.get("output").and_then(|v| v.as_f64());
    }
    Some(spec)
}
