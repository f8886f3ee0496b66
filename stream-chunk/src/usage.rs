//! Token usage aggregated across the steps of one inference call.

use serde::{Deserialize, Serialize};

/// Token usage for one model call, aggregated across all stream steps.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageModelUsage {
    /// Tokens in the prompt (input).
    pub input_tokens: u64,
    /// Tokens in the completion (output).
    pub output_tokens: u64,
    /// Total tokens (input + output).
    pub total_tokens: u64,
    /// Input tokens served from a provider-side prompt cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input_tokens: Option<u64>,
    /// Tokens spent on reasoning, when the provider reports them separately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
    /// Cost in USD, when the provider reports it (e.g. OpenRouter).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    /// The model's declared context window, attached at finalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
}

impl LanguageModelUsage {
    /// Accumulates another step's usage into this one.
    ///
    /// Counters add; optional fields add when both sides are present, or take
    /// whichever side is set. `context_window` takes the latest non-`None`.
    pub fn add(&mut self, other: &LanguageModelUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
        self.cached_input_tokens = add_opt(self.cached_input_tokens, other.cached_input_tokens);
        self.reasoning_tokens = add_opt(self.reasoning_tokens, other.reasoning_tokens);
        self.cost_usd = match (self.cost_usd, other.cost_usd) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
        if other.context_window.is_some() {
            self.context_window = other.context_window;
        }
    }
}

fn add_opt(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a + b),
        (a, b) => a.or(b),
    }
}
