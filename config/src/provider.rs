//! Resolved provider configuration: the provider+model+credential triple.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One named LLM endpoint configuration.
///
/// `provider` selects the adapter ("openrouter", "ollama", "claude-code", or
/// a generic OpenAI-compatible backend); `model` is the provider's model id.
/// Credential fields left unset are filled by
/// [`RouterConfig::merge_credentials`](crate::RouterConfig::merge_credentials).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_caching: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ProviderConfig {
    /// Creates a config with the given provider and model; everything else unset.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            api_key: None,
            base_url: None,
            headers: None,
            enable_caching: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// "provider:model" label used in logs.
    pub fn label(&self) -> String {
        format!("{}:{}", self.provider, self.model)
    }
}
