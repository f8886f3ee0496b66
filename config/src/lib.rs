//! LLM configuration store: named provider configs, role defaults, and
//! per-provider credential merging.
//!
//! The router resolves names against a [`RouterConfig`]; this crate owns the
//! data model and the file-backed store (`llms.json` + `credentials.json`
//! under a project's `.tenex` directory). Resolution order and reload live in
//! the runtime's router, not here.

mod credentials;
mod provider;
mod store;

use thiserror::Error;

pub use credentials::{CredentialsStore, ProviderCredentials};
pub use provider::ProviderConfig;
pub use store::{load_router_config, CONFIG_FILE, CREDENTIALS_FILE};

use std::collections::BTreeMap;

/// Errors while loading or parsing configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Named provider configs plus role defaults.
///
/// `configs` maps a config name to a [`ProviderConfig`]; `defaults` maps a
/// role (e.g. "agents", "analyze", "orchestrator") to a config name.
/// `BTreeMap` keeps iteration deterministic for the router's
/// first-available fallback.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub configs: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

impl RouterConfig {
    /// Fills unset credential fields of every config from the provider-keyed
    /// credentials store. Explicit per-config values always win.
    pub fn merge_credentials(&mut self, credentials: &CredentialsStore) {
        for config in self.configs.values_mut() {
            if let Some(creds) = credentials.get(&config.provider) {
                if config.api_key.is_none() {
                    config.api_key = creds.api_key.clone();
                }
                if config.base_url.is_none() {
                    config.base_url = creds.base_url.clone();
                }
                if config.headers.is_none() {
                    config.headers = creds.headers.clone();
                }
            }
        }
    }
}
