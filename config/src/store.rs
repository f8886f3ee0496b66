//! File-backed store: `llms.json` and `credentials.json` under `.tenex`.

use std::path::Path;

use crate::{ConfigError, CredentialsStore, RouterConfig};

/// Routing config file name under the `.tenex` directory.
pub const CONFIG_FILE: &str = "llms.json";
/// Credentials file name under the `.tenex` directory.
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// Loads the router configuration from `<dir>/llms.json` and merges
/// credentials from `<dir>/credentials.json` when present.
///
/// A missing credentials file is not an error; a missing config file yields
/// the empty config (the router reports "No LLM configurations available" on
/// first resolve).
pub fn load_router_config(dir: impl AsRef<Path>) -> Result<RouterConfig, ConfigError> {
    let dir = dir.as_ref();

    let config_path = dir.join(CONFIG_FILE);
    let mut router = if config_path.exists() {
        let raw = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: config_path.display().to_string(),
            source,
        })?
    } else {
        RouterConfig::default()
    };

    let creds_path = dir.join(CREDENTIALS_FILE);
    if creds_path.exists() {
        let raw = std::fs::read_to_string(&creds_path).map_err(|source| ConfigError::Read {
            path: creds_path.display().to_string(),
            source,
        })?;
        let creds: CredentialsStore =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: creds_path.display().to_string(),
                source,
            })?;
        router.merge_credentials(&creds);
    }

    Ok(router)
}
