//! Provider-keyed credentials, kept separate from the routing config so the
//! config file can be shared without secrets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Credentials for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

/// Map of provider id to credentials.
pub type CredentialsStore = BTreeMap<String, ProviderCredentials>;
