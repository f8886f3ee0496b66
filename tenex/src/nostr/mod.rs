//! Event-network collaborator interfaces.
//!
//! The runtime emits delegation events and user-signed events through the
//! external network client; this module owns the event shape, tag helpers,
//! id recomputation, and the [`EventPublisher`] / [`UserSigner`] seams. Key
//! management, relays, and signature crypto live in the collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Tag name carrying user-facing context for a remote signer. Stripped from
/// the event before id recomputation and publication.
pub const EXPLANATION_TAG: &str = "tenex_explanation";

/// Tag name for delegation follow-up hints.
pub const NUDGE_TAG: &str = "nudge";

/// One event on the network.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NostrEvent {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    #[serde(default)]
    pub sig: String,
}

impl NostrEvent {
    /// Computes the event id: sha256 over the canonical
    /// `[0, pubkey, created_at, kind, tags, content]` array, hex-encoded.
    pub fn compute_id(&self) -> String {
        let canonical = serde_json::json!([
            0,
            self.pubkey,
            self.created_at,
            self.kind,
            self.tags,
            self.content,
        ]);
        // Serialization of a JSON array of scalars and string arrays cannot fail.
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        let digest = Sha256::digest(&bytes);
        hex::encode(digest)
    }

    /// Recomputes and stores the id from the current payload.
    pub fn refresh_id(&mut self) {
        self.id = self.compute_id();
    }

    /// Values of all tags with the given name (first element match).
    pub fn tag_values(&self, name: &str) -> Vec<String> {
        self.tags
            .iter()
            .filter(|t| t.first().map(String::as_str) == Some(name))
            .filter_map(|t| t.get(1).cloned())
            .collect()
    }

    /// Nudge event ids carried on this event.
    pub fn nudge_tags(&self) -> Vec<String> {
        self.tag_values(NUDGE_TAG)
    }

    /// Removes every tag with the given name. Returns true if any was removed.
    pub fn strip_tag(&mut self, name: &str) -> bool {
        let before = self.tags.len();
        self.tags
            .retain(|t| t.first().map(String::as_str) != Some(name));
        self.tags.len() != before
    }

    /// Appends a `["name", value]` tag.
    pub fn push_tag(&mut self, name: &str, value: &str) {
        self.tags.push(vec![name.to_string(), value.to_string()]);
    }
}

/// Errors from the outbound publish path.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("relay rejected event: {0}")]
    Rejected(String),
    #[error("network: {0}")]
    Network(String),
}

/// Errors from the remote-signer path.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("bunker connect failed: {0}")]
    Connect(String),
    #[error("sign request failed: {0}")]
    Sign(String),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

/// Outbound event publication, signed with the daemon's own key by the
/// network client.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: NostrEvent) -> Result<(), PublishError>;
}

/// NIP-46 remote signer ("bunker"). Connection and signing are bounded by the
/// caller's timeouts; `verify` checks a signature over the event's current
/// payload.
#[async_trait]
pub trait UserSigner: Send + Sync {
    async fn connect(&self) -> Result<(), SignerError>;
    async fn sign_event(&self, event: NostrEvent) -> Result<NostrEvent, SignerError>;
    fn verify(&self, event: &NostrEvent) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_with_tags(tags: Vec<Vec<String>>) -> NostrEvent {
        NostrEvent {
            pubkey: "ab".repeat(32),
            created_at: 1_700_000_000,
            kind: 1,
            tags,
            content: "hello".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn compute_id_is_deterministic_and_payload_sensitive() {
        let a = event_with_tags(vec![]);
        let b = event_with_tags(vec![]);
        assert_eq!(a.compute_id(), b.compute_id());

        let mut c = event_with_tags(vec![]);
        c.content = "other".to_string();
        assert_ne!(a.compute_id(), c.compute_id());
    }

    #[test]
    fn strip_tag_changes_the_computed_id() {
        let mut e = event_with_tags(vec![vec![
            EXPLANATION_TAG.to_string(),
            "context for the user".to_string(),
        ]]);
        let with_tag = e.compute_id();
        assert!(e.strip_tag(EXPLANATION_TAG));
        assert_ne!(e.compute_id(), with_tag);
        assert!(!e.strip_tag(EXPLANATION_TAG));
    }

    #[test]
    fn nudge_tags_collects_values_in_order() {
        let e = event_with_tags(vec![
            vec![NUDGE_TAG.to_string(), "n1".to_string()],
            vec!["p".to_string(), "pk".to_string()],
            vec![NUDGE_TAG.to_string(), "n2".to_string()],
        ]);
        assert_eq!(e.nudge_tags(), vec!["n1", "n2"]);
    }
}
