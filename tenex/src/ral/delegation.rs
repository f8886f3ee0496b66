//! Delegation records tracked by the ledger.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// One response received for a pending delegation.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseRecord {
    pub from_pubkey: String,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

/// Lifecycle of a delegation record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DelegationStatus {
    Pending,
    Complete,
    Aborted,
}

/// Point-in-time view of one delegation record.
///
/// Agents hold the numeric `ral_number` handle only; the registry owns the
/// record. `received.len() <= expected_responses` holds at all times, and the
/// status is `Complete` exactly when they are equal.
#[derive(Clone, Debug)]
pub struct DelegationSnapshot {
    pub ral_number: u64,
    pub requesting_agent: String,
    pub conversation_id: String,
    pub project_id: String,
    pub recipients: Vec<String>,
    pub expected_responses: Option<usize>,
    pub received: Vec<ResponseRecord>,
    pub nudges: BTreeSet<String>,
    pub status: DelegationStatus,
    pub abort_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Combines inherited and explicit nudge ids into a deduplicated set.
/// Order is not observable; the set compares by membership.
pub fn combine_nudges<I, E>(inherited: I, explicit: E) -> BTreeSet<String>
where
    I: IntoIterator<Item = String>,
    E: IntoIterator<Item = String>,
{
    inherited.into_iter().chain(explicit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_nudges_dedups_across_sources() {
        let set = combine_nudges(
            vec!["N1".to_string(), "N2".to_string()],
            vec!["N2".to_string(), "N3".to_string()],
        );
        assert_eq!(set.len(), 3);
        assert!(set.contains("N1"));
        assert!(set.contains("N2"));
        assert!(set.contains("N3"));
    }

    #[test]
    fn combine_nudges_order_is_not_observable() {
        let a = combine_nudges(vec!["b".to_string()], vec!["a".to_string()]);
        let b = combine_nudges(vec!["a".to_string()], vec!["b".to_string()]);
        assert_eq!(a, b);
    }
}
