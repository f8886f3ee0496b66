//! Response-Accumulation Ledger: the registry of outstanding delegations.
//!
//! The registry maps monotonically increasing integer handles to delegation
//! records keyed jointly by (agent pubkey, conversation id, project id).
//! Mutations on one record are serialized behind its own lock; waiters
//! suspend on the record's notifier until it completes or aborts. Agents
//! never hold a record reference, only the `ral_number` handle, which breaks
//! the conversation/delegation reference cycle.

mod delegation;
pub mod projects;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Notify;

pub use delegation::{combine_nudges, DelegationSnapshot, DelegationStatus, ResponseRecord};
pub use projects::{
    AgentStore, ProjectInfo, ProjectResolveError, ProjectRuntime, ProjectsRegistry, StaticAgentMap,
};

/// Ledger errors.
#[derive(Debug, Error)]
pub enum RalError {
    #[error("no delegation record for ral number {0}")]
    NotFound(u64),
    #[error("expectation already registered for ral number {0}")]
    AlreadyRegistered(u64),
    #[error("no expectation registered for ral number {0}")]
    NotRegistered(u64),
    #[error("delegation {0} already completed")]
    Completed(u64),
    #[error("delegation {ral_number} aborted: {reason}")]
    Aborted { ral_number: u64, reason: String },
}

struct RecordState {
    recipients: Vec<String>,
    expected: Option<usize>,
    received: Vec<ResponseRecord>,
    nudges: BTreeSet<String>,
    status: DelegationStatus,
    abort_reason: Option<String>,
}

struct DelegationRecord {
    ral_number: u64,
    requesting_agent: String,
    conversation_id: String,
    project_id: String,
    created_at: chrono::DateTime<Utc>,
    state: Mutex<RecordState>,
    notify: Notify,
}

impl DelegationRecord {
    fn snapshot(&self) -> DelegationSnapshot {
        let state = self.state.lock().unwrap();
        DelegationSnapshot {
            ral_number: self.ral_number,
            requesting_agent: self.requesting_agent.clone(),
            conversation_id: self.conversation_id.clone(),
            project_id: self.project_id.clone(),
            recipients: state.recipients.clone(),
            expected_responses: state.expected,
            received: state.received.clone(),
            nudges: state.nudges.clone(),
            status: state.status,
            abort_reason: state.abort_reason.clone(),
            created_at: self.created_at,
        }
    }
}

/// Process-wide delegation ledger.
///
/// Constructible for tests and embeddings; [`RalRegistry::global`] returns
/// the daemon's shared instance.
#[derive(Default)]
pub struct RalRegistry {
    records: DashMap<u64, Arc<DelegationRecord>>,
    next: AtomicU64,
}

static GLOBAL: Lazy<RalRegistry> = Lazy::new(RalRegistry::new);

impl RalRegistry {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next: AtomicU64::new(1),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static RalRegistry {
        &GLOBAL
    }

    /// Allocates a new pending record and returns its handle.
    pub fn create(
        &self,
        requesting_agent: impl Into<String>,
        conversation_id: impl Into<String>,
        project_id: impl Into<String>,
    ) -> u64 {
        let ral_number = self.next.fetch_add(1, Ordering::SeqCst);
        let record = DelegationRecord {
            ral_number,
            requesting_agent: requesting_agent.into(),
            conversation_id: conversation_id.into(),
            project_id: project_id.into(),
            created_at: Utc::now(),
            state: Mutex::new(RecordState {
                recipients: Vec::new(),
                expected: None,
                received: Vec::new(),
                nudges: BTreeSet::new(),
                status: DelegationStatus::Pending,
                abort_reason: None,
            }),
            notify: Notify::new(),
        };
        self.records.insert(ral_number, Arc::new(record));
        tracing::debug!(ral_number, "delegation record created");
        ral_number
    }

    /// Point-in-time view of a record.
    pub fn get(&self, ral_number: u64) -> Result<DelegationSnapshot, RalError> {
        self.record(ral_number).map(|r| r.snapshot())
    }

    /// Sets the expected response count, recipients, and nudge set. May be
    /// called at most once per record; an expectation of zero completes the
    /// record immediately.
    pub fn register_expectation(
        &self,
        ral_number: u64,
        count: usize,
        recipients: Vec<String>,
        nudges: BTreeSet<String>,
    ) -> Result<(), RalError> {
        let record = self.record(ral_number)?;
        let mut state = record.state.lock().unwrap();
        if state.expected.is_some() {
            return Err(RalError::AlreadyRegistered(ral_number));
        }
        state.expected = Some(count);
        state.recipients = recipients;
        state.nudges = nudges;
        if count == 0 {
            state.status = DelegationStatus::Complete;
            drop(state);
            record.notify.notify_waiters();
        }
        Ok(())
    }

    /// Appends a response. When the count reaches the expectation the record
    /// transitions to complete and waiters wake. Responses past completion
    /// are rejected, which keeps `received.len() <= expected` at all times.
    pub fn record_response(
        &self,
        ral_number: u64,
        from_pubkey: impl Into<String>,
        payload: Value,
    ) -> Result<DelegationStatus, RalError> {
        let record = self.record(ral_number)?;
        let mut state = record.state.lock().unwrap();
        match state.status {
            DelegationStatus::Complete => return Err(RalError::Completed(ral_number)),
            DelegationStatus::Aborted => {
                return Err(RalError::Aborted {
                    ral_number,
                    reason: state.abort_reason.clone().unwrap_or_default(),
                })
            }
            DelegationStatus::Pending => {}
        }
        let expected = state.expected.ok_or(RalError::NotRegistered(ral_number))?;

        state.received.push(ResponseRecord {
            from_pubkey: from_pubkey.into(),
            payload,
            received_at: Utc::now(),
        });
        let status = if state.received.len() >= expected {
            state.status = DelegationStatus::Complete;
            DelegationStatus::Complete
        } else {
            DelegationStatus::Pending
        };
        drop(state);
        if status == DelegationStatus::Complete {
            tracing::debug!(ral_number, "delegation complete");
            record.notify.notify_waiters();
        }
        Ok(status)
    }

    /// Suspends until the record completes, returning its responses, or
    /// surfaces the abort as an error.
    pub async fn wait(&self, ral_number: u64) -> Result<Vec<ResponseRecord>, RalError> {
        let record = self.record(ral_number)?;
        loop {
            let notified = record.notify.notified();
            {
                let state = record.state.lock().unwrap();
                match state.status {
                    DelegationStatus::Complete => return Ok(state.received.clone()),
                    DelegationStatus::Aborted => {
                        return Err(RalError::Aborted {
                            ral_number,
                            reason: state.abort_reason.clone().unwrap_or_default(),
                        })
                    }
                    DelegationStatus::Pending => {}
                }
            }
            notified.await;
        }
    }

    /// Aborts a pending record and wakes its waiters. No-op when the record
    /// already completed or aborted.
    pub fn abort(&self, ral_number: u64, reason: impl Into<String>) -> Result<(), RalError> {
        let record = self.record(ral_number)?;
        let mut state = record.state.lock().unwrap();
        if state.status == DelegationStatus::Pending {
            state.status = DelegationStatus::Aborted;
            state.abort_reason = Some(reason.into());
            drop(state);
            record.notify.notify_waiters();
        }
        Ok(())
    }

    fn record(&self, ral_number: u64) -> Result<Arc<DelegationRecord>, RalError> {
        self.records
            .get(&ral_number)
            .map(|r| Arc::clone(r.value()))
            .ok_or(RalError::NotFound(ral_number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn handles_are_monotonic() {
        let ral = RalRegistry::new();
        let a = ral.create("agent", "conv", "project");
        let b = ral.create("agent", "conv", "project");
        assert!(b > a);
    }

    #[test]
    fn register_expectation_is_once_only() {
        let ral = RalRegistry::new();
        let n = ral.create("a", "c", "p");
        ral.register_expectation(n, 2, vec!["pk1".into(), "pk2".into()], BTreeSet::new())
            .unwrap();
        let err = ral
            .register_expectation(n, 2, vec![], BTreeSet::new())
            .unwrap_err();
        assert!(matches!(err, RalError::AlreadyRegistered(_)));
    }

    #[test]
    fn response_before_registration_is_rejected() {
        let ral = RalRegistry::new();
        let n = ral.create("a", "c", "p");
        let err = ral.record_response(n, "pk1", json!({})).unwrap_err();
        assert!(matches!(err, RalError::NotRegistered(_)));
    }

    #[tokio::test]
    async fn completes_when_count_reaches_expectation() {
        let ral = RalRegistry::new();
        let n = ral.create("a", "c", "p");
        ral.register_expectation(n, 2, vec!["pk1".into(), "pk2".into()], BTreeSet::new())
            .unwrap();

        let status = ral.record_response(n, "pk1", json!({ "r": 1 })).unwrap();
        assert_eq!(status, DelegationStatus::Pending);
        let status = ral.record_response(n, "pk2", json!({ "r": 2 })).unwrap();
        assert_eq!(status, DelegationStatus::Complete);

        let responses = ral.wait(n).await.unwrap();
        assert_eq!(responses.len(), 2);

        // received.len() never exceeds the expectation.
        let err = ral.record_response(n, "pk3", json!({})).unwrap_err();
        assert!(matches!(err, RalError::Completed(_)));
        let snap = ral.get(n).unwrap();
        assert_eq!(snap.received.len(), snap.expected_responses.unwrap());
    }

    #[tokio::test]
    async fn wait_suspends_until_completion() {
        let ral = Arc::new(RalRegistry::new());
        let n = ral.create("a", "c", "p");
        ral.register_expectation(n, 1, vec!["pk1".into()], BTreeSet::new())
            .unwrap();

        let waiter = {
            let ral = Arc::clone(&ral);
            tokio::spawn(async move { ral.wait(n).await })
        };
        tokio::task::yield_now().await;
        ral.record_response(n, "pk1", json!({ "ok": true })).unwrap();

        let responses = waiter.await.unwrap().unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].payload["ok"], true);
    }

    #[tokio::test]
    async fn abort_wakes_waiters_with_the_reason() {
        let ral = Arc::new(RalRegistry::new());
        let n = ral.create("a", "c", "p");
        ral.register_expectation(n, 1, vec!["pk1".into()], BTreeSet::new())
            .unwrap();

        let waiter = {
            let ral = Arc::clone(&ral);
            tokio::spawn(async move { ral.wait(n).await })
        };
        tokio::task::yield_now().await;
        ral.abort(n, "turn cancelled").unwrap();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, RalError::Aborted { reason, .. } if reason == "turn cancelled"));
    }

    #[tokio::test]
    async fn zero_expectation_completes_immediately() {
        let ral = RalRegistry::new();
        let n = ral.create("a", "c", "p");
        ral.register_expectation(n, 0, vec![], BTreeSet::new())
            .unwrap();
        let responses = ral.wait(n).await.unwrap();
        assert!(responses.is_empty());
    }

    #[test]
    fn unknown_handle_is_not_found() {
        let ral = RalRegistry::new();
        assert!(matches!(ral.get(99), Err(RalError::NotFound(99))));
    }
}
