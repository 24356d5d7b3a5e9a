use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{StatusChange, StatusHistory, WorkflowStatus};

/// Status fields shared by Feature and Task.
///
/// Owned by the entity aggregate; `apply` is the only way the status
/// changes, and it always records exactly one history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState<S> {
    pub status: S,
    pub blocking_reason: Option<String>,
    pub blocked_by_id: Option<i64>,
    pub status_updated_at: DateTime<Utc>,
    pub status_history: StatusHistory<S>,
}

impl<S: WorkflowStatus> WorkflowState<S> {
    pub fn new(status: S, now: DateTime<Utc>) -> Self {
        Self {
            status,
            blocking_reason: None,
            blocked_by_id: None,
            status_updated_at: now,
            status_history: StatusHistory::default(),
        }
    }

    /// True when `(status, blocked_by_id, blocking_reason)` already equals the triple.
    pub fn matches(&self, status: S, blocked_by_id: Option<i64>, blocking_reason: Option<&str>) -> bool {
        self.status == status
            && self.blocked_by_id == blocked_by_id
            && self.blocking_reason.as_deref() == blocking_reason
    }

    pub fn apply(&mut self, change: StatusChange<S>, blocked_by_id: Option<i64>, blocking_reason: Option<String>) {
        self.status = change.status;
        self.blocked_by_id = blocked_by_id;
        self.blocking_reason = blocking_reason;
        self.status_updated_at = change.changed_at;
        self.status_history.record(change);
    }
}

/// An entity whose status moves through the transition engine.
pub trait Workflow {
    type Status: WorkflowStatus;

    fn id(&self) -> i64;
    fn workflow(&self) -> &WorkflowState<Self::Status>;
    fn workflow_mut(&mut self) -> &mut WorkflowState<Self::Status>;
}
