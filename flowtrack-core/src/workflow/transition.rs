//! Transition rules, independent of storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkflowError};
use crate::models::{StatusChange, Workflow, WorkflowStatus};

/// Reason recorded when a transition gives none.
pub const DEFAULT_REASON: &str = "Status updated";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionRequest<S> {
    pub target: S,
    pub blocking_reason: Option<String>,
    pub blocked_by_id: Option<i64>,
    /// Falls back to the configured default actor.
    pub changed_by: Option<String>,
}

impl<S: WorkflowStatus> TransitionRequest<S> {
    pub fn to(target: S) -> Self {
        Self {
            target,
            blocking_reason: None,
            blocked_by_id: None,
            changed_by: None,
        }
    }

    pub fn blocked(blocked_by_id: i64, reason: impl Into<String>) -> Self {
        Self {
            target: S::BLOCKED,
            blocking_reason: Some(reason.into()),
            blocked_by_id: Some(blocked_by_id),
            changed_by: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.blocking_reason = Some(reason.into());
        self
    }

    pub fn by(mut self, actor: impl Into<String>) -> Self {
        self.changed_by = Some(actor.into());
        self
    }

    fn reason(&self) -> Option<&str> {
        self.blocking_reason
            .as_deref()
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
    }
}

/// What a validated request will do to the entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionPlan<S> {
    /// The requested status and blocking fields are already in place.
    AlreadyCurrent,
    Apply {
        change: StatusChange<S>,
        blocked_by_id: Option<i64>,
        blocking_reason: Option<String>,
    },
}

/// Validate `request` against the entity's current state.
///
/// `blocker_exists` is asked about the blocking entity (same kind) only
/// when one is named. Only direct self-blocking is rejected; longer cycles
/// such as A blocks B blocks A are accepted.
pub fn plan_transition<E, F>(
    entity: &E,
    request: &TransitionRequest<E::Status>,
    actor: &str,
    now: DateTime<Utc>,
    blocker_exists: F,
) -> Result<TransitionPlan<E::Status>>
where
    E: Workflow,
    F: FnOnce(i64) -> Result<bool>,
{
    let kind = <E::Status as WorkflowStatus>::KIND;
    let reason = request.reason();

    if request.target.is_blocked() && (reason.is_none() || request.blocked_by_id.is_none()) {
        return Err(WorkflowError::MissingBlockingInfo { kind });
    }

    if let Some(blocker) = request.blocked_by_id {
        if blocker == entity.id() {
            return Err(WorkflowError::SelfBlockingNotAllowed {
                kind,
                id: blocker,
            });
        }
        if !blocker_exists(blocker)? {
            return Err(WorkflowError::BlockingEntityNotFound { kind, id: blocker });
        }
    }

    // Blocking fields only survive on a `blocked` entity.
    let (blocked_by_id, blocking_reason) = if request.target.is_blocked() {
        (request.blocked_by_id, reason)
    } else {
        (None, None)
    };

    if entity
        .workflow()
        .matches(request.target, blocked_by_id, blocking_reason)
    {
        return Ok(TransitionPlan::AlreadyCurrent);
    }

    Ok(TransitionPlan::Apply {
        change: StatusChange {
            status: request.target,
            changed_at: now,
            changed_by: request
                .changed_by
                .clone()
                .unwrap_or_else(|| actor.to_string()),
            reason: reason.unwrap_or(DEFAULT_REASON).to_string(),
        },
        blocked_by_id,
        blocking_reason: blocking_reason.map(str::to_string),
    })
}

/// Apply a plan to the aggregate. Returns false for `AlreadyCurrent`.
pub fn apply_plan<E: Workflow>(entity: &mut E, plan: TransitionPlan<E::Status>) -> bool {
    match plan {
        TransitionPlan::AlreadyCurrent => false,
        TransitionPlan::Apply {
            change,
            blocked_by_id,
            blocking_reason,
        } => {
            entity
                .workflow_mut()
                .apply(change, blocked_by_id, blocking_reason);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metadata, Task, TaskStatus, WorkflowState};

    fn task(id: i64, status: TaskStatus) -> Task {
        let now = Utc::now();
        Task {
            id,
            feature_id: 1,
            name: format!("task-{}", id),
            description: None,
            acceptance_criteria: None,
            priority: 0,
            workflow: WorkflowState::new(status, now),
            metadata: Metadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    fn exists(_: i64) -> Result<bool> {
        Ok(true)
    }

    fn missing(_: i64) -> Result<bool> {
        Ok(false)
    }

    #[test]
    fn blocked_without_info_is_rejected() {
        let entity = task(1, TaskStatus::Ready);
        let request = TransitionRequest::to(TaskStatus::Blocked);
        let err = plan_transition(&entity, &request, "me", Utc::now(), exists).unwrap_err();
        assert!(matches!(err, WorkflowError::MissingBlockingInfo { .. }));

        let request = TransitionRequest::to(TaskStatus::Blocked).with_reason("waiting");
        let err = plan_transition(&entity, &request, "me", Utc::now(), exists).unwrap_err();
        assert!(matches!(err, WorkflowError::MissingBlockingInfo { .. }));
    }

    #[test]
    fn blank_reason_counts_as_missing() {
        let entity = task(1, TaskStatus::Ready);
        let request = TransitionRequest::<TaskStatus>::blocked(2, "   ");
        let err = plan_transition(&entity, &request, "me", Utc::now(), exists).unwrap_err();
        assert!(matches!(err, WorkflowError::MissingBlockingInfo { .. }));
    }

    #[test]
    fn self_blocking_is_rejected() {
        let entity = task(4, TaskStatus::Ready);
        let request = TransitionRequest::<TaskStatus>::blocked(4, "x");
        let err = plan_transition(&entity, &request, "me", Utc::now(), exists).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::SelfBlockingNotAllowed { id: 4, .. }
        ));
    }

    #[test]
    fn unknown_blocker_is_rejected() {
        let entity = task(1, TaskStatus::Ready);
        let request = TransitionRequest::<TaskStatus>::blocked(99, "x");
        let err = plan_transition(&entity, &request, "me", Utc::now(), missing).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::BlockingEntityNotFound { id: 99, .. }
        ));
    }

    #[test]
    fn blocker_is_checked_even_when_not_blocking() {
        let entity = task(1, TaskStatus::Ready);
        let mut request = TransitionRequest::to(TaskStatus::InProgress);
        request.blocked_by_id = Some(42);
        let err = plan_transition(&entity, &request, "me", Utc::now(), missing).unwrap_err();
        assert!(matches!(err, WorkflowError::BlockingEntityNotFound { .. }));
    }

    #[test]
    fn identical_request_is_already_current() {
        let entity = task(1, TaskStatus::InProgress);
        let request = TransitionRequest::to(TaskStatus::InProgress);
        let plan = plan_transition(&entity, &request, "me", Utc::now(), exists).unwrap();
        assert_eq!(plan, TransitionPlan::AlreadyCurrent);
    }

    #[test]
    fn applying_records_history_and_clears_blocking() {
        let mut entity = task(1, TaskStatus::Ready);
        let request = TransitionRequest::<TaskStatus>::blocked(2, "waiting on schema");
        let plan = plan_transition(&entity, &request, "me", Utc::now(), exists).unwrap();
        assert!(apply_plan(&mut entity, plan));
        assert_eq!(entity.workflow.blocked_by_id, Some(2));
        assert_eq!(entity.workflow.status_history.latest().unwrap().reason, "waiting on schema");

        let request = TransitionRequest::to(TaskStatus::InProgress).by("reviewer");
        let plan = plan_transition(&entity, &request, "me", Utc::now(), exists).unwrap();
        assert!(apply_plan(&mut entity, plan));

        let latest = entity.workflow.status_history.latest().unwrap();
        assert_eq!(latest.status, TaskStatus::InProgress);
        assert_eq!(latest.reason, DEFAULT_REASON);
        assert_eq!(latest.changed_by, "reviewer");
        assert_eq!(entity.workflow.blocked_by_id, None);
        assert_eq!(entity.workflow.blocking_reason, None);
        assert_eq!(entity.workflow.status_history.len(), 2);
    }

    #[test]
    fn reblocking_with_new_reason_is_a_change() {
        let mut entity = task(1, TaskStatus::Ready);
        let plan = plan_transition(
            &entity,
            &TransitionRequest::<TaskStatus>::blocked(2, "first"),
            "me",
            Utc::now(),
            exists,
        )
        .unwrap();
        apply_plan(&mut entity, plan);

        let plan = plan_transition(
            &entity,
            &TransitionRequest::<TaskStatus>::blocked(2, "second"),
            "me",
            Utc::now(),
            exists,
        )
        .unwrap();
        assert!(matches!(plan, TransitionPlan::Apply { .. }));
    }
}
