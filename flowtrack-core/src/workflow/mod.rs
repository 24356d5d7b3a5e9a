//! Status Transition Engine.
//!
//! Validates and applies status changes for features and tasks. Every
//! transition re-reads the entity, validates, writes and appends to the
//! entity's status history inside one store transaction.
//!
//! Child tasks are never transitioned on a feature's behalf: closing a
//! feature reports its task counts, and moving a task reports how many of
//! its feature's tasks remain, leaving the follow-up to the caller.

mod transition;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use transition::{apply_plan, plan_transition, TransitionPlan, TransitionRequest, DEFAULT_REASON};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::{self, Database, WorkflowRecord};
use crate::error::{EntityKind, Result, WorkflowError};
use crate::models::{
    Feature, FeatureStatus, StatusHistory, Task, TaskCounts, TaskStatus, Workflow, WorkflowStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionOutcome<S> {
    pub entity_id: i64,
    pub previous_status: S,
    pub new_status: S,
    /// The request matched the current state; nothing was written.
    pub already_current: bool,
    pub history_len: usize,
    /// For a feature entering a closing status: its tasks. For a task: the
    /// tasks of its feature after the change.
    pub task_counts: Option<TaskCounts>,
    /// Task transitions only: every task of the feature is now completed.
    pub feature_ready_for_completion: bool,
}

/// Kind-erased transition result for callers working with status strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusChangeSummary {
    pub kind: EntityKind,
    pub entity_id: i64,
    pub previous_status: String,
    pub new_status: String,
    pub already_current: bool,
    pub history_len: usize,
    pub task_counts: Option<TaskCounts>,
    pub feature_ready_for_completion: bool,
}

impl<S: WorkflowStatus> From<TransitionOutcome<S>> for StatusChangeSummary {
    fn from(outcome: TransitionOutcome<S>) -> Self {
        Self {
            kind: S::KIND,
            entity_id: outcome.entity_id,
            previous_status: outcome.previous_status.as_str().to_string(),
            new_status: outcome.new_status.as_str().to_string(),
            already_current: outcome.already_current,
            history_len: outcome.history_len,
            task_counts: outcome.task_counts,
            feature_ready_for_completion: outcome.feature_ready_for_completion,
        }
    }
}

#[derive(Clone)]
pub struct StatusEngine {
    db: Database,
    clock: Arc<dyn Clock>,
    default_actor: String,
}

impl StatusEngine {
    pub fn new(db: Database, config: &Config) -> Self {
        Self::with_clock(db, config, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Database, config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            clock,
            default_actor: config.default_actor.clone(),
        }
    }

    pub fn transition_feature(
        &self,
        id: i64,
        request: TransitionRequest<FeatureStatus>,
    ) -> Result<TransitionOutcome<FeatureStatus>> {
        self.db.with_transaction(|tx| {
            let (feature, previous, already_current) = self.transition::<Feature>(tx, id, &request)?;
            let new_status = feature.workflow.status;

            let task_counts = if !already_current && new_status.closes_feature() {
                let counts = db::task_counts(tx, id)?;
                tracing::info!(
                    "Feature {} closed as {} with {} of {} tasks not completed",
                    id,
                    new_status,
                    counts.remaining(),
                    counts.total
                );
                Some(counts)
            } else {
                None
            };

            Ok(TransitionOutcome {
                entity_id: id,
                previous_status: previous,
                new_status,
                already_current,
                history_len: feature.workflow.status_history.len(),
                task_counts,
                feature_ready_for_completion: false,
            })
        })
    }

    pub fn transition_task(
        &self,
        id: i64,
        request: TransitionRequest<TaskStatus>,
    ) -> Result<TransitionOutcome<TaskStatus>> {
        self.db.with_transaction(|tx| {
            let (task, previous, already_current) = self.transition::<Task>(tx, id, &request)?;

            let counts = db::task_counts(tx, task.feature_id)?;
            let feature_ready = counts.all_completed();
            if feature_ready && !already_current {
                tracing::info!(
                    "All {} tasks of feature {} are completed",
                    counts.total,
                    task.feature_id
                );
            }

            Ok(TransitionOutcome {
                entity_id: id,
                previous_status: previous,
                new_status: task.workflow.status,
                already_current,
                history_len: task.workflow.status_history.len(),
                task_counts: Some(counts),
                feature_ready_for_completion: feature_ready,
            })
        })
    }

    /// Transition by kind and status name, as a tool layer receives them.
    pub fn transition_status(
        &self,
        kind: EntityKind,
        id: i64,
        status: &str,
        blocking_reason: Option<String>,
        blocked_by_id: Option<i64>,
        changed_by: Option<String>,
    ) -> Result<StatusChangeSummary> {
        match kind {
            EntityKind::Feature => {
                let target = parse_status::<FeatureStatus>(status)?;
                let request = TransitionRequest {
                    target,
                    blocking_reason,
                    blocked_by_id,
                    changed_by,
                };
                self.transition_feature(id, request).map(Into::into)
            }
            EntityKind::Task => {
                let target = parse_status::<TaskStatus>(status)?;
                let request = TransitionRequest {
                    target,
                    blocking_reason,
                    blocked_by_id,
                    changed_by,
                };
                self.transition_task(id, request).map(Into::into)
            }
            other => Err(WorkflowError::InvalidStatus {
                kind: other,
                value: status.to_string(),
            }),
        }
    }

    pub fn feature_history(&self, id: i64) -> Result<StatusHistory<FeatureStatus>> {
        self.db
            .get_feature(id)?
            .map(|feature| feature.workflow.status_history)
            .ok_or_else(|| WorkflowError::not_found(EntityKind::Feature, id))
    }

    pub fn task_history(&self, id: i64) -> Result<StatusHistory<TaskStatus>> {
        self.db
            .get_task(id)?
            .map(|task| task.workflow.status_history)
            .ok_or_else(|| WorkflowError::not_found(EntityKind::Task, id))
    }

    fn transition<E: WorkflowRecord>(
        &self,
        conn: &rusqlite::Connection,
        id: i64,
        request: &TransitionRequest<E::Status>,
    ) -> Result<(E, E::Status, bool)> {
        let kind = <E::Status as WorkflowStatus>::KIND;
        let mut entity = E::load(conn, id)?.ok_or_else(|| WorkflowError::not_found(kind, id))?;
        let previous = entity.workflow().status;

        let plan = plan_transition(
            &entity,
            request,
            &self.default_actor,
            self.clock.now(),
            |blocker| db::record_exists::<E>(conn, blocker),
        )?;

        if !apply_plan(&mut entity, plan) {
            tracing::debug!("{} {} already {}, nothing to do", kind, id, previous);
            return Ok((entity, previous, true));
        }

        db::save_workflow(conn, &entity)?;
        tracing::info!(
            "{} {} moved from {} to {}",
            kind,
            id,
            previous,
            entity.workflow().status
        );
        Ok((entity, previous, false))
    }
}

fn parse_status<S: WorkflowStatus>(value: &str) -> Result<S> {
    S::parse(value.trim()).ok_or_else(|| WorkflowError::InvalidStatus {
        kind: S::KIND,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_per_kind() {
        assert_eq!(
            parse_status::<FeatureStatus>("planned").unwrap(),
            FeatureStatus::Planned
        );
        let err = parse_status::<TaskStatus>("planned").unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidStatus {
                kind: EntityKind::Task,
                ..
            }
        ));
    }

    #[test]
    fn summary_uses_status_names() {
        let outcome = TransitionOutcome {
            entity_id: 3,
            previous_status: TaskStatus::Ready,
            new_status: TaskStatus::InProgress,
            already_current: false,
            history_len: 2,
            task_counts: None,
            feature_ready_for_completion: false,
        };
        let summary = StatusChangeSummary::from(outcome);
        assert_eq!(summary.kind, EntityKind::Task);
        assert_eq!(summary.previous_status, "ready");
        assert_eq!(summary.new_status, "in_progress");
    }
}
