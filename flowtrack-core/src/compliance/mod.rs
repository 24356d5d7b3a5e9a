//! Session Compliance Tracker.
//!
//! Records what happens during a working session and keeps score:
//! file changes are checked against the session's scope, violations cost
//! compliance points, and checkpoint cadence is reported as advice.
//!
//! ```text
//! [none] --initialize--> active --end_session--> completed
//!                        active --abandon------> abandoned
//! ```
//!
//! Every audit operation requires an `active` session.

mod cadence;
mod fingerprint;
mod scope;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use cadence::checkpoint_needed;
pub use fingerprint::content_fingerprint;
pub use scope::{ScopeContext, ScopeVerdict};

use crate::clock::{Clock, SystemClock};
use crate::config::TrackerConfig;
use crate::db::{self, ActivityMark, Database, NewSession};
use crate::error::{EntityKind, Result, WorkflowError};
use crate::models::{
    ChangeType, Checkpoint, CreateCheckpointInput, Decision, Feedback, FeedbackKind, FileChange,
    InitializeSessionInput, LogDecisionInput, ScopeValidation, Session, SessionCounters,
    SessionReport, SessionStatus, Snapshot, Task, TaskCounts, ValidationResult,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileChangeOutcome {
    Accepted {
        file_change: FileChange,
        compliance_score: i64,
        checkpoint_due: bool,
        counters: SessionCounters,
    },
    /// The change was not recorded; a violation was logged and scored.
    ScopeViolation {
        validation: ScopeValidation,
        compliance_score: i64,
        checkpoint_due: bool,
        counters: SessionCounters,
    },
}

impl FileChangeOutcome {
    pub fn accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn compliance_score(&self) -> i64 {
        match self {
            Self::Accepted {
                compliance_score, ..
            }
            | Self::ScopeViolation {
                compliance_score, ..
            } => *compliance_score,
        }
    }

    pub fn checkpoint_due(&self) -> bool {
        match self {
            Self::Accepted { checkpoint_due, .. } | Self::ScopeViolation { checkpoint_due, .. } => {
                *checkpoint_due
            }
        }
    }

    pub fn counters(&self) -> SessionCounters {
        match self {
            Self::Accepted { counters, .. } | Self::ScopeViolation { counters, .. } => *counters,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "snapshot", rename_all = "snake_case")]
pub enum SnapshotOutcome {
    Created(Snapshot),
    /// Same content was already captured for this file in this session.
    Duplicate(Snapshot),
}

impl SnapshotOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }

    pub fn snapshot(&self) -> &Snapshot {
        match self {
            Self::Created(snapshot) | Self::Duplicate(snapshot) => snapshot,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndSessionOutcome {
    pub session: Session,
    /// Most urgent unfinished task left in the session's feature.
    pub next_task: Option<Task>,
    /// Every task of the session's feature is completed.
    pub feature_completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureCompletion {
    pub feature_id: i64,
    pub counts: TaskCounts,
    pub completed: bool,
}

#[derive(Clone)]
pub struct SessionTracker {
    db: Database,
    clock: Arc<dyn Clock>,
    config: TrackerConfig,
}

impl SessionTracker {
    pub fn new(db: Database, config: TrackerConfig) -> Self {
        Self::with_clock(db, config, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Database, config: TrackerConfig, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock, config }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn initialize_session(&self, input: InitializeSessionInput) -> Result<Session> {
        let id = match input.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        let now = self.clock.now();

        self.db.with_transaction(|tx| {
            if db::get_session(tx, &id)?.is_some() {
                return Err(WorkflowError::SessionExists { id: id.clone() });
            }
            if let Some(task_id) = input.task_id {
                if db::get_task(tx, task_id)?.is_none() {
                    return Err(WorkflowError::parent_not_found(EntityKind::Task, task_id));
                }
            }
            if let Some(feature_id) = input.feature_id {
                if db::get_feature(tx, feature_id)?.is_none() {
                    return Err(WorkflowError::parent_not_found(EntityKind::Feature, feature_id));
                }
            }
            if let Some(application_id) = input.application_id {
                if db::get_application(tx, application_id)?.is_none() {
                    return Err(WorkflowError::parent_not_found(
                        EntityKind::Application,
                        application_id,
                    ));
                }
            }

            db::insert_session(
                tx,
                &NewSession {
                    id: &id,
                    task_id: input.task_id,
                    feature_id: input.feature_id,
                    application_id: input.application_id,
                    task_type: input.task_type,
                    context_description: input.context_description.as_deref(),
                    start_time: now,
                },
            )?;
            tracing::info!("Started {} session {}", input.task_type, id);

            db::get_session(tx, &id)?.ok_or_else(|| WorkflowError::InvalidOrInactiveSession {
                id: id.clone(),
            })
        })
    }

    /// Check a file operation against the session's scope and record it
    /// under its normalized path.
    ///
    /// A violation writes a scope validation record and costs
    /// `violation_penalty` points (never below zero) instead of recording
    /// the change.
    pub fn record_file_change(
        &self,
        session_id: &str,
        file_path: &str,
        change_type: ChangeType,
    ) -> Result<FileChangeOutcome> {
        let now = self.clock.now();
        self.db.with_transaction(|tx| {
            let session = require_active(tx, session_id)?;
            let context = scope_context(tx, &session)?;
            let checkpoint_due =
                checkpoint_needed(&session, now, self.config.checkpoint_interval());
            let path = scope::normalize(file_path);
            let path = path.as_str();

            match context.evaluate(path, change_type, &self.config.read_only_task_types) {
                ScopeVerdict::Violation { reason } => {
                    let validation = db::insert_scope_validation(
                        tx,
                        session_id,
                        path,
                        change_type,
                        ValidationResult::Violation,
                        Some(&reason),
                        now,
                    )?;
                    let compliance_score =
                        db::apply_penalty(tx, session_id, self.config.violation_penalty)?;
                    tracing::warn!(
                        "Scope violation in session {}: {} (score now {})",
                        session_id,
                        reason,
                        compliance_score
                    );
                    Ok(FileChangeOutcome::ScopeViolation {
                        validation,
                        compliance_score,
                        checkpoint_due,
                        counters: db::session_counters(tx, session_id)?,
                    })
                }
                ScopeVerdict::Pass => {
                    let file_change =
                        db::insert_file_change(tx, session_id, path, change_type, now)?;
                    db::mark_activity(tx, session_id, ActivityMark::FileChange, now)?;
                    tracing::debug!("Session {} {} {}", session_id, change_type, path);
                    if checkpoint_due {
                        tracing::info!("Session {} is due for a checkpoint", session_id);
                    }
                    Ok(FileChangeOutcome::Accepted {
                        file_change,
                        compliance_score: session.compliance_score,
                        checkpoint_due,
                        counters: db::session_counters(tx, session_id)?,
                    })
                }
            }
        })
    }

    /// Whether the session is due for a checkpoint. Closed sessions never are.
    pub fn checkpoint_needed(&self, session_id: &str) -> Result<bool> {
        let session = self
            .db
            .get_session(session_id)?
            .ok_or_else(|| WorkflowError::InvalidOrInactiveSession {
                id: session_id.to_string(),
            })?;
        Ok(session.is_active()
            && checkpoint_needed(&session, self.clock.now(), self.config.checkpoint_interval()))
    }

    /// Record a checkpoint. Any cadence is accepted.
    pub fn create_checkpoint(
        &self,
        session_id: &str,
        input: CreateCheckpointInput,
    ) -> Result<Checkpoint> {
        let now = self.clock.now();
        self.db.with_transaction(|tx| {
            require_active(tx, session_id)?;
            let checkpoint = db::insert_checkpoint(tx, session_id, &input, now)?;
            db::mark_activity(tx, session_id, ActivityMark::Checkpoint, now)?;
            tracing::info!("Checkpoint {} recorded for session {}", checkpoint.id, session_id);
            Ok(checkpoint)
        })
    }

    pub fn log_decision(&self, session_id: &str, input: LogDecisionInput) -> Result<Decision> {
        let now = self.clock.now();
        self.db.with_transaction(|tx| {
            require_active(tx, session_id)?;
            let decision = db::insert_decision(tx, session_id, &input, now)?;
            db::mark_activity(tx, session_id, ActivityMark::Decision, now)?;
            tracing::info!("Decision {} logged for session {}", decision.id, session_id);
            Ok(decision)
        })
    }

    /// Capture file content, skipping content already captured for the same
    /// file in this session.
    pub fn create_snapshot(
        &self,
        session_id: &str,
        file_path: &str,
        content: &str,
    ) -> Result<SnapshotOutcome> {
        let now = self.clock.now();
        let hash = content_fingerprint(content);
        let path = scope::normalize(file_path);
        let path = path.as_str();
        self.db.with_transaction(|tx| {
            require_active(tx, session_id)?;
            if let Some(existing) = db::find_snapshot(tx, session_id, path, &hash)? {
                tracing::debug!(
                    "Snapshot of {} unchanged since {}, skipping",
                    path,
                    existing.created_at
                );
                return Ok(SnapshotOutcome::Duplicate(existing));
            }
            let snapshot = db::insert_snapshot(tx, session_id, path, content, &hash, now)?;
            tracing::debug!("Snapshot {} of {} captured", snapshot.id, path);
            Ok(SnapshotOutcome::Created(snapshot))
        })
    }

    pub fn record_feedback(
        &self,
        session_id: &str,
        kind: FeedbackKind,
        content: &str,
    ) -> Result<Feedback> {
        let now = self.clock.now();
        self.db.with_transaction(|tx| {
            require_active(tx, session_id)?;
            db::insert_feedback(tx, session_id, kind, content, now)
        })
    }

    /// Close the session as completed and report what to pick up next.
    pub fn end_session(&self, session_id: &str, summary: &str) -> Result<EndSessionOutcome> {
        let now = self.clock.now();
        self.db.with_transaction(|tx| {
            let session = close(tx, session_id, SessionStatus::Completed, summary, now)?;

            let (next_task, feature_completed) = match session_feature(tx, &session)? {
                Some(feature_id) => (
                    db::next_task(tx, feature_id, session.task_id)?,
                    db::task_counts(tx, feature_id)?.all_completed(),
                ),
                None => (None, false),
            };
            if feature_completed {
                tracing::info!("Session {} finished the last open task of its feature", session_id);
            }

            Ok(EndSessionOutcome {
                session,
                next_task,
                feature_completed,
            })
        })
    }

    pub fn abandon_session(&self, session_id: &str, reason: &str) -> Result<Session> {
        let now = self.clock.now();
        self.db
            .with_transaction(|tx| close(tx, session_id, SessionStatus::Abandoned, reason, now))
    }

    pub fn session_report(&self, session_id: &str) -> Result<SessionReport> {
        let now = self.clock.now();
        self.db.with_connection(|conn| {
            let session = db::get_session(conn, session_id)?.ok_or_else(|| {
                WorkflowError::InvalidOrInactiveSession {
                    id: session_id.to_string(),
                }
            })?;
            let checkpoint_needed = session.is_active()
                && checkpoint_needed(&session, now, self.config.checkpoint_interval());
            Ok(SessionReport {
                counters: db::session_counters(conn, session_id)?,
                checkpoint_needed,
                session,
            })
        })
    }

    /// Most urgent task of a feature that is not completed, optionally
    /// skipping one task (usually the one just worked on).
    pub fn next_task(&self, feature_id: i64, exclude_task_id: Option<i64>) -> Result<Option<Task>> {
        self.db
            .with_connection(|conn| db::next_task(conn, feature_id, exclude_task_id))
    }

    pub fn feature_completion(&self, feature_id: i64) -> Result<FeatureCompletion> {
        self.db.with_connection(|conn| {
            if db::get_feature(conn, feature_id)?.is_none() {
                return Err(WorkflowError::not_found(EntityKind::Feature, feature_id));
            }
            let counts = db::task_counts(conn, feature_id)?;
            Ok(FeatureCompletion {
                feature_id,
                completed: counts.all_completed(),
                counts,
            })
        })
    }
}

fn require_active(conn: &Connection, session_id: &str) -> Result<Session> {
    let session = db::get_session(conn, session_id)?.ok_or_else(|| {
        WorkflowError::InvalidOrInactiveSession {
            id: session_id.to_string(),
        }
    })?;
    if !session.is_active() {
        return Err(WorkflowError::SessionNotActive {
            id: session.id,
            status: session.status.as_str().to_string(),
        });
    }
    Ok(session)
}

fn close(
    conn: &Connection,
    session_id: &str,
    status: SessionStatus,
    summary: &str,
    now: DateTime<Utc>,
) -> Result<Session> {
    let session = require_active(conn, session_id)?;
    if !db::close_session(conn, session_id, status, summary, now)? {
        return Err(WorkflowError::SessionNotActive {
            id: session.id,
            status: session.status.as_str().to_string(),
        });
    }
    tracing::info!(
        "Session {} {} with compliance score {}",
        session_id,
        status,
        session.compliance_score
    );
    db::get_session(conn, session_id)?.ok_or_else(|| WorkflowError::InvalidOrInactiveSession {
        id: session_id.to_string(),
    })
}

/// Feature a session works within: its task's feature, else its own link.
fn session_feature(conn: &Connection, session: &Session) -> Result<Option<i64>> {
    if let Some(task_id) = session.task_id {
        if let Some(task) = db::get_task(conn, task_id)? {
            return Ok(Some(task.feature_id));
        }
    }
    Ok(session.feature_id)
}

/// Scope policies of the session's task, feature and application.
fn scope_context(conn: &Connection, session: &Session) -> Result<ScopeContext> {
    let mut context = ScopeContext::unrestricted(session.task_type);

    let task = match session.task_id {
        Some(id) => db::get_task(conn, id)?,
        None => None,
    };
    let feature = match session.feature_id.or(task.as_ref().map(|t| t.feature_id)) {
        Some(id) => db::get_feature(conn, id)?,
        None => None,
    };
    let application = match session
        .application_id
        .or(feature.as_ref().map(|f| f.application_id))
    {
        Some(id) => db::get_application(conn, id)?,
        None => None,
    };

    let levels = [
        (EntityKind::Task, task.map(|t| t.metadata)),
        (EntityKind::Feature, feature.map(|f| f.metadata)),
        (EntityKind::Application, application.map(|a| a.metadata)),
    ];
    for (kind, metadata) in levels {
        if let Some(policy) = metadata.and_then(|m| m.scope_policy()) {
            context.levels.push((kind, policy));
        }
    }
    Ok(context)
}
