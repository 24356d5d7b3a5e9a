use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::EntityKind;

/// Behaviour shared by the Feature and Task status sets.
///
/// The two sets overlap but are distinct types, so a Task can never be
/// given a Feature-only status such as `planned`.
pub trait WorkflowStatus:
    Copy
    + Eq
    + Ord
    + fmt::Debug
    + fmt::Display
    + Serialize
    + DeserializeOwned
    + ToSql
    + FromSql
    + Send
    + Sync
    + 'static
{
    const KIND: EntityKind;
    const BLOCKED: Self;
    const COMPLETED: Self;

    fn as_str(&self) -> &'static str;
    fn parse(s: &str) -> Option<Self>;
    fn all() -> &'static [Self];

    fn is_blocked(&self) -> bool {
        *self == Self::BLOCKED
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    Planned,
    Backlog,
    Ready,
    InProgress,
    Blocked,
    OnHold,
    InReview,
    Completed,
    WontDo,
    Abandoned,
    Archived,
}

impl FeatureStatus {
    /// Closing statuses after which the caller is told how the child tasks stand.
    pub fn closes_feature(&self) -> bool {
        matches!(self, Self::Completed | Self::WontDo | Self::Abandoned)
    }
}

impl WorkflowStatus for FeatureStatus {
    const KIND: EntityKind = EntityKind::Feature;
    const BLOCKED: Self = Self::Blocked;
    const COMPLETED: Self = Self::Completed;

    fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Backlog => "backlog",
            Self::Ready => "ready",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::OnHold => "on_hold",
            Self::InReview => "in_review",
            Self::Completed => "completed",
            Self::WontDo => "wont_do",
            Self::Abandoned => "abandoned",
            Self::Archived => "archived",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|status| status.as_str() == s)
    }

    fn all() -> &'static [Self] {
        &[
            Self::Planned,
            Self::Backlog,
            Self::Ready,
            Self::InProgress,
            Self::Blocked,
            Self::OnHold,
            Self::InReview,
            Self::Completed,
            Self::WontDo,
            Self::Abandoned,
            Self::Archived,
        ]
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Ready,
    Blocked,
    OnHold,
    InProgress,
    InReview,
    NeedsRevision,
    Completed,
    WontDo,
    Abandoned,
    Archived,
}

impl WorkflowStatus for TaskStatus {
    const KIND: EntityKind = EntityKind::Task;
    const BLOCKED: Self = Self::Blocked;
    const COMPLETED: Self = Self::Completed;

    fn as_str(&self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Ready => "ready",
            Self::Blocked => "blocked",
            Self::OnHold => "on_hold",
            Self::InProgress => "in_progress",
            Self::InReview => "in_review",
            Self::NeedsRevision => "needs_revision",
            Self::Completed => "completed",
            Self::WontDo => "wont_do",
            Self::Abandoned => "abandoned",
            Self::Archived => "archived",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|status| status.as_str() == s)
    }

    fn all() -> &'static [Self] {
        &[
            Self::Backlog,
            Self::Ready,
            Self::Blocked,
            Self::OnHold,
            Self::InProgress,
            Self::InReview,
            Self::NeedsRevision,
            Self::Completed,
            Self::WontDo,
            Self::Abandoned,
            Self::Archived,
        ]
    }
}

super::sql_enum!(FeatureStatus, TaskStatus; via parse);

/// One entry of an entity's status log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusChange<S> {
    pub status: S,
    pub changed_at: DateTime<Utc>,
    pub changed_by: String,
    pub reason: String,
}

/// Append-only status log, most recent entry first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct StatusHistory<S>(Vec<StatusChange<S>>);

impl<S> Default for StatusHistory<S> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<S> StatusHistory<S> {
    pub fn record(&mut self, change: StatusChange<S>) {
        self.0.insert(0, change);
    }

    pub fn latest(&self) -> Option<&StatusChange<S>> {
        self.0.first()
    }

    pub fn entries(&self) -> &[StatusChange<S>] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Serialize> ToSql for StatusHistory<S> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let json = serde_json::to_string(&self.0)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(json))
    }
}

impl<S: DeserializeOwned> FromSql for StatusHistory<S> {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        serde_json::from_str(raw)
            .map(Self)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(status: TaskStatus, reason: &str) -> StatusChange<TaskStatus> {
        StatusChange {
            status,
            changed_at: Utc::now(),
            changed_by: "tester".into(),
            reason: reason.into(),
        }
    }

    #[test]
    fn statuses_round_trip_through_their_names() {
        for status in FeatureStatus::all() {
            assert_eq!(FeatureStatus::parse(status.as_str()), Some(*status));
        }
        for status in TaskStatus::all() {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(*status));
        }
    }

    #[test]
    fn status_sets_differ_per_kind() {
        assert!(FeatureStatus::parse("planned").is_some());
        assert!(TaskStatus::parse("planned").is_none());
        assert!(TaskStatus::parse("needs_revision").is_some());
        assert!(FeatureStatus::parse("needs_revision").is_none());
    }

    #[test]
    fn serde_names_match_sql_names() {
        let json = serde_json::to_string(&TaskStatus::NeedsRevision).unwrap();
        assert_eq!(json, "\"needs_revision\"");
        let json = serde_json::to_string(&FeatureStatus::WontDo).unwrap();
        assert_eq!(json, "\"wont_do\"");
    }

    #[test]
    fn history_keeps_most_recent_first() {
        let mut history = StatusHistory::default();
        history.record(change(TaskStatus::Ready, "first"));
        history.record(change(TaskStatus::InProgress, "second"));

        assert_eq!(history.len(), 2);
        assert_eq!(history.latest().unwrap().status, TaskStatus::InProgress);
        assert_eq!(history.entries()[1].reason, "first");
    }

    #[test]
    fn history_serializes_as_a_plain_list() {
        let mut history = StatusHistory::default();
        history.record(change(TaskStatus::Ready, "go"));
        let json = serde_json::to_value(&history).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["status"], "ready");
    }

    #[test]
    fn closing_feature_statuses() {
        assert!(FeatureStatus::Completed.closes_feature());
        assert!(FeatureStatus::WontDo.closes_feature());
        assert!(FeatureStatus::Abandoned.closes_feature());
        assert!(!FeatureStatus::Archived.closes_feature());
    }
}
