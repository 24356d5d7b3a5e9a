use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kind of hierarchy entity an error or a transition refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Application,
    Feature,
    Task,
    Session,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Feature => "feature",
            Self::Task => "task",
            Self::Session => "session",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "application" => Some(Self::Application),
            "feature" => Some(Self::Feature),
            "task" => Some(Self::Task),
            "session" => Some(Self::Session),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure of every core operation.
///
/// Validation variants are caller-fixable and are meant to be rendered as
/// guidance. `Store` and `Serialization` are infrastructure failures and are
/// surfaced verbatim, without retry.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("status 'blocked' requires both a blocking reason and the id of the blocking {kind}")]
    MissingBlockingInfo { kind: EntityKind },

    #[error("{kind} {id} cannot block itself")]
    SelfBlockingNotAllowed { kind: EntityKind, id: i64 },

    #[error("blocking {kind} {id} does not exist")]
    BlockingEntityNotFound { kind: EntityKind, id: i64 },

    #[error("{kind} {id} not found")]
    EntityNotFound { kind: EntityKind, id: String },

    #[error("parent {kind} {id} not found")]
    ParentNotFound { kind: EntityKind, id: String },

    #[error("a {kind} named '{name}' already exists here")]
    DuplicateName { kind: EntityKind, name: String },

    #[error("'{value}' is not a valid {kind} status")]
    InvalidStatus { kind: EntityKind, value: String },

    #[error("invalid or unknown session: {id}")]
    InvalidOrInactiveSession { id: String },

    #[error("session {id} is {status}, no further activity can be recorded")]
    SessionNotActive { id: String, status: String },

    #[error("session {id} already exists")]
    SessionExists { id: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkflowError {
    /// True for errors the caller can fix by changing the request.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            Self::Store(_) | Self::Serialization(_) | Self::Config(_)
        )
    }

    pub(crate) fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        Self::EntityNotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn parent_not_found(kind: EntityKind, id: impl ToString) -> Self {
        Self::ParentNotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type Result<T, E = WorkflowError> = std::result::Result<T, E>;
