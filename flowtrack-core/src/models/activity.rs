//! Audit records owned by a session. Immutable once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "modified" => Some(Self::Modified),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationResult {
    Pass,
    Violation,
}

impl ValidationResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Violation => "violation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pass" => Some(Self::Pass),
            "violation" => Some(Self::Violation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Issue,
    Suggestion,
    Praise,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::Suggestion => "suggestion",
            Self::Praise => "praise",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "issue" => Some(Self::Issue),
            "suggestion" => Some(Self::Suggestion),
            "praise" => Some(Self::Praise),
            _ => None,
        }
    }
}

super::sql_enum!(ChangeType, ValidationResult, FeedbackKind);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub id: i64,
    pub session_id: String,
    pub file_path: String,
    pub change_type: ChangeType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: i64,
    pub session_id: String,
    pub progress: String,
    pub changes_description: String,
    pub current_thinking: String,
    pub next_steps: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCheckpointInput {
    pub progress: String,
    pub changes_description: String,
    pub current_thinking: String,
    pub next_steps: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: i64,
    pub session_id: String,
    pub file_path: String,
    pub content: String,
    /// SHA-256 of `content`, hex encoded.
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: i64,
    pub session_id: String,
    pub description: String,
    pub reasoning: String,
    pub alternatives: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogDecisionInput {
    pub description: String,
    pub reasoning: String,
    #[serde(default)]
    pub alternatives: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeValidation {
    pub id: i64,
    pub session_id: String,
    pub file_path: String,
    pub change_type: ChangeType,
    pub result: ValidationResult,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: i64,
    pub session_id: String,
    pub kind: FeedbackKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
