use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Caller-supplied or generated token, never a database key.
    pub id: String,
    pub task_id: Option<i64>,
    pub feature_id: Option<i64>,
    pub application_id: Option<i64>,
    pub task_type: SessionTaskType,
    pub context_description: Option<String>,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    pub last_file_change_at: Option<DateTime<Utc>>,
    pub last_decision_at: Option<DateTime<Utc>>,
    pub compliance_score: i64,
}

impl Session {
    pub const MAX_COMPLIANCE_SCORE: i64 = 100;

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// The instant checkpoint cadence is measured from.
    pub fn cadence_anchor(&self) -> DateTime<Utc> {
        match self.last_checkpoint_at {
            Some(at) if at > self.start_time => at,
            _ => self.start_time,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SessionTaskType {
    CodeEditing,
    Planning,
    Research,
    Exploration,
}

impl SessionTaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeEditing => "code-editing",
            Self::Planning => "planning",
            Self::Research => "research",
            Self::Exploration => "exploration",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "code-editing" => Some(Self::CodeEditing),
            "planning" => Some(Self::Planning),
            "research" => Some(Self::Research),
            "exploration" => Some(Self::Exploration),
            _ => None,
        }
    }
}

super::sql_enum!(SessionStatus, SessionTaskType);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeSessionInput {
    /// Generated when absent.
    pub id: Option<String>,
    pub task_id: Option<i64>,
    pub feature_id: Option<i64>,
    pub application_id: Option<i64>,
    pub task_type: SessionTaskType,
    pub context_description: Option<String>,
}

impl Default for InitializeSessionInput {
    fn default() -> Self {
        Self {
            id: None,
            task_id: None,
            feature_id: None,
            application_id: None,
            task_type: SessionTaskType::CodeEditing,
            context_description: None,
        }
    }
}

/// Activity totals for one session. Derived on read, never stored.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionCounters {
    pub files_changed: i64,
    pub checkpoints: i64,
    pub decisions: i64,
    pub snapshots: i64,
    pub scope_violations: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session: Session,
    pub counters: SessionCounters,
    pub checkpoint_needed: bool,
}
