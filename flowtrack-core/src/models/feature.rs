use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FeatureStatus, Metadata, Workflow, WorkflowState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub id: i64,
    pub application_id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Higher is more urgent.
    pub priority: i64,
    #[serde(flatten)]
    pub workflow: WorkflowState<FeatureStatus>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow for Feature {
    type Status = FeatureStatus;

    fn id(&self) -> i64 {
        self.id
    }

    fn workflow(&self) -> &WorkflowState<FeatureStatus> {
        &self.workflow
    }

    fn workflow_mut(&mut self) -> &mut WorkflowState<FeatureStatus> {
        &mut self.workflow
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateFeatureInput {
    pub name: String,
    pub description: Option<String>,
    pub priority: Option<i64>,
    pub status: Option<FeatureStatus>,
    #[serde(default)]
    pub metadata: Metadata,
}
