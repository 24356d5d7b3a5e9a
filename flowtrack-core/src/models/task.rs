use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Metadata, TaskStatus, Workflow, WorkflowState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub feature_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub acceptance_criteria: Option<String>,
    /// Higher is more urgent.
    pub priority: i64,
    #[serde(flatten)]
    pub workflow: WorkflowState<TaskStatus>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow for Task {
    type Status = TaskStatus;

    fn id(&self) -> i64 {
        self.id
    }

    fn workflow(&self) -> &WorkflowState<TaskStatus> {
        &self.workflow
    }

    fn workflow_mut(&mut self) -> &mut WorkflowState<TaskStatus> {
        &mut self.workflow
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTaskInput {
    pub name: String,
    pub description: Option<String>,
    pub acceptance_criteria: Option<String>,
    pub priority: Option<i64>,
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Task counts of one feature, by status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskCounts {
    pub total: usize,
    pub by_status: BTreeMap<TaskStatus, usize>,
}

impl TaskCounts {
    pub fn count(&self, status: TaskStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    /// Tasks not yet `completed`.
    pub fn remaining(&self) -> usize {
        self.total - self.count(TaskStatus::Completed)
    }

    /// True when the feature has tasks and every one of them is completed.
    pub fn all_completed(&self) -> bool {
        self.total > 0 && self.remaining() == 0
    }
}

impl FromIterator<(TaskStatus, usize)> for TaskCounts {
    fn from_iter<I: IntoIterator<Item = (TaskStatus, usize)>>(iter: I) -> Self {
        let mut counts = Self::default();
        for (status, n) in iter {
            counts.total += n;
            *counts.by_status.entry(status).or_insert(0) += n;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_excludes_only_completed() {
        let counts: TaskCounts = [
            (TaskStatus::Completed, 2),
            (TaskStatus::WontDo, 1),
            (TaskStatus::InProgress, 1),
        ]
        .into_iter()
        .collect();

        assert_eq!(counts.total, 4);
        assert_eq!(counts.remaining(), 2);
        assert!(!counts.all_completed());
    }

    #[test]
    fn empty_feature_is_not_complete() {
        assert!(!TaskCounts::default().all_completed());
    }
}
