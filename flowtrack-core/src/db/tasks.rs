use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{features::get_feature, Database, WorkflowRecord};
use crate::error::{EntityKind, Result, WorkflowError};
use crate::models::{
    CreateTaskInput, StatusHistory, Task, TaskCounts, TaskStatus, WorkflowState, WorkflowStatus,
};

const COLUMNS: &str = "id, feature_id, name, description, acceptance_criteria, status, priority, \
     blocking_reason, blocked_by_id, status_updated_at, status_history, metadata, created_at, updated_at";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        feature_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        acceptance_criteria: row.get(4)?,
        workflow: WorkflowState {
            status: row.get(5)?,
            blocking_reason: row.get(7)?,
            blocked_by_id: row.get(8)?,
            status_updated_at: row.get(9)?,
            status_history: row.get(10)?,
        },
        priority: row.get(6)?,
        metadata: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

pub(crate) fn get_task(conn: &Connection, id: i64) -> Result<Option<Task>> {
    let sql = format!("SELECT {} FROM tasks WHERE id = ?1", COLUMNS);
    Ok(conn.query_row(&sql, params![id], task_from_row).optional()?)
}

pub(crate) fn task_counts(conn: &Connection, feature_id: i64) -> Result<TaskCounts> {
    let mut stmt =
        conn.prepare("SELECT status, COUNT(*) FROM tasks WHERE feature_id = ?1 GROUP BY status")?;
    let rows = stmt.query_map(params![feature_id], |row| {
        Ok((row.get::<_, TaskStatus>(0)?, row.get::<_, i64>(1)? as usize))
    })?;
    Ok(rows.collect::<rusqlite::Result<TaskCounts>>()?)
}

/// Most urgent unfinished task of a feature: priority descending, then lowest id.
pub(crate) fn next_task(
    conn: &Connection,
    feature_id: i64,
    exclude_task_id: Option<i64>,
) -> Result<Option<Task>> {
    let sql = format!(
        "SELECT {} FROM tasks
         WHERE feature_id = ?1 AND status <> ?2 AND (?3 IS NULL OR id <> ?3)
         ORDER BY priority DESC, id ASC
         LIMIT 1",
        COLUMNS
    );
    Ok(conn
        .query_row(
            &sql,
            params![feature_id, TaskStatus::Completed, exclude_task_id],
            task_from_row,
        )
        .optional()?)
}

impl WorkflowRecord for Task {
    const TABLE: &'static str = "tasks";

    fn load(conn: &Connection, id: i64) -> Result<Option<Self>> {
        get_task(conn, id)
    }
}

impl Database {
    /// Create a task under an existing feature. Defaults to `backlog`.
    pub fn create_task(&self, feature_id: i64, input: CreateTaskInput) -> Result<Task> {
        let status = input.status.unwrap_or(TaskStatus::Backlog);
        if status.is_blocked() {
            return Err(WorkflowError::MissingBlockingInfo {
                kind: EntityKind::Task,
            });
        }
        let name = input.name.trim().to_string();

        self.with_transaction(|tx| {
            if get_feature(tx, feature_id)?.is_none() {
                return Err(WorkflowError::parent_not_found(EntityKind::Feature, feature_id));
            }
            let taken = tx
                .query_row(
                    "SELECT 1 FROM tasks WHERE feature_id = ?1 AND name = ?2",
                    params![feature_id, name],
                    |_| Ok(()),
                )
                .optional()?;
            if taken.is_some() {
                return Err(WorkflowError::DuplicateName {
                    kind: EntityKind::Task,
                    name,
                });
            }

            let now = Utc::now();
            tx.execute(
                "INSERT INTO tasks (feature_id, name, description, acceptance_criteria, status,
                    priority, status_updated_at, status_history, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?7, ?7)",
                params![
                    feature_id,
                    name,
                    input.description,
                    input.acceptance_criteria,
                    status,
                    input.priority.unwrap_or(0),
                    now,
                    StatusHistory::<TaskStatus>::default(),
                    input.metadata,
                ],
            )?;
            let id = tx.last_insert_rowid();
            tracing::info!("Created task {} ({}) in feature {}", id, name, feature_id);

            get_task(tx, id)?.ok_or_else(|| WorkflowError::not_found(EntityKind::Task, id))
        })
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        self.with_connection(|conn| get_task(conn, id))
    }

    /// Tasks of a feature, most urgent first.
    pub fn list_tasks(&self, feature_id: i64) -> Result<Vec<Task>> {
        self.with_connection(|conn| {
            let sql = format!(
                "SELECT {} FROM tasks WHERE feature_id = ?1 ORDER BY priority DESC, id",
                COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![feature_id], task_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn task_counts(&self, feature_id: i64) -> Result<TaskCounts> {
        self.with_connection(|conn| task_counts(conn, feature_id))
    }
}
