//! Audit records owned by a session. Insert and read only; nothing here
//! updates or deletes a row.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::Database;
use crate::error::{Result, WorkflowError};
use crate::models::{
    ChangeType, Checkpoint, CreateCheckpointInput, Decision, Feedback, FeedbackKind, FileChange,
    LogDecisionInput, ScopeValidation, SessionCounters, Snapshot, ValidationResult,
};

fn file_change_from_row(row: &Row<'_>) -> rusqlite::Result<FileChange> {
    Ok(FileChange {
        id: row.get(0)?,
        session_id: row.get(1)?,
        file_path: row.get(2)?,
        change_type: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn checkpoint_from_row(row: &Row<'_>) -> rusqlite::Result<Checkpoint> {
    Ok(Checkpoint {
        id: row.get(0)?,
        session_id: row.get(1)?,
        progress: row.get(2)?,
        changes_description: row.get(3)?,
        current_thinking: row.get(4)?,
        next_steps: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        id: row.get(0)?,
        session_id: row.get(1)?,
        file_path: row.get(2)?,
        content: row.get(3)?,
        content_hash: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn decision_from_row(row: &Row<'_>) -> rusqlite::Result<Decision> {
    let alternatives: String = row.get(4)?;
    Ok(Decision {
        id: row.get(0)?,
        session_id: row.get(1)?,
        description: row.get(2)?,
        reasoning: row.get(3)?,
        alternatives: serde_json::from_str(&alternatives).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        created_at: row.get(5)?,
    })
}

fn scope_validation_from_row(row: &Row<'_>) -> rusqlite::Result<ScopeValidation> {
    Ok(ScopeValidation {
        id: row.get(0)?,
        session_id: row.get(1)?,
        file_path: row.get(2)?,
        change_type: row.get(3)?,
        result: row.get(4)?,
        reason: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn feedback_from_row(row: &Row<'_>) -> rusqlite::Result<Feedback> {
    Ok(Feedback {
        id: row.get(0)?,
        session_id: row.get(1)?,
        kind: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

const FILE_CHANGE_COLUMNS: &str = "id, session_id, file_path, change_type, created_at";
const CHECKPOINT_COLUMNS: &str =
    "id, session_id, progress, changes_description, current_thinking, next_steps, created_at";
const SNAPSHOT_COLUMNS: &str = "id, session_id, file_path, content, content_hash, created_at";
const DECISION_COLUMNS: &str = "id, session_id, description, reasoning, alternatives, created_at";
const SCOPE_VALIDATION_COLUMNS: &str =
    "id, session_id, file_path, change_type, result, reason, created_at";
const FEEDBACK_COLUMNS: &str = "id, session_id, kind, content, created_at";

fn fetch_one<T>(
    conn: &Connection,
    table: &str,
    columns: &str,
    id: i64,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<T> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?1", columns, table);
    Ok(conn.query_row(&sql, params![id], map)?)
}

fn fetch_for_session<T>(
    conn: &Connection,
    table: &str,
    columns: &str,
    session_id: &str,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE session_id = ?1 ORDER BY created_at, id",
        columns, table
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![session_id], map)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub(crate) fn insert_file_change(
    conn: &Connection,
    session_id: &str,
    file_path: &str,
    change_type: ChangeType,
    at: DateTime<Utc>,
) -> Result<FileChange> {
    conn.execute(
        "INSERT INTO file_changes (session_id, file_path, change_type, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![session_id, file_path, change_type, at],
    )?;
    fetch_one(
        conn,
        "file_changes",
        FILE_CHANGE_COLUMNS,
        conn.last_insert_rowid(),
        file_change_from_row,
    )
}

pub(crate) fn insert_scope_validation(
    conn: &Connection,
    session_id: &str,
    file_path: &str,
    change_type: ChangeType,
    result: ValidationResult,
    reason: Option<&str>,
    at: DateTime<Utc>,
) -> Result<ScopeValidation> {
    conn.execute(
        "INSERT INTO scope_validations (session_id, file_path, change_type, result, reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![session_id, file_path, change_type, result, reason, at],
    )?;
    fetch_one(
        conn,
        "scope_validations",
        SCOPE_VALIDATION_COLUMNS,
        conn.last_insert_rowid(),
        scope_validation_from_row,
    )
}

pub(crate) fn insert_checkpoint(
    conn: &Connection,
    session_id: &str,
    input: &CreateCheckpointInput,
    at: DateTime<Utc>,
) -> Result<Checkpoint> {
    conn.execute(
        "INSERT INTO checkpoints (session_id, progress, changes_description, current_thinking,
            next_steps, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            session_id,
            input.progress,
            input.changes_description,
            input.current_thinking,
            input.next_steps,
            at
        ],
    )?;
    fetch_one(
        conn,
        "checkpoints",
        CHECKPOINT_COLUMNS,
        conn.last_insert_rowid(),
        checkpoint_from_row,
    )
}

pub(crate) fn insert_decision(
    conn: &Connection,
    session_id: &str,
    input: &LogDecisionInput,
    at: DateTime<Utc>,
) -> Result<Decision> {
    let alternatives = serde_json::to_string(&input.alternatives).map_err(WorkflowError::from)?;
    conn.execute(
        "INSERT INTO decisions (session_id, description, reasoning, alternatives, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![session_id, input.description, input.reasoning, alternatives, at],
    )?;
    fetch_one(
        conn,
        "decisions",
        DECISION_COLUMNS,
        conn.last_insert_rowid(),
        decision_from_row,
    )
}

pub(crate) fn find_snapshot(
    conn: &Connection,
    session_id: &str,
    file_path: &str,
    content_hash: &str,
) -> Result<Option<Snapshot>> {
    let sql = format!(
        "SELECT {} FROM snapshots WHERE session_id = ?1 AND file_path = ?2 AND content_hash = ?3",
        SNAPSHOT_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![session_id, file_path, content_hash], snapshot_from_row)
        .optional()?)
}

pub(crate) fn insert_snapshot(
    conn: &Connection,
    session_id: &str,
    file_path: &str,
    content: &str,
    content_hash: &str,
    at: DateTime<Utc>,
) -> Result<Snapshot> {
    conn.execute(
        "INSERT INTO snapshots (session_id, file_path, content, content_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![session_id, file_path, content, content_hash, at],
    )?;
    fetch_one(
        conn,
        "snapshots",
        SNAPSHOT_COLUMNS,
        conn.last_insert_rowid(),
        snapshot_from_row,
    )
}

pub(crate) fn insert_feedback(
    conn: &Connection,
    session_id: &str,
    kind: FeedbackKind,
    content: &str,
    at: DateTime<Utc>,
) -> Result<Feedback> {
    conn.execute(
        "INSERT INTO feedback (session_id, kind, content, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![session_id, kind, content, at],
    )?;
    fetch_one(
        conn,
        "feedback",
        FEEDBACK_COLUMNS,
        conn.last_insert_rowid(),
        feedback_from_row,
    )
}

pub(crate) fn session_counters(conn: &Connection, session_id: &str) -> Result<SessionCounters> {
    Ok(conn.query_row(
        "SELECT
            (SELECT COUNT(*) FROM file_changes WHERE session_id = ?1),
            (SELECT COUNT(*) FROM checkpoints WHERE session_id = ?1),
            (SELECT COUNT(*) FROM decisions WHERE session_id = ?1),
            (SELECT COUNT(*) FROM snapshots WHERE session_id = ?1),
            (SELECT COUNT(*) FROM scope_validations WHERE session_id = ?1 AND result = 'violation')",
        params![session_id],
        |row| {
            Ok(SessionCounters {
                files_changed: row.get(0)?,
                checkpoints: row.get(1)?,
                decisions: row.get(2)?,
                snapshots: row.get(3)?,
                scope_violations: row.get(4)?,
            })
        },
    )?)
}

impl Database {
    pub fn list_file_changes(&self, session_id: &str) -> Result<Vec<FileChange>> {
        self.with_connection(|conn| {
            fetch_for_session(conn, "file_changes", FILE_CHANGE_COLUMNS, session_id, file_change_from_row)
        })
    }

    pub fn list_checkpoints(&self, session_id: &str) -> Result<Vec<Checkpoint>> {
        self.with_connection(|conn| {
            fetch_for_session(conn, "checkpoints", CHECKPOINT_COLUMNS, session_id, checkpoint_from_row)
        })
    }

    pub fn list_snapshots(&self, session_id: &str) -> Result<Vec<Snapshot>> {
        self.with_connection(|conn| {
            fetch_for_session(conn, "snapshots", SNAPSHOT_COLUMNS, session_id, snapshot_from_row)
        })
    }

    pub fn list_decisions(&self, session_id: &str) -> Result<Vec<Decision>> {
        self.with_connection(|conn| {
            fetch_for_session(conn, "decisions", DECISION_COLUMNS, session_id, decision_from_row)
        })
    }

    pub fn list_scope_validations(&self, session_id: &str) -> Result<Vec<ScopeValidation>> {
        self.with_connection(|conn| {
            fetch_for_session(
                conn,
                "scope_validations",
                SCOPE_VALIDATION_COLUMNS,
                session_id,
                scope_validation_from_row,
            )
        })
    }

    pub fn list_feedback(&self, session_id: &str) -> Result<Vec<Feedback>> {
        self.with_connection(|conn| {
            fetch_for_session(conn, "feedback", FEEDBACK_COLUMNS, session_id, feedback_from_row)
        })
    }

    pub fn session_counters(&self, session_id: &str) -> Result<SessionCounters> {
        self.with_connection(|conn| session_counters(conn, session_id))
    }
}
