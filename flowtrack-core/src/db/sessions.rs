use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::Database;
use crate::error::Result;
use crate::models::{Session, SessionStatus, SessionTaskType};

const COLUMNS: &str = "id, task_id, feature_id, application_id, task_type, context_description, \
     status, start_time, end_time, summary, last_checkpoint_at, last_file_change_at, \
     last_decision_at, compliance_score";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        task_id: row.get(1)?,
        feature_id: row.get(2)?,
        application_id: row.get(3)?,
        task_type: row.get(4)?,
        context_description: row.get(5)?,
        status: row.get(6)?,
        start_time: row.get(7)?,
        end_time: row.get(8)?,
        summary: row.get(9)?,
        last_checkpoint_at: row.get(10)?,
        last_file_change_at: row.get(11)?,
        last_decision_at: row.get(12)?,
        compliance_score: row.get(13)?,
    })
}

pub(crate) struct NewSession<'a> {
    pub id: &'a str,
    pub task_id: Option<i64>,
    pub feature_id: Option<i64>,
    pub application_id: Option<i64>,
    pub task_type: SessionTaskType,
    pub context_description: Option<&'a str>,
    pub start_time: DateTime<Utc>,
}

pub(crate) fn insert_session(conn: &Connection, new: &NewSession<'_>) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (id, task_id, feature_id, application_id, task_type,
            context_description, status, start_time, compliance_score)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            new.id,
            new.task_id,
            new.feature_id,
            new.application_id,
            new.task_type,
            new.context_description,
            SessionStatus::Active,
            new.start_time,
            Session::MAX_COMPLIANCE_SCORE,
        ],
    )?;
    Ok(())
}

pub(crate) fn get_session(conn: &Connection, id: &str) -> Result<Option<Session>> {
    let sql = format!("SELECT {} FROM sessions WHERE id = ?1", COLUMNS);
    Ok(conn.query_row(&sql, params![id], session_from_row).optional()?)
}

/// Session activity timestamps the tracker maintains.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ActivityMark {
    Checkpoint,
    FileChange,
    Decision,
}

impl ActivityMark {
    fn column(self) -> &'static str {
        match self {
            Self::Checkpoint => "last_checkpoint_at",
            Self::FileChange => "last_file_change_at",
            Self::Decision => "last_decision_at",
        }
    }
}

pub(crate) fn mark_activity(
    conn: &Connection,
    id: &str,
    mark: ActivityMark,
    at: DateTime<Utc>,
) -> Result<()> {
    let sql = format!("UPDATE sessions SET {} = ?1 WHERE id = ?2", mark.column());
    conn.execute(&sql, params![at, id])?;
    Ok(())
}

/// Take `penalty` points off the score in one statement, floored at zero,
/// and return the new score.
pub(crate) fn apply_penalty(conn: &Connection, id: &str, penalty: i64) -> Result<i64> {
    conn.execute(
        "UPDATE sessions SET compliance_score = MAX(0, compliance_score - ?1) WHERE id = ?2",
        params![penalty, id],
    )?;
    Ok(conn.query_row(
        "SELECT compliance_score FROM sessions WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?)
}

/// Move an active session to a terminal status. Returns false when the
/// session was no longer active.
pub(crate) fn close_session(
    conn: &Connection,
    id: &str,
    status: SessionStatus,
    summary: &str,
    at: DateTime<Utc>,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE sessions SET status = ?1, end_time = ?2, summary = ?3
         WHERE id = ?4 AND status = ?5",
        params![status, at, summary, id, SessionStatus::Active],
    )?;
    Ok(changed > 0)
}

impl Database {
    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        self.with_connection(|conn| get_session(conn, id))
    }

    /// Sessions newest first.
    pub fn list_sessions(&self, active_only: bool) -> Result<Vec<Session>> {
        self.with_connection(|conn| {
            let sql = format!(
                "SELECT {} FROM sessions WHERE (?1 = 0 OR status = 'active')
                 ORDER BY start_time DESC, id",
                COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![active_only], session_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }
}
