//! SQLite-backed entity store.
//!
//! Every operation re-reads current state; nothing is cached across calls.
//! Mutations that read before they write run inside a single transaction.

mod activity;
mod applications;
mod features;
mod schema;
mod sessions;
mod tasks;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::error::{Result, WorkflowError};
use crate::models::{Workflow, WorkflowState};

pub(crate) use activity::*;
pub(crate) use applications::get_application;
pub(crate) use features::*;
pub(crate) use sessions::*;
pub(crate) use tasks::*;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                WorkflowError::Config(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path)?;
        tracing::debug!("Opened database at {}", path.display());
        Self::from_connection(conn)
    }

    /// Open the database in the platform data directory.
    pub fn open_default() -> Result<Self> {
        let dirs = ProjectDirs::from("dev", "flowtrack", "flowtrack").ok_or_else(|| {
            WorkflowError::Config("could not determine a data directory".into())
        })?;
        Self::open(&dirs.data_dir().join("flowtrack.db"))
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self::from_connection(conn)?;
        db.migrate()?;
        Ok(db)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        self.lock().execute_batch(schema::SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave SQLite half-written:
        // open transactions roll back when dropped.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock();
        f(&conn)
    }

    /// Run `f` in a transaction, committing only when it returns `Ok`.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// A workflow entity with its own table.
pub trait WorkflowRecord: Workflow + Sized {
    const TABLE: &'static str;

    fn load(conn: &Connection, id: i64) -> Result<Option<Self>>;
}

pub(crate) fn record_exists<E: WorkflowRecord>(conn: &Connection, id: i64) -> Result<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?1", E::TABLE);
    let found = conn
        .query_row(&sql, params![id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn save_workflow<E: WorkflowRecord>(conn: &Connection, entity: &E) -> Result<()> {
    let sql = format!(
        "UPDATE {} SET status = ?1, blocking_reason = ?2, blocked_by_id = ?3,
            status_updated_at = ?4, status_history = ?5, updated_at = ?4
         WHERE id = ?6",
        E::TABLE
    );
    let WorkflowState {
        status,
        blocking_reason,
        blocked_by_id,
        status_updated_at,
        status_history,
    } = entity.workflow();
    let changed = conn.execute(
        &sql,
        params![
            status,
            blocking_reason,
            blocked_by_id,
            status_updated_at,
            status_history,
            entity.id()
        ],
    )?;
    if changed == 0 {
        return Err(WorkflowError::not_found(
            <E::Status as crate::models::WorkflowStatus>::KIND,
            entity.id(),
        ));
    }
    Ok(())
}
