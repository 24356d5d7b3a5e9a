use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::Database;
use crate::error::{EntityKind, Result, WorkflowError};
use crate::models::{Application, CreateApplicationInput};

const COLUMNS: &str = "id, name, description, repository_url, metadata, created_at, updated_at";

fn application_from_row(row: &Row<'_>) -> rusqlite::Result<Application> {
    Ok(Application {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        repository_url: row.get(3)?,
        metadata: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

pub(crate) fn get_application(conn: &Connection, id: i64) -> Result<Option<Application>> {
    let sql = format!("SELECT {} FROM applications WHERE id = ?1", COLUMNS);
    Ok(conn
        .query_row(&sql, params![id], application_from_row)
        .optional()?)
}

impl Database {
    pub fn create_application(&self, input: CreateApplicationInput) -> Result<Application> {
        let name = input.name.trim().to_string();
        self.with_transaction(|tx| {
            let taken = tx
                .query_row(
                    "SELECT 1 FROM applications WHERE name = ?1",
                    params![name],
                    |_| Ok(()),
                )
                .optional()?;
            if taken.is_some() {
                return Err(WorkflowError::DuplicateName {
                    kind: EntityKind::Application,
                    name,
                });
            }

            let now = Utc::now();
            tx.execute(
                "INSERT INTO applications (name, description, repository_url, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![name, input.description, input.repository_url, input.metadata, now],
            )?;
            let id = tx.last_insert_rowid();
            tracing::info!("Created application {} ({})", id, name);

            get_application(tx, id)?.ok_or_else(|| WorkflowError::not_found(EntityKind::Application, id))
        })
    }

    pub fn get_application(&self, id: i64) -> Result<Option<Application>> {
        self.with_connection(|conn| get_application(conn, id))
    }

    pub fn list_applications(&self) -> Result<Vec<Application>> {
        self.with_connection(|conn| {
            let sql = format!("SELECT {} FROM applications ORDER BY name", COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], application_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }
}
