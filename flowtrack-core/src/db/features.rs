use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{applications::get_application, Database, WorkflowRecord};
use crate::error::{EntityKind, Result, WorkflowError};
use crate::models::{
    CreateFeatureInput, Feature, FeatureStatus, StatusHistory, WorkflowState, WorkflowStatus,
};

const COLUMNS: &str = "id, application_id, name, description, status, priority, blocking_reason, \
     blocked_by_id, status_updated_at, status_history, metadata, created_at, updated_at";

fn feature_from_row(row: &Row<'_>) -> rusqlite::Result<Feature> {
    Ok(Feature {
        id: row.get(0)?,
        application_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        workflow: WorkflowState {
            status: row.get(4)?,
            blocking_reason: row.get(6)?,
            blocked_by_id: row.get(7)?,
            status_updated_at: row.get(8)?,
            status_history: row.get(9)?,
        },
        priority: row.get(5)?,
        metadata: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

pub(crate) fn get_feature(conn: &Connection, id: i64) -> Result<Option<Feature>> {
    let sql = format!("SELECT {} FROM features WHERE id = ?1", COLUMNS);
    Ok(conn.query_row(&sql, params![id], feature_from_row).optional()?)
}

impl WorkflowRecord for Feature {
    const TABLE: &'static str = "features";

    fn load(conn: &Connection, id: i64) -> Result<Option<Self>> {
        get_feature(conn, id)
    }
}

impl Database {
    /// Create a feature under an existing application.
    ///
    /// The initial status defaults to `planned`; a feature cannot be born
    /// `blocked` because it has no blocker yet. The status history starts empty.
    pub fn create_feature(&self, application_id: i64, input: CreateFeatureInput) -> Result<Feature> {
        let status = input.status.unwrap_or(FeatureStatus::Planned);
        if status.is_blocked() {
            return Err(WorkflowError::MissingBlockingInfo {
                kind: EntityKind::Feature,
            });
        }
        let name = input.name.trim().to_string();

        self.with_transaction(|tx| {
            if get_application(tx, application_id)?.is_none() {
                return Err(WorkflowError::parent_not_found(
                    EntityKind::Application,
                    application_id,
                ));
            }
            let taken = tx
                .query_row(
                    "SELECT 1 FROM features WHERE application_id = ?1 AND name = ?2",
                    params![application_id, name],
                    |_| Ok(()),
                )
                .optional()?;
            if taken.is_some() {
                return Err(WorkflowError::DuplicateName {
                    kind: EntityKind::Feature,
                    name,
                });
            }

            let now = Utc::now();
            tx.execute(
                "INSERT INTO features (application_id, name, description, status, priority,
                    status_updated_at, status_history, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?6, ?6)",
                params![
                    application_id,
                    name,
                    input.description,
                    status,
                    input.priority.unwrap_or(0),
                    now,
                    StatusHistory::<FeatureStatus>::default(),
                    input.metadata,
                ],
            )?;
            let id = tx.last_insert_rowid();
            tracing::info!("Created feature {} ({}) in application {}", id, name, application_id);

            get_feature(tx, id)?.ok_or_else(|| WorkflowError::not_found(EntityKind::Feature, id))
        })
    }

    pub fn get_feature(&self, id: i64) -> Result<Option<Feature>> {
        self.with_connection(|conn| get_feature(conn, id))
    }

    /// Features of an application, most urgent first.
    pub fn list_features(&self, application_id: i64) -> Result<Vec<Feature>> {
        self.with_connection(|conn| {
            let sql = format!(
                "SELECT {} FROM features WHERE application_id = ?1 ORDER BY priority DESC, id",
                COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![application_id], feature_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }
}
