use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerInfo},
    schemars::JsonSchema,
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};

use flowtrack_core::models::*;
use flowtrack_core::{Config, Database, EntityKind, SessionTracker, StatusEngine};

#[derive(Clone)]
pub struct McpServer {
    db: Database,
    engine: StatusEngine,
    tracker: SessionTracker,
    tool_router: ToolRouter<Self>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateApplicationRequest {
    #[schemars(description = "Unique application name")]
    pub name: String,
    pub description: Option<String>,
    pub repository_url: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateFeatureRequest {
    #[schemars(description = "Parent application ID")]
    pub application_id: i64,
    #[schemars(description = "Feature name, unique within the application")]
    pub name: String,
    pub description: Option<String>,
    #[schemars(description = "Higher is more urgent")]
    pub priority: Option<i64>,
    #[schemars(description = "Glob patterns file changes must match")]
    #[serde(default)]
    pub scope_include: Vec<String>,
    #[schemars(description = "Glob patterns file changes must not match")]
    #[serde(default)]
    pub scope_exclude: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateTaskRequest {
    #[schemars(description = "Parent feature ID")]
    pub feature_id: i64,
    #[schemars(description = "Task name, unique within the feature")]
    pub name: String,
    pub description: Option<String>,
    pub acceptance_criteria: Option<String>,
    pub priority: Option<i64>,
    #[serde(default)]
    pub scope_include: Vec<String>,
    #[serde(default)]
    pub scope_exclude: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TransitionStatusRequest {
    #[schemars(description = "Either 'feature' or 'task'")]
    pub entity_kind: String,
    pub entity_id: i64,
    #[schemars(description = "Target status, e.g. 'in_progress' or 'blocked'")]
    pub status: String,
    #[schemars(description = "Required when the status is 'blocked'")]
    pub blocking_reason: Option<String>,
    #[schemars(description = "ID of the blocking feature/task; required when the status is 'blocked'")]
    pub blocked_by_id: Option<i64>,
    pub changed_by: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct InitializeSessionRequest {
    #[schemars(description = "Session token; generated when omitted")]
    pub session_id: Option<String>,
    pub task_id: Option<i64>,
    pub feature_id: Option<i64>,
    pub application_id: Option<i64>,
    #[schemars(description = "code-editing, planning, research or exploration")]
    pub task_type: Option<String>,
    pub context_description: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RecordFileChangeRequest {
    pub session_id: String,
    pub file_path: String,
    #[schemars(description = "created, modified or deleted")]
    pub change_type: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionRequest {
    pub session_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateCheckpointRequest {
    pub session_id: String,
    pub progress: String,
    pub changes_description: String,
    pub current_thinking: String,
    pub next_steps: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LogDecisionRequest {
    pub session_id: String,
    pub description: String,
    pub reasoning: String,
    #[serde(default)]
    pub alternatives: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateSnapshotRequest {
    pub session_id: String,
    pub file_path: String,
    #[schemars(description = "Full file content")]
    pub content: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RecordFeedbackRequest {
    pub session_id: String,
    #[schemars(description = "issue, suggestion or praise")]
    pub kind: String,
    pub content: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EndSessionRequest {
    pub session_id: String,
    pub summary: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AbandonSessionRequest {
    pub session_id: String,
    pub reason: String,
}

impl McpServer {
    pub fn new(db: Database, config: &Config) -> Self {
        Self {
            engine: StatusEngine::new(db.clone(), config),
            tracker: SessionTracker::new(db.clone(), config.tracker.clone()),
            db,
            tool_router: Self::tool_router(),
        }
    }

    fn parse<T>(value: &str, what: &str, parse: fn(&str) -> Option<T>) -> Result<T, McpError> {
        parse(value.trim())
            .ok_or_else(|| McpError::invalid_params(format!("Invalid {}: {}", what, value), None))
    }

    /// Caller-fixable failures become tool errors the assistant can read;
    /// store failures become protocol errors.
    fn respond<T: Serialize>(result: flowtrack_core::Result<T>) -> Result<CallToolResult, McpError> {
        match result {
            Ok(value) => {
                let json = serde_json::to_string_pretty(&value)
                    .map_err(|e| McpError::internal_error(e.to_string(), None))?;
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            Err(e) if e.is_validation() => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
            Err(e) => {
                tracing::error!("Tool call failed: {}", e);
                Err(McpError::internal_error(e.to_string(), None))
            }
        }
    }

    fn scope_metadata(include: Vec<String>, exclude: Vec<String>) -> Metadata {
        if include.is_empty() && exclude.is_empty() {
            return Metadata::default();
        }
        Metadata::default().with_scope(&ScopePolicy::include(include).excluding(exclude))
    }
}

#[tool_router]
impl McpServer {
    #[tool(description = "Create an application, the root of the feature/task hierarchy")]
    async fn create_application(
        &self,
        params: Parameters<CreateApplicationRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        Self::respond(self.db.create_application(CreateApplicationInput {
            name: req.name,
            description: req.description,
            repository_url: req.repository_url,
            metadata: Metadata::default(),
        }))
    }

    #[tool(description = "Create a feature within an application")]
    async fn create_feature(
        &self,
        params: Parameters<CreateFeatureRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        Self::respond(self.db.create_feature(
            req.application_id,
            CreateFeatureInput {
                name: req.name,
                description: req.description,
                priority: req.priority,
                status: None,
                metadata: Self::scope_metadata(req.scope_include, req.scope_exclude),
            },
        ))
    }

    #[tool(description = "Create a task within a feature")]
    async fn create_task(
        &self,
        params: Parameters<CreateTaskRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        Self::respond(self.db.create_task(
            req.feature_id,
            CreateTaskInput {
                name: req.name,
                description: req.description,
                acceptance_criteria: req.acceptance_criteria,
                priority: req.priority,
                status: None,
                metadata: Self::scope_metadata(req.scope_include, req.scope_exclude),
            },
        ))
    }

    #[tool(description = "Change the status of a feature or task. 'blocked' needs a reason and the blocking entity ID")]
    async fn transition_status(
        &self,
        params: Parameters<TransitionStatusRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let kind = match Self::parse(&req.entity_kind, "entity kind", EntityKind::from_str)? {
            kind @ (EntityKind::Feature | EntityKind::Task) => kind,
            other => {
                return Err(McpError::invalid_params(
                    format!("{} has no status lifecycle", other),
                    None,
                ))
            }
        };
        Self::respond(self.engine.transition_status(
            kind,
            req.entity_id,
            &req.status,
            req.blocking_reason,
            req.blocked_by_id,
            req.changed_by,
        ))
    }

    #[tool(description = "Start a working session, optionally scoped to a task, feature or application")]
    async fn initialize_session(
        &self,
        params: Parameters<InitializeSessionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let task_type = match req.task_type.as_deref() {
            Some(value) => Self::parse(value, "task type", SessionTaskType::from_str)?,
            None => SessionTaskType::CodeEditing,
        };
        Self::respond(self.tracker.initialize_session(InitializeSessionInput {
            id: req.session_id,
            task_id: req.task_id,
            feature_id: req.feature_id,
            application_id: req.application_id,
            task_type,
            context_description: req.context_description,
        }))
    }

    #[tool(description = "Record a file change; out-of-scope changes are rejected and lower the compliance score")]
    async fn record_file_change(
        &self,
        params: Parameters<RecordFileChangeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let change_type = Self::parse(&req.change_type, "change type", ChangeType::from_str)?;
        Self::respond(
            self.tracker
                .record_file_change(&req.session_id, &req.file_path, change_type),
        )
    }

    #[tool(description = "Report session activity and whether a checkpoint is due")]
    async fn checkpoint_status(
        &self,
        params: Parameters<SessionRequest>,
    ) -> Result<CallToolResult, McpError> {
        Self::respond(self.tracker.session_report(&params.0.session_id))
    }

    #[tool(description = "Record a progress checkpoint")]
    async fn create_checkpoint(
        &self,
        params: Parameters<CreateCheckpointRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        Self::respond(self.tracker.create_checkpoint(
            &req.session_id,
            CreateCheckpointInput {
                progress: req.progress,
                changes_description: req.changes_description,
                current_thinking: req.current_thinking,
                next_steps: req.next_steps,
            },
        ))
    }

    #[tool(description = "Record a development decision and its reasoning")]
    async fn log_decision(
        &self,
        params: Parameters<LogDecisionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        Self::respond(self.tracker.log_decision(
            &req.session_id,
            LogDecisionInput {
                description: req.description,
                reasoning: req.reasoning,
                alternatives: req.alternatives,
            },
        ))
    }

    #[tool(description = "Capture file content; unchanged content is reported as a duplicate")]
    async fn create_snapshot(
        &self,
        params: Parameters<CreateSnapshotRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        Self::respond(
            self.tracker
                .create_snapshot(&req.session_id, &req.file_path, &req.content),
        )
    }

    #[tool(description = "Leave feedback on the session")]
    async fn record_feedback(
        &self,
        params: Parameters<RecordFeedbackRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let kind = Self::parse(&req.kind, "feedback kind", FeedbackKind::from_str)?;
        Self::respond(
            self.tracker
                .record_feedback(&req.session_id, kind, &req.content),
        )
    }

    #[tool(description = "Complete the session; returns the next task and whether the feature is done")]
    async fn end_session(
        &self,
        params: Parameters<EndSessionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        Self::respond(self.tracker.end_session(&req.session_id, &req.summary))
    }

    #[tool(description = "Abandon the session without completing it")]
    async fn abandon_session(
        &self,
        params: Parameters<AbandonSessionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        Self::respond(self.tracker.abandon_session(&req.session_id, &req.reason))
    }
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "flowtrack MCP server: track feature/task status and record session activity. \
                 Start a session, record file changes, checkpoint every few minutes, end the session."
                    .into(),
            ),
            ..Default::default()
        }
    }
}

pub async fn run_stdio_server(db: Database, config: &Config) -> anyhow::Result<()> {
    use tokio::io::{stdin, stdout};

    tracing::info!("Starting MCP server via stdio");

    let service = McpServer::new(db, config);
    let server = service.serve((stdin(), stdout())).await?;

    let quit_reason = server.waiting().await?;
    tracing::info!("MCP server stopped: {:?}", quit_reason);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> McpServer {
        let db = Database::open_memory().unwrap();
        McpServer::new(db, &Config::default())
    }

    #[test]
    fn validation_failures_are_tool_errors() {
        let server = server();
        let result = tokio_test::block_on(server.transition_status(Parameters(
            TransitionStatusRequest {
                entity_kind: "task".into(),
                entity_id: 1,
                status: "in_progress".into(),
                blocking_reason: None,
                blocked_by_id: None,
                changed_by: None,
            },
        )))
        .unwrap();
        assert_eq!(result.is_error, Some(true));
    }

    #[test]
    fn rejects_unknown_change_types() {
        let server = server();
        let result = tokio_test::block_on(server.record_file_change(Parameters(
            RecordFileChangeRequest {
                session_id: "s".into(),
                file_path: "src/a.ts".into(),
                change_type: "renamed".into(),
            },
        )));
        assert!(result.is_err());
    }

    #[test]
    fn applications_have_no_status() {
        let server = server();
        let result = tokio_test::block_on(server.transition_status(Parameters(
            TransitionStatusRequest {
                entity_kind: "application".into(),
                entity_id: 1,
                status: "completed".into(),
                blocking_reason: None,
                blocked_by_id: None,
                changed_by: None,
            },
        )));
        assert!(result.is_err());
    }

    #[test]
    fn a_session_round_trip_succeeds() {
        let server = server();
        let session = server
            .tracker
            .initialize_session(InitializeSessionInput {
                id: Some("mcp-1".into()),
                ..Default::default()
            })
            .unwrap();

        let result = tokio_test::block_on(server.record_file_change(Parameters(
            RecordFileChangeRequest {
                session_id: session.id.clone(),
                file_path: "src/a.ts".into(),
                change_type: "created".into(),
            },
        )))
        .unwrap();
        assert_eq!(result.is_error, Some(false));

        let result = tokio_test::block_on(server.end_session(Parameters(EndSessionRequest {
            session_id: session.id,
            summary: "done".into(),
        })))
        .unwrap();
        assert_eq!(result.is_error, Some(false));
    }
}
