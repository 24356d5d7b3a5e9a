//! Runtime configuration.
//!
//! Loaded from a TOML file; every field has a default so a missing file or a
//! partial file is fine.
//!
//! ```toml
//! database_path = "/tmp/flowtrack.db"
//! default_actor = "assistant"
//!
//! [tracker]
//! checkpoint_interval_secs = 180
//! violation_penalty = 10
//! read_only_task_types = ["planning", "research"]
//! ```

use std::path::{Path, PathBuf};

use chrono::Duration;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkflowError};
use crate::models::SessionTaskType;

pub const CONFIG_ENV: &str = "FLOWTRACK_CONFIG";
pub const DATABASE_ENV: &str = "FLOWTRACK_DB";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub database_path: Option<PathBuf>,
    /// Recorded as `changed_by` when a transition names no actor.
    pub default_actor: String,
    pub tracker: TrackerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            default_actor: "assistant".to_string(),
            tracker: TrackerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerConfig {
    pub checkpoint_interval_secs: i64,
    /// Points taken off the compliance score per scope violation.
    pub violation_penalty: i64,
    /// Session types that may not touch files at all.
    pub read_only_task_types: Vec<SessionTaskType>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval_secs: 180,
            violation_penalty: 10,
            read_only_task_types: vec![SessionTaskType::Planning, SessionTaskType::Research],
        }
    }
}

/// Longest accepted checkpoint interval: one day.
pub const MAX_CHECKPOINT_INTERVAL_SECS: i64 = 86_400;

impl TrackerConfig {
    /// Clamped to `1..=MAX_CHECKPOINT_INTERVAL_SECS`, so a hand-built config
    /// that skipped validation still yields a representable duration.
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::seconds(
            self.checkpoint_interval_secs
                .clamp(1, MAX_CHECKPOINT_INTERVAL_SECS),
        )
    }
}

impl Config {
    /// Resolve the config file: explicit path, then `$FLOWTRACK_CONFIG`, then
    /// the platform config dir. `$FLOWTRACK_DB` overrides the database path.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .or_else(Self::default_path);

        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) if explicit.is_some() => {
                return Err(WorkflowError::Config(format!(
                    "config file {} does not exist",
                    path.display()
                )))
            }
            _ => Self::default(),
        };

        if let Some(db) = std::env::var_os(DATABASE_ENV) {
            config.database_path = Some(PathBuf::from(db));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| WorkflowError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml(&raw)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| WorkflowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "flowtrack", "flowtrack")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    fn validate(&self) -> Result<()> {
        if !(1..=MAX_CHECKPOINT_INTERVAL_SECS).contains(&self.tracker.checkpoint_interval_secs) {
            return Err(WorkflowError::Config(format!(
                "tracker.checkpoint_interval_secs must be between 1 and {}",
                MAX_CHECKPOINT_INTERVAL_SECS
            )));
        }
        if !(0..=100).contains(&self.tracker.violation_penalty) {
            return Err(WorkflowError::Config(
                "tracker.violation_penalty must be between 0 and 100".into(),
            ));
        }
        if self.default_actor.trim().is_empty() {
            return Err(WorkflowError::Config("default_actor must not be empty".into()));
        }
        Ok(())
    }
}
