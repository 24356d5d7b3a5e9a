//! Core library for flowtrack.
//!
//! This crate tracks AI-assisted work through an Application → Feature →
//! Task hierarchy and the sessions recorded against it, independent of any
//! transport layer (MCP, CLI, etc.).
//!
//! - [`db`]: SQLite entity store.
//! - [`workflow`]: the status transition engine for features and tasks.
//! - [`compliance`]: the session compliance tracker.
//!
//! # Usage
//!
//! ```no_run
//! use flowtrack_core::models::*;
//! use flowtrack_core::workflow::TransitionRequest;
//! use flowtrack_core::{Config, Database, StatusEngine};
//!
//! let config = Config::default();
//! let db = Database::open_default()?;
//! db.migrate()?;
//!
//! let engine = StatusEngine::new(db.clone(), &config);
//! let outcome = engine.transition_task(1, TransitionRequest::to(TaskStatus::InProgress))?;
//! println!("{} -> {}", outcome.previous_status, outcome.new_status);
//! # Ok::<(), flowtrack_core::WorkflowError>(())
//! ```

pub mod clock;
pub mod compliance;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod workflow;

// Re-export commonly used types at crate root
pub use clock::{Clock, SystemClock};
pub use compliance::SessionTracker;
pub use config::{Config, TrackerConfig};
pub use db::Database;
pub use error::{EntityKind, Result, WorkflowError};
pub use workflow::StatusEngine;
