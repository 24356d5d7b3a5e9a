//! flowtrack: workflow state and session compliance tracking for
//! AI-assisted development, served over MCP.

pub mod mcp;

pub use flowtrack_core::{db, models, Config, Database};
