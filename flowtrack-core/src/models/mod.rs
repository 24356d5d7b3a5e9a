//! Domain models for flowtrack.
//!
//! # Hierarchy
//!
//! - [`Application`]: top-level tracked product; owns features.
//! - [`Feature`]: major functionality grouping; owns tasks.
//! - [`Task`]: a specific work item.
//!
//! Features and tasks carry a [`WorkflowState`] whose status only changes
//! through the transition engine, which appends to the [`StatusHistory`].
//!
//! # Sessions
//!
//! - [`Session`]: one working period, optionally scoped to any level above.
//! - [`FileChange`], [`Checkpoint`], [`Snapshot`], [`Decision`],
//!   [`ScopeValidation`], [`Feedback`]: immutable audit records owned by a session.

/// `Display`, `ToSql` and `FromSql` for enums stored as their `as_str`
/// text. Parsed back with `from_str` unless another function is named
/// after `via`.
macro_rules! sql_enum {
    (@impl $ty:ty, $parse:ident) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl rusqlite::types::ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $ty {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                let s = value.as_str()?;
                <$ty>::$parse(s).ok_or_else(|| {
                    rusqlite::types::FromSqlError::Other(
                        format!("unexpected value '{}'", s).into(),
                    )
                })
            }
        }
    };
    ($($ty:ty),+ ; via $parse:ident) => {
        $( $crate::models::sql_enum!(@impl $ty, $parse); )+
    };
    ($($ty:ty),+ $(,)?) => {
        $( $crate::models::sql_enum!(@impl $ty, from_str); )+
    };
}

pub(crate) use sql_enum;

mod activity;
mod application;
mod feature;
mod metadata;
mod scope;
mod session;
mod status;
mod task;
mod workflow_state;

pub use activity::*;
pub use application::*;
pub use feature::*;
pub use metadata::*;
pub use scope::*;
pub use session::*;
pub use status::*;
pub use task::*;
pub use workflow_state::*;
