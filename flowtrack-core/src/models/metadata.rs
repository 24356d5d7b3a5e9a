use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ScopePolicy;

/// Open key/value bag stored as a JSON document column.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Metadata(pub Map<String, Value>);

impl Metadata {
    pub const SCOPE_KEY: &'static str = "scope";

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Scope rules stored under `scope`, if any.
    ///
    /// A malformed `scope` value is ignored with a warning rather than
    /// failing every file change in the session.
    pub fn scope_policy(&self) -> Option<ScopePolicy> {
        let raw = self.0.get(Self::SCOPE_KEY)?;
        match serde_json::from_value(raw.clone()) {
            Ok(policy) => Some(policy),
            Err(e) => {
                tracing::warn!("Ignoring malformed scope metadata: {}", e);
                None
            }
        }
    }

    /// Store `policy` under `scope`, in the shape `scope_policy` reads back.
    pub fn with_scope(mut self, policy: &ScopePolicy) -> Self {
        let patterns =
            |list: &[String]| Value::Array(list.iter().cloned().map(Value::String).collect());

        let mut scope = Map::new();
        scope.insert("include".to_string(), patterns(policy.include.as_slice()));
        scope.insert("exclude".to_string(), patterns(policy.exclude.as_slice()));
        scope.insert(
            "allow_deletions".to_string(),
            policy.allow_deletions.map_or(Value::Null, Value::Bool),
        );
        self.0.insert(Self::SCOPE_KEY.to_string(), Value::Object(scope));
        self
    }
}

impl ToSql for Metadata {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let json = serde_json::to_string(&self.0)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(json))
    }
}

impl FromSql for Metadata {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        serde_json::from_str(raw)
            .map(Self)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
