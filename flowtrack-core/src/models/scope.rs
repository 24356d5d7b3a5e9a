use serde::{Deserialize, Serialize};

/// File-scope rules attached to an Application, Feature or Task through the
/// `scope` metadata key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScopePolicy {
    /// Glob patterns a change must match. Empty means "anything".
    pub include: Vec<String>,
    /// Glob patterns a change must not match.
    pub exclude: Vec<String>,
    /// `Some(false)` forbids deletions.
    pub allow_deletions: Option<bool>,
}

impl ScopePolicy {
    pub fn include<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: patterns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn excluding<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn without_deletions(mut self) -> Self {
        self.allow_deletions = Some(false);
        self
    }
}
