//! Scope compliance of a single file operation.

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

use crate::error::EntityKind;
use crate::models::{ChangeType, ScopePolicy, SessionTaskType};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ScopeVerdict {
    Pass,
    Violation { reason: String },
}

impl ScopeVerdict {
    fn violation(reason: impl Into<String>) -> Self {
        Self::Violation {
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Everything a session's scope is judged against.
#[derive(Debug, Clone)]
pub struct ScopeContext {
    pub task_type: SessionTaskType,
    /// Policies of the linked hierarchy, most specific level first.
    pub levels: Vec<(EntityKind, ScopePolicy)>,
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl ScopeContext {
    pub fn unrestricted(task_type: SessionTaskType) -> Self {
        Self {
            task_type,
            levels: Vec::new(),
        }
    }

    pub fn evaluate(
        &self,
        file_path: &str,
        change_type: ChangeType,
        read_only: &[SessionTaskType],
    ) -> ScopeVerdict {
        let path = normalize(file_path);
        if path.is_empty() {
            return ScopeVerdict::violation("empty file path");
        }
        if read_only.contains(&self.task_type) {
            return ScopeVerdict::violation(format!(
                "{} sessions do not change files ({} {})",
                self.task_type, change_type, path
            ));
        }

        // Globs are relative, so a scoped session must stay inside the workspace.
        if !self.levels.is_empty() {
            if is_absolute(&path) {
                return ScopeVerdict::violation(format!(
                    "{} is not relative to the workspace",
                    file_path
                ));
            }
            if path.split('/').any(|part| part == "..") {
                return ScopeVerdict::violation(format!("{} escapes the workspace", file_path));
            }
        }

        for (kind, policy) in &self.levels {
            if let Some(pattern) = policy.exclude.iter().find(|p| matches(p, &path)) {
                return ScopeVerdict::violation(format!(
                    "{} is excluded by {} scope pattern '{}'",
                    path, kind, pattern
                ));
            }
            if change_type == ChangeType::Deleted && policy.allow_deletions == Some(false) {
                return ScopeVerdict::violation(format!(
                    "deleting {} is not allowed by {} scope",
                    path, kind
                ));
            }
        }

        let include = self
            .levels
            .iter()
            .find(|(_, policy)| !policy.include.is_empty());
        if let Some((kind, policy)) = include {
            if !policy.include.iter().any(|p| matches(p, &path)) {
                return ScopeVerdict::violation(format!(
                    "{} is outside the {} scope ({})",
                    path,
                    kind,
                    policy.include.join(", ")
                ));
            }
        }

        ScopeVerdict::Pass
    }
}

/// Canonical spelling of a reported path: trimmed, `/`-separated, no
/// leading `./`.
pub(crate) fn normalize(file_path: &str) -> String {
    let path = file_path.trim().replace('\\', "/");
    path.strip_prefix("./").unwrap_or(&path).to_string()
}

fn is_absolute(path: &str) -> bool {
    path.starts_with('/') || path.as_bytes().get(1) == Some(&b':')
}

fn matches(pattern: &str, path: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(pattern) => pattern.matches_with(path, MATCH_OPTIONS),
        Err(e) => {
            tracing::warn!("Ignoring invalid scope pattern '{}': {}", pattern, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const READ_ONLY: &[SessionTaskType] = &[SessionTaskType::Planning, SessionTaskType::Research];

    fn context(levels: Vec<(EntityKind, ScopePolicy)>) -> ScopeContext {
        ScopeContext {
            task_type: SessionTaskType::CodeEditing,
            levels,
        }
    }

    #[test]
    fn no_rules_means_everything_passes() {
        let ctx = ScopeContext::unrestricted(SessionTaskType::CodeEditing);
        assert!(ctx
            .evaluate("src/checkout.ts", ChangeType::Modified, READ_ONLY)
            .is_pass());
        assert!(ctx
            .evaluate("./docs/readme.md", ChangeType::Deleted, READ_ONLY)
            .is_pass());
    }

    #[test]
    fn empty_paths_are_violations() {
        let ctx = ScopeContext::unrestricted(SessionTaskType::CodeEditing);
        assert!(!ctx.evaluate("  ", ChangeType::Created, READ_ONLY).is_pass());
    }

    #[test]
    fn unscoped_sessions_accept_absolute_paths() {
        let ctx = ScopeContext::unrestricted(SessionTaskType::CodeEditing);
        assert!(ctx
            .evaluate("/home/dev/shop/src/checkout.ts", ChangeType::Modified, READ_ONLY)
            .is_pass());
        assert!(ctx
            .evaluate("../sibling/notes.md", ChangeType::Created, READ_ONLY)
            .is_pass());
    }

    #[test]
    fn scoped_sessions_reject_paths_outside_the_workspace() {
        let ctx = context(vec![(EntityKind::Feature, ScopePolicy::include(["**"]))]);
        assert!(!ctx
            .evaluate("src/../../etc/passwd", ChangeType::Modified, READ_ONLY)
            .is_pass());
        assert!(!ctx
            .evaluate("/etc/hosts", ChangeType::Modified, READ_ONLY)
            .is_pass());
        assert!(!ctx
            .evaluate("C:\\repo\\main.rs", ChangeType::Modified, READ_ONLY)
            .is_pass());
    }

    #[test]
    fn read_only_session_types_cannot_change_files() {
        let ctx = ScopeContext::unrestricted(SessionTaskType::Research);
        let verdict = ctx.evaluate("src/lib.rs", ChangeType::Modified, READ_ONLY);
        match verdict {
            ScopeVerdict::Violation { reason } => assert!(reason.contains("research")),
            ScopeVerdict::Pass => panic!("expected a violation"),
        }

        let ctx = ScopeContext::unrestricted(SessionTaskType::Exploration);
        assert!(ctx
            .evaluate("scratch/notes.md", ChangeType::Created, READ_ONLY)
            .is_pass());
    }

    #[test]
    fn most_specific_include_wins() {
        let ctx = context(vec![
            (EntityKind::Task, ScopePolicy::include(["src/checkout/**"])),
            (EntityKind::Application, ScopePolicy::include(["src/**", "tests/**"])),
        ]);

        assert!(ctx
            .evaluate("src/checkout/coupon.ts", ChangeType::Modified, READ_ONLY)
            .is_pass());
        assert!(!ctx
            .evaluate("tests/coupon.spec.ts", ChangeType::Created, READ_ONLY)
            .is_pass());
    }

    #[test]
    fn any_level_can_exclude() {
        let ctx = context(vec![
            (EntityKind::Task, ScopePolicy::include(["src/**"])),
            (
                EntityKind::Application,
                ScopePolicy::default().excluding(["src/generated/**"]),
            ),
        ]);

        assert!(!ctx
            .evaluate("src/generated/api.ts", ChangeType::Modified, READ_ONLY)
            .is_pass());
        assert!(ctx
            .evaluate("src/api.ts", ChangeType::Modified, READ_ONLY)
            .is_pass());
    }

    #[test]
    fn single_star_stays_within_a_directory() {
        let ctx = context(vec![(EntityKind::Feature, ScopePolicy::include(["src/*.ts"]))]);
        assert!(ctx.evaluate("src/a.ts", ChangeType::Modified, READ_ONLY).is_pass());
        assert!(!ctx
            .evaluate("src/nested/a.ts", ChangeType::Modified, READ_ONLY)
            .is_pass());
    }

    #[test]
    fn deletions_can_be_forbidden() {
        let ctx = context(vec![(
            EntityKind::Feature,
            ScopePolicy::default().without_deletions(),
        )]);
        assert!(!ctx
            .evaluate("src/old.ts", ChangeType::Deleted, READ_ONLY)
            .is_pass());
        assert!(ctx
            .evaluate("src/old.ts", ChangeType::Modified, READ_ONLY)
            .is_pass());
    }

    #[test]
    fn normalize_gives_one_spelling_per_file() {
        assert_eq!(normalize(" ./src/a.ts "), "src/a.ts");
        assert_eq!(normalize("src\\a.ts"), "src/a.ts");
        assert_eq!(normalize("src/a.ts"), "src/a.ts");
    }

    #[test]
    fn windows_separators_are_normalized() {
        let ctx = context(vec![(EntityKind::Task, ScopePolicy::include(["src/**"]))]);
        assert!(ctx
            .evaluate("src\\checkout.ts", ChangeType::Modified, READ_ONLY)
            .is_pass());
    }
}
