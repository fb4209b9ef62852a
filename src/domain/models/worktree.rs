//! Worktree domain model.
//!
//! Role worktrees are disposable, detached checkouts used to replay a step
//! for a side role without touching the primary workspace.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A role's execution workspace.
///
/// Created right before a role runs and destroyed right after, whether or not
/// the role succeeded. When isolation is unavailable the session points at the
/// main workspace with `fallback = true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeSession {
    pub role: String,
    pub path: PathBuf,
    pub created: bool,
    pub fallback: bool,
    pub reason: Option<String>,
}

impl WorktreeSession {
    pub fn isolated(role: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            role: role.into(),
            path: path.into(),
            created: true,
            fallback: false,
            reason: None,
        }
    }

    pub fn fallback(
        role: impl Into<String>,
        root: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            path: root.into(),
            created: false,
            fallback: true,
            reason: Some(reason.into()),
        }
    }
}

/// Replace every character outside `[A-Za-z0-9_.]` with `-`.
pub fn sanitize_path_component(raw: &str) -> String {
    let sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "unnamed".to_string()
    } else {
        sanitized
    }
}
