//! Git data types and structures
//!
//! Contains all shared types used across git operations

use serde::{Deserialize, Serialize};

/// Represents a git commit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub id: String,
    pub short_id: String,
    pub message: String,
    pub timestamp: i64,
}

/// Represents a git worktree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeInfo {
    pub name: String,
    pub path: String,
    pub branch: Option<String>,
    pub is_locked: bool,
}

/// Where the target branch was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Fetched from the remote; diff against the remote-tracking ref
    Fetched { remote_ref: String },
    /// No such remote configured; the local branch is used as-is
    LocalOnly { local_ref: String },
}

impl FetchOutcome {
    /// The ref to compare against
    pub fn target_ref(&self) -> &str {
        match self {
            FetchOutcome::Fetched { remote_ref } => remote_ref,
            FetchOutcome::LocalOnly { local_ref } => local_ref,
        }
    }
}

/// Result of a three-way merge dry run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeCheck {
    pub merge_base: Option<String>,
    pub conflicting_files: Vec<String>,
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
    /// Refs that could not be resolved
    pub unreadable: Vec<String>,
}

impl MergeCheck {
    /// Human readable payload describing the check
    pub fn describe(&self) -> String {
        let mut lines = Vec::new();
        for unreadable in &self.unreadable {
            lines.push(format!("unreadable ref: {}", unreadable));
        }
        if let Some(base) = &self.merge_base {
            lines.push(format!("merge-base: {}", base));
        }
        lines.push(format!(
            "{} file(s) changed, {} insertion(s), {} deletion(s)",
            self.files_changed, self.insertions, self.deletions
        ));
        for path in &self.conflicting_files {
            lines.push(format!("CONFLICT (content): {}", path));
        }
        lines.join("\n")
    }
}
