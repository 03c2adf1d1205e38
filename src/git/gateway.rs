//! Version-control seam used by agent sessions
//!
//! `VersionControlGateway` is the only way a session talks to version
//! control. `GitGateway` implements it on top of [`GitManager`], running each
//! git2 call on tokio's blocking pool.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::GitError;
use crate::git::GitManager;
use crate::models::ConflictReport;

/// Sentinel returned by `current_branch` when the branch cannot be read
pub const UNKNOWN_BRANCH: &str = "unknown";

#[async_trait]
pub trait VersionControlGateway: Send + Sync {
    /// Switch the workspace to `branch`
    async fn checkout(&self, branch: &str) -> Result<(), GitError>;

    /// Branch the workspace is on, or [`UNKNOWN_BRANCH`]
    async fn current_branch(&self) -> String;

    /// Revision HEAD points at, if any
    async fn head_revision(&self) -> Option<String>;

    /// Bring the target branch up to date and return the ref to diff against
    async fn fetch_target(&self, target_branch: &str) -> Result<String, GitError>;

    /// Common ancestor of two refs, if one exists
    async fn merge_base(&self, ref_a: &str, ref_b: &str) -> Option<String>;

    /// Three-way comparison of `branch_a` and `branch_b` over `base`.
    /// Fails only if neither ref can be read.
    async fn diff(
        &self,
        base: Option<&str>,
        branch_a: &str,
        branch_b: &str,
    ) -> Result<ConflictReport, GitError>;

    /// Commit all pending work. `Ok(None)` means there was nothing to commit.
    async fn commit(&self, message: &str) -> Result<Option<String>, GitError>;

    /// Whether commits landed within `window`. Informational only.
    async fn has_recent_commits(&self, _window: Duration) -> bool {
        false
    }
}

/// git2-backed gateway bound to one working directory
#[derive(Debug, Clone)]
pub struct GitGateway {
    repo_path: PathBuf,
    remote: String,
    author_name: String,
    author_email: String,
    create_missing_branches: bool,
    excluded_paths: Vec<String>,
}

impl GitGateway {
    pub fn new(repo_path: &Path) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
            remote: "origin".to_string(),
            author_name: "Branchwork Agent".to_string(),
            author_email: "agent@branchwork.local".to_string(),
            create_missing_branches: true,
            excluded_paths: Vec::new(),
        }
    }

    pub fn with_remote(mut self, remote: &str) -> Self {
        self.remote = remote.to_string();
        self
    }

    pub fn with_author(mut self, name: &str, email: &str) -> Self {
        self.author_name = name.to_string();
        self.author_email = email.to_string();
        self
    }

    pub fn with_create_missing_branches(mut self, create: bool) -> Self {
        self.create_missing_branches = create;
        self
    }

    /// Never stage or commit anything under `path` (relative to the workdir)
    pub fn with_excluded_path(mut self, path: &str) -> Self {
        self.excluded_paths.push(path.to_string());
        self
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Open the repository on the blocking pool and run `op` against it
    async fn with_manager<T, F>(&self, op: F) -> Result<T, GitError>
    where
        T: Send + 'static,
        F: FnOnce(GitManager) -> Result<T, GitError> + Send + 'static,
    {
        let repo_path = self.repo_path.clone();
        tokio::task::spawn_blocking(move || {
            let manager = GitManager::new(&repo_path).map_err(|e| GitError::Open {
                path: repo_path.display().to_string(),
                message: e.message().to_string(),
            })?;
            op(manager)
        })
        .await
        .map_err(|e| GitError::Open {
            path: self.repo_path.display().to_string(),
            message: format!("git task panicked: {}", e),
        })?
    }
}

#[async_trait]
impl VersionControlGateway for GitGateway {
    async fn checkout(&self, branch: &str) -> Result<(), GitError> {
        let name = branch.to_string();
        let create = self.create_missing_branches;
        self.with_manager(move |git| {
            git.checkout_branch(&name, create)
                .map_err(|e| GitError::Checkout {
                    branch: name.clone(),
                    message: e.message().to_string(),
                })
        })
        .await
        .map_err(|e| match e {
            GitError::Open { message, .. } => GitError::Checkout {
                branch: branch.to_string(),
                message,
            },
            other => other,
        })
    }

    async fn current_branch(&self) -> String {
        let branch = self
            .with_manager(|git| Ok(git.current_branch_name().ok()))
            .await
            .ok()
            .flatten();
        branch.unwrap_or_else(|| {
            log::debug!("[GitGateway] Cannot read current branch, reporting unknown");
            UNKNOWN_BRANCH.to_string()
        })
    }

    async fn head_revision(&self) -> Option<String> {
        self.with_manager(|git| Ok(git.head_revision()))
            .await
            .ok()
            .flatten()
    }

    async fn fetch_target(&self, target_branch: &str) -> Result<String, GitError> {
        let target = target_branch.to_string();
        let remote = self.remote.clone();
        self.with_manager(move |git| {
            git.fetch_branch(&remote, &target)
                .map(|outcome| outcome.target_ref().to_string())
                .map_err(|e| GitError::Fetch {
                    target: target.clone(),
                    message: e.message().to_string(),
                })
        })
        .await
    }

    async fn merge_base(&self, ref_a: &str, ref_b: &str) -> Option<String> {
        let (a, b) = (ref_a.to_string(), ref_b.to_string());
        self.with_manager(move |git| Ok(git.merge_base_of(&a, &b).ok()))
            .await
            .ok()
            .flatten()
    }

    async fn diff(
        &self,
        base: Option<&str>,
        branch_a: &str,
        branch_b: &str,
    ) -> Result<ConflictReport, GitError> {
        let base = base.map(str::to_string);
        let (a, b) = (branch_a.to_string(), branch_b.to_string());
        self.with_manager(move |git| {
            let check = git
                .check_merge_conflicts(base.as_deref(), &a, &b)
                .map_err(|e| GitError::Diff(e.message().to_string()))?;
            let payload = check.describe();
            Ok(ConflictReport::conflicted(
                check.merge_base,
                check.conflicting_files,
                payload,
            ))
        })
        .await
    }

    async fn commit(&self, message: &str) -> Result<Option<String>, GitError> {
        let message = message.to_string();
        let (name, email) = (self.author_name.clone(), self.author_email.clone());
        let excluded = self.excluded_paths.clone();
        self.with_manager(move |git| {
            git.commit_all(&message, &name, &email, &excluded)
                .map(|commit| commit.map(|c| c.id))
                .map_err(|e| GitError::Commit(e.message().to_string()))
        })
        .await
    }

    async fn has_recent_commits(&self, window: Duration) -> bool {
        let window_secs = window.as_secs() as i64;
        self.with_manager(move |git| Ok(git.has_recent_commits(window_secs).unwrap_or(false)))
            .await
            .unwrap_or(false)
    }
}
