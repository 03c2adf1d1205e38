//! Core GitManager implementation
//!
//! Contains the GitManager struct and its basic operations

use git2::{Commit, Error as GitError, Repository};
use std::path::{Path, PathBuf};

use crate::git::types::CommitInfo;

/// Git manager for repository operations
pub struct GitManager {
    pub(crate) repo: Repository,
}

impl GitManager {
    /// Create a new GitManager for the given repository path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let repo = Repository::open(path)?;
        Ok(Self { repo })
    }

    /// Get the repository path (the `.git` directory)
    pub fn repo_path(&self) -> PathBuf {
        self.repo.path().to_path_buf()
    }

    /// Get the working directory, `None` for bare repositories
    pub fn workdir(&self) -> Option<PathBuf> {
        self.repo.workdir().map(Path::to_path_buf)
    }

    /// Revision HEAD points at, `None` on an unborn branch
    pub fn head_revision(&self) -> Option<String> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
            .map(|commit| commit.id().to_string())
    }

    /// Resolve any revision expression (branch, ref, sha, `HEAD`) to a commit
    pub(crate) fn resolve_commit(&self, rev: &str) -> Result<Commit<'_>, GitError> {
        self.repo.revparse_single(rev)?.peel_to_commit()
    }

    /// Convert a Commit to CommitInfo
    pub(crate) fn commit_to_info(&self, commit: &Commit) -> CommitInfo {
        let id = commit.id().to_string();
        CommitInfo {
            short_id: id.chars().take(7).collect(),
            id,
            message: commit.message().unwrap_or("").to_string(),
            timestamp: commit.time().seconds(),
        }
    }
}
