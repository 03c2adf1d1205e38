//! Worktree management for GitManager
//!
//! Each concurrently running session gets its own worktree so that checkouts
//! on different branches never share a working directory.

use git2::{BranchType, Error as GitError, Repository, Worktree, WorktreeAddOptions};
use std::path::Path;

use crate::git::types::WorktreeInfo;
use crate::git::GitManager;

impl GitManager {
    /// Create a worktree at `path` checked out on `branch`, creating the
    /// branch from HEAD if needed
    pub fn create_worktree(&self, branch: &str, path: &Path) -> Result<WorktreeInfo, GitError> {
        if !self.branch_exists(branch) {
            self.create_branch(branch)?;
        }

        let branch_ref = self.repo.find_branch(branch, BranchType::Local)?;

        let mut opts = WorktreeAddOptions::new();
        opts.reference(Some(branch_ref.get()));

        // Branch names like "feature/x" would nest inside .git/worktrees/
        let worktree_name = branch.replace('/', "-");

        let worktree = self.repo.worktree(&worktree_name, path, Some(&opts))?;

        log::info!(
            "[GitManager] Created worktree {} at {:?} on branch {}",
            worktree_name,
            path,
            branch
        );
        Ok(self.worktree_to_info(&worktree))
    }

    /// Remove a worktree by path, then prune its administrative entry
    pub fn remove_worktree(&self, path: &Path) -> Result<(), GitError> {
        let worktrees = self.repo.worktrees()?;
        let wanted = path.to_string_lossy();
        let wanted = wanted.trim_end_matches('/');

        for name in worktrees.iter().flatten() {
            if let Ok(worktree) = self.repo.find_worktree(name) {
                let worktree_path = worktree.path().to_string_lossy().to_string();
                if worktree_path.trim_end_matches('/') == wanted {
                    if path.exists() {
                        std::fs::remove_dir_all(path).map_err(|e| {
                            GitError::from_str(&format!("Failed to remove {:?}: {}", path, e))
                        })?;
                    }
                    worktree.prune(None)?;
                    log::info!("[GitManager] Removed worktree {}", name);
                    return Ok(());
                }
            }
        }

        Err(GitError::from_str(&format!(
            "Worktree not found: {}",
            wanted
        )))
    }

    /// Prune orphaned worktrees (where the physical directory no longer exists)
    pub fn prune_orphaned_worktrees(&self) -> Result<u32, GitError> {
        let worktrees = self.repo.worktrees()?;
        let mut pruned_count = 0;

        for name in worktrees.iter().flatten() {
            if let Ok(worktree) = self.repo.find_worktree(name) {
                if !worktree.path().exists() {
                    log::info!(
                        "[GitManager] Pruning orphaned worktree '{}' (path {:?} no longer exists)",
                        name,
                        worktree.path()
                    );
                    if let Err(e) = worktree.prune(None) {
                        log::warn!("[GitManager] Failed to prune worktree '{}': {}", name, e);
                    } else {
                        pruned_count += 1;
                    }
                }
            }
        }

        Ok(pruned_count)
    }

    /// Convert a Worktree to WorktreeInfo
    pub(crate) fn worktree_to_info(&self, worktree: &Worktree) -> WorktreeInfo {
        let name = worktree.name().unwrap_or("").to_string();
        let path = worktree.path().to_string_lossy().to_string();
        let is_locked = worktree
            .is_locked()
            .map(|status| !matches!(status, git2::WorktreeLockStatus::Unlocked))
            .unwrap_or(false);

        let branch = Repository::open(worktree.path())
            .ok()
            .and_then(|repo| {
                let head = repo.head().ok()?;
                if head.is_branch() {
                    head.shorthand().map(str::to_string)
                } else {
                    None
                }
            });

        WorktreeInfo {
            name,
            path,
            branch,
            is_locked,
        }
    }
}
