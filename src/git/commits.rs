//! Commit operations for GitManager
//!
//! Contains methods for inspecting pending changes, staging and committing

use git2::{Error as GitError, IndexAddOption, Signature, Status, StatusOptions};
use std::path::Path;

use crate::git::types::CommitInfo;
use crate::git::GitManager;

fn is_excluded(path: &str, excluded: &[String]) -> bool {
    excluded.iter().any(|prefix| {
        let prefix = prefix.trim_end_matches('/');
        path == prefix || path.starts_with(&format!("{}/", prefix))
    })
}

impl GitManager {
    /// Paths with uncommitted changes, ignoring anything under `excluded`
    pub fn pending_changes(&self, excluded: &[String]) -> Result<Vec<String>, GitError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true);
        opts.recurse_untracked_dirs(true);
        opts.include_ignored(false);

        let statuses = self.repo.statuses(Some(&mut opts))?;

        let mut result = Vec::new();
        for entry in statuses.iter() {
            if entry.status() == Status::CURRENT || entry.status().contains(Status::IGNORED) {
                continue;
            }
            if let Some(path) = entry.path() {
                if !is_excluded(path, excluded) {
                    result.push(path.to_string());
                }
            }
        }

        Ok(result)
    }

    /// Stage every change (including deletions) except excluded paths
    pub fn stage_all(&self, excluded: &[String]) -> Result<(), GitError> {
        let mut index = self.repo.index()?;

        let mut skip_excluded = |path: &Path, _spec: &[u8]| -> i32 {
            if is_excluded(&path.to_string_lossy(), excluded) {
                1
            } else {
                0
            }
        };
        index.add_all(
            ["*"].iter(),
            IndexAddOption::DEFAULT,
            Some(&mut skip_excluded as &mut git2::IndexMatchedPath),
        )?;

        let mut skip_excluded_updates = |path: &Path, _spec: &[u8]| -> i32 {
            if is_excluded(&path.to_string_lossy(), excluded) {
                1
            } else {
                0
            }
        };
        index.update_all(
            ["*"].iter(),
            Some(&mut skip_excluded_updates as &mut git2::IndexMatchedPath),
        )?;

        index.write()?;
        Ok(())
    }

    /// Stage everything and commit.
    ///
    /// Returns `Ok(None)` when there is nothing to commit.
    pub fn commit_all(
        &self,
        message: &str,
        author_name: &str,
        author_email: &str,
        excluded: &[String],
    ) -> Result<Option<CommitInfo>, GitError> {
        if self.pending_changes(excluded)?.is_empty() {
            log::info!("[GitManager] No changes to commit");
            return Ok(None);
        }

        self.stage_all(excluded)?;

        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());

        // Staging can still leave the tree unchanged (e.g. only mode noise)
        if let Some(parent) = &parent {
            if parent.tree_id() == tree_id {
                log::info!("[GitManager] Staged tree matches HEAD, nothing to commit");
                return Ok(None);
            }
        }

        let signature = Signature::now(author_name, author_email)?;
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        let oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;

        let commit = self.repo.find_commit(oid)?;
        log::info!("[GitManager] Created commit {}", oid);
        Ok(Some(self.commit_to_info(&commit)))
    }

    /// Whether HEAD's history contains a commit newer than `window_secs`
    pub fn has_recent_commits(&self, window_secs: i64) -> Result<bool, GitError> {
        let cutoff = chrono::Utc::now().timestamp() - window_secs;

        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;

        for oid in revwalk.take(50) {
            let commit = self.repo.find_commit(oid?)?;
            if commit.time().seconds() >= cutoff {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::is_excluded;

    #[test]
    fn test_is_excluded() {
        let excluded = vec![".agent-workspace".to_string()];
        assert!(is_excluded(".agent-workspace", &excluded));
        assert!(is_excluded(".agent-workspace/agent-1/snapshot.json", &excluded));
        assert!(!is_excluded(".agent-workspace-other/file", &excluded));
        assert!(!is_excluded("src/main.rs", &excluded));
    }
}
