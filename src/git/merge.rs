//! Merge-base and conflict detection for GitManager
//!
//! Conflicts are detected with an in-memory three-way merge of trees, so the
//! working directory is never touched.

use git2::{Error as GitError, MergeOptions, Oid, Tree};

use crate::git::types::MergeCheck;
use crate::git::GitManager;

impl GitManager {
    /// Find the merge base of two revisions
    pub fn merge_base_of(&self, rev_a: &str, rev_b: &str) -> Result<String, GitError> {
        let a = self.resolve_commit(rev_a)?;
        let b = self.resolve_commit(rev_b)?;
        let base = self.repo.merge_base(a.id(), b.id())?;
        Ok(base.to_string())
    }

    fn empty_tree(&self) -> Result<Tree<'_>, GitError> {
        let oid = self.repo.treebuilder(None)?.write()?;
        self.repo.find_tree(oid)
    }

    /// Dry-run a three-way merge of `ours` and `theirs` on top of `base`.
    ///
    /// When `base` is `None` the merge base is computed; unrelated histories
    /// merge against the empty tree. A single unreadable ref is reported in
    /// `MergeCheck::unreadable` instead of failing; only when neither side can
    /// be read is an error returned.
    pub fn check_merge_conflicts(
        &self,
        base: Option<&str>,
        ours: &str,
        theirs: &str,
    ) -> Result<MergeCheck, GitError> {
        let our_commit = self.resolve_commit(ours);
        let their_commit = self.resolve_commit(theirs);

        let (our_commit, their_commit) = match (our_commit, their_commit) {
            (Ok(o), Ok(t)) => (o, t),
            (Err(our_err), Err(their_err)) => {
                return Err(GitError::from_str(&format!(
                    "Neither '{}' ({}) nor '{}' ({}) can be read",
                    ours, our_err, theirs, their_err
                )));
            }
            (Err(e), Ok(_)) => {
                log::warn!("[GitManager] Cannot read '{}': {}", ours, e);
                return Ok(MergeCheck {
                    unreadable: vec![ours.to_string()],
                    ..Default::default()
                });
            }
            (Ok(_), Err(e)) => {
                log::warn!("[GitManager] Cannot read '{}': {}", theirs, e);
                return Ok(MergeCheck {
                    unreadable: vec![theirs.to_string()],
                    ..Default::default()
                });
            }
        };

        let base_oid: Option<Oid> = match base {
            Some(rev) => match self.resolve_commit(rev) {
                Ok(commit) => Some(commit.id()),
                Err(e) => {
                    log::warn!("[GitManager] Cannot read base '{}': {}, recomputing", rev, e);
                    self.repo.merge_base(our_commit.id(), their_commit.id()).ok()
                }
            },
            None => self.repo.merge_base(our_commit.id(), their_commit.id()).ok(),
        };

        let base_tree = match base_oid {
            Some(oid) => self.repo.find_commit(oid)?.tree()?,
            None => {
                log::warn!(
                    "[GitManager] No merge base between {} and {}, using empty tree",
                    ours,
                    theirs
                );
                self.empty_tree()?
            }
        };

        let our_tree = our_commit.tree()?;
        let their_tree = their_commit.tree()?;

        let mut merge_opts = MergeOptions::new();
        let index =
            self.repo
                .merge_trees(&base_tree, &our_tree, &their_tree, Some(&mut merge_opts))?;

        let mut conflicting_files = Vec::new();
        if index.has_conflicts() {
            for conflict in index.conflicts()? {
                let conflict = conflict?;
                if let Some(entry) = conflict.our.or(conflict.their).or(conflict.ancestor) {
                    conflicting_files.push(String::from_utf8_lossy(&entry.path).to_string());
                }
            }
        }

        let diff = self
            .repo
            .diff_tree_to_tree(Some(&base_tree), Some(&their_tree), None)?;
        let stats = diff.stats()?;

        if !conflicting_files.is_empty() {
            log::warn!(
                "[GitManager] Merge of {} into {} would conflict: {:?}",
                theirs,
                ours,
                conflicting_files
            );
        }

        Ok(MergeCheck {
            merge_base: base_oid.map(|oid| oid.to_string()),
            conflicting_files,
            files_changed: stats.files_changed(),
            insertions: stats.insertions(),
            deletions: stats.deletions(),
            unreadable: Vec::new(),
        })
    }
}
