//! Branch operations for GitManager
//!
//! Contains methods for inspecting, creating and checking out branches

use git2::{BranchType, Error as GitError, ErrorCode, Signature};

use crate::git::GitManager;

impl GitManager {
    /// Name of the branch HEAD points at. Fails on a detached HEAD.
    pub fn current_branch_name(&self) -> Result<String, GitError> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                // HEAD names a branch that has no commits yet
                let head_ref = self.repo.find_reference("HEAD")?;
                return head_ref
                    .symbolic_target()
                    .and_then(|target| target.strip_prefix("refs/heads/"))
                    .map(str::to_string)
                    .ok_or_else(|| GitError::from_str("HEAD is not a branch"));
            }
            Err(e) => return Err(e),
        };

        if !head.is_branch() {
            return Err(GitError::from_str("HEAD is not a branch"));
        }

        head.shorthand()
            .map(str::to_string)
            .ok_or_else(|| GitError::from_str("Branch name is not valid UTF-8"))
    }

    /// Check whether a local branch exists
    pub fn branch_exists(&self, name: &str) -> bool {
        self.repo.find_branch(name, BranchType::Local).is_ok()
    }

    /// Create a new branch from the current HEAD
    pub fn create_branch(&self, name: &str) -> Result<(), GitError> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                log::info!("[GitManager] No commits found, creating initial commit");
                self.create_initial_commit()?;
                self.repo.head()?
            }
            Err(e) => return Err(e),
        };

        let head_commit = head.peel_to_commit()?;
        self.repo.branch(name, &head_commit, false)?;
        log::debug!("[GitManager] Created branch {}", name);
        Ok(())
    }

    /// Create an initial empty commit for a new repository
    pub(crate) fn create_initial_commit(&self) -> Result<(), GitError> {
        let tree_id = self.repo.index()?.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let signature = self
            .repo
            .signature()
            .or_else(|_| Signature::now("Branchwork", "branchwork@localhost"))?;

        self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            "Initial commit (created by branchwork)",
            &tree,
            &[],
        )?;

        log::info!("[GitManager] Created initial commit");
        Ok(())
    }

    /// Checkout a branch, optionally creating it from HEAD first
    pub fn checkout_branch(&self, name: &str, create_if_missing: bool) -> Result<(), GitError> {
        if !self.branch_exists(name) {
            if !create_if_missing {
                return Err(GitError::from_str(&format!("Branch '{}' not found", name)));
            }
            self.create_branch(name)?;
        }

        let obj = self.repo.revparse_single(&format!("refs/heads/{}", name))?;

        self.repo.checkout_tree(&obj, None)?;
        self.repo.set_head(&format!("refs/heads/{}", name))?;

        log::info!("[GitManager] Checked out branch {}", name);
        Ok(())
    }
}
