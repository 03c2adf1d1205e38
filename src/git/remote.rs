//! Remote operations for GitManager

use git2::{Error as GitError, ErrorCode};

use crate::git::types::FetchOutcome;
use crate::git::GitManager;

impl GitManager {
    /// Fetch `branch` from `remote_name` into its remote-tracking ref.
    ///
    /// Repositories without that remote fall back to the local branch, which
    /// keeps purely local setups (and tests) working.
    pub fn fetch_branch(&self, remote_name: &str, branch: &str) -> Result<FetchOutcome, GitError> {
        let mut remote = match self.repo.find_remote(remote_name) {
            Ok(remote) => remote,
            Err(e) if e.code() == ErrorCode::NotFound || e.code() == ErrorCode::InvalidSpec => {
                log::info!(
                    "[GitManager] No remote '{}', using local branch {}",
                    remote_name,
                    branch
                );
                self.resolve_commit(&format!("refs/heads/{}", branch))?;
                return Ok(FetchOutcome::LocalOnly {
                    local_ref: format!("refs/heads/{}", branch),
                });
            }
            Err(e) => return Err(e),
        };

        let remote_ref = format!("refs/remotes/{}/{}", remote_name, branch);
        let refspec = format!("+refs/heads/{}:{}", branch, remote_ref);

        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.credentials(|_url, username_from_url, _allowed_types| {
            git2::Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"))
        });

        let mut fetch_options = git2::FetchOptions::new();
        fetch_options.remote_callbacks(callbacks);

        remote.fetch(&[&refspec], Some(&mut fetch_options), None)?;

        // A refspec whose source does not exist fetches nothing without error
        if self.repo.find_reference(&remote_ref).is_err() {
            return Err(GitError::from_str(&format!(
                "Branch '{}' not found on remote '{}'",
                branch, remote_name
            )));
        }

        log::info!("[GitManager] Fetched {} from {}", branch, remote_name);
        Ok(FetchOutcome::Fetched { remote_ref })
    }
}
