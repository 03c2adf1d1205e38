// Utility functions

pub mod process;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

// =============================================================================
// Path Helpers
// =============================================================================

/// Name of the per-repository branchwork directory
pub const BRANCHWORK_DIR: &str = ".branchwork";

/// Get the .branchwork directory path for a repository.
#[inline]
pub fn branchwork_dir(repo_path: &Path) -> PathBuf {
    repo_path.join(BRANCHWORK_DIR)
}

/// Get the .branchwork/config.yaml path for a repository.
#[inline]
pub fn config_path(repo_path: &Path) -> PathBuf {
    branchwork_dir(repo_path).join("config.yaml")
}

/// Get the .branchwork/worktrees directory path for a repository.
#[inline]
pub fn worktrees_dir(repo_path: &Path) -> PathBuf {
    branchwork_dir(repo_path).join("worktrees")
}

/// Directory holding one agent's records, e.g. `.agent-workspace/<agent_id>`
#[inline]
pub fn agent_records_dir(workspace: &Path, records_dir: &str, agent_id: &str) -> PathBuf {
    workspace
        .join(records_dir)
        .join(sanitize_path_component(agent_id))
}

// =============================================================================
// Name Sanitizing
// =============================================================================

/// Sanitize a string for use in a branch name
pub fn sanitize_branch_name(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '/' {
                c
            } else {
                '-'
            }
        })
        .collect::<String>()
        .trim_matches(|c| c == '/' || c == '-')
        .to_lowercase()
}

/// Sanitize a string for use as a path component
pub fn sanitize_path_component(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Safely acquire a mutex lock, recovering from poisoning by returning the guard.
/// This is useful when you want to continue even if a previous thread panicked.
/// The mutex state may be inconsistent, so use with caution.
pub fn lock_mutex_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Mutex was poisoned, recovering: {}", poisoned);
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_config_path() {
        let path = config_path(Path::new("/repo"));
        assert_eq!(path, PathBuf::from("/repo/.branchwork/config.yaml"));
    }

    #[test]
    fn test_worktrees_dir() {
        let path = worktrees_dir(Path::new("/repo"));
        assert_eq!(path, PathBuf::from("/repo/.branchwork/worktrees"));
    }

    #[test]
    fn test_agent_records_dir() {
        let path = agent_records_dir(Path::new("/repo"), ".agent-workspace", "agent/1");
        assert_eq!(path, PathBuf::from("/repo/.agent-workspace/agent_1"));
    }

    #[test]
    fn test_sanitize_branch_name() {
        assert_eq!(sanitize_branch_name("US-1.1"), "us-1-1");
        assert_eq!(sanitize_branch_name("feature/My Story"), "feature/my-story");
        assert_eq!(sanitize_branch_name("/leading/"), "leading");
    }

    #[test]
    fn test_sanitize_path_component() {
        assert_eq!(sanitize_path_component("US-1.1"), "US-1_1");
        assert_eq!(sanitize_path_component("my/path"), "my_path");
    }

    #[test]
    fn test_lock_mutex_recover_after_poison() {
        let mutex = Arc::new(Mutex::new(1));
        let poisoner = Arc::clone(&mutex);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(mutex.is_poisoned());
        let guard = lock_mutex_recover(&mutex);
        assert_eq!(*guard, 1);
    }
}
