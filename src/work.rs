//! Task-specific core work
//!
//! The session treats the work as opaque: it asks how many units there are,
//! runs them strictly in order and folds each unit's progress into its
//! metrics.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::time::Duration;
use walkdir::WalkDir;

use crate::error::WorkError;
use crate::utils::process::run_shell;

/// What one unit of work achieved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitProgress {
    pub files_modified: u64,
    pub tests_run: u64,
    pub description: String,
}

#[async_trait]
pub trait CoreWork: Send + Sync {
    /// Number of units the session will run
    fn total_units(&self) -> usize;

    /// Run unit `index` (0-based) inside `workspace`
    async fn perform_unit(&self, index: usize, workspace: &Path)
        -> Result<UnitProgress, WorkError>;
}

/// Work made of shell steps, one unit per step
#[derive(Debug, Clone)]
pub struct CommandWork {
    steps: Vec<String>,
    timeout: Duration,
    /// Directories never counted as modified
    ignored_dirs: Vec<String>,
}

impl CommandWork {
    pub fn new(steps: Vec<String>) -> Self {
        Self {
            steps,
            timeout: Duration::from_secs(3600),
            ignored_dirs: vec![".git".to_string()],
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Do not count changes under `dir` (relative to the workspace)
    pub fn with_ignored_dir(mut self, dir: &str) -> Self {
        self.ignored_dirs.push(dir.trim_end_matches('/').to_string());
        self
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    /// Scan the workspace on the blocking pool
    async fn scan(&self, unit: usize, workspace: &Path) -> Result<FileTimes, WorkError> {
        let root = workspace.to_path_buf();
        let ignored = self.ignored_dirs.clone();
        tokio::task::spawn_blocking(move || file_times(&root, &ignored))
            .await
            .map_err(|e| WorkError::Scan {
                unit,
                message: e.to_string(),
            })
    }
}

type FileTimes = HashMap<PathBuf, Option<SystemTime>>;

/// Modification times of every file under `root`
fn file_times(root: &Path, ignored_dirs: &[String]) -> FileTimes {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            !ignored_dirs.iter().any(|dir| relative.starts_with(dir))
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
            (entry.into_path(), modified)
        })
        .collect()
}

/// Files added, removed or rewritten between two scans
fn count_changes(before: &FileTimes, after: &FileTimes) -> u64 {
    let changed = after
        .iter()
        .filter(|(path, modified)| before.get(*path) != Some(*modified))
        .count();
    let removed = before.keys().filter(|path| !after.contains_key(*path)).count();
    (changed + removed) as u64
}

#[async_trait]
impl CoreWork for CommandWork {
    fn total_units(&self) -> usize {
        self.steps.len()
    }

    async fn perform_unit(
        &self,
        index: usize,
        workspace: &Path,
    ) -> Result<UnitProgress, WorkError> {
        let step = self.steps.get(index).ok_or(WorkError::OutOfRange {
            unit: index,
            total: self.steps.len(),
        })?;

        let before = self.scan(index, workspace).await?;
        let output = run_shell(step, workspace, None, self.timeout)
            .await
            .map_err(|e| WorkError::Spawn {
                unit: index,
                source: e,
            })?;

        if !output.success {
            let message = if output.timed_out {
                output.stderr
            } else {
                format!(
                    "`{}` exited with code {:?}: {}",
                    step,
                    output.exit_code,
                    output.stderr.trim()
                )
            };
            return Err(WorkError::UnitFailed {
                unit: index,
                message,
            });
        }

        let after = self.scan(index, workspace).await?;
        Ok(UnitProgress {
            files_modified: count_changes(&before, &after),
            tests_run: 0,
            description: step.clone(),
        })
    }
}
