//! Conflict resolution backends
//!
//! A session hands its `ConflictReport` to the resolver exactly once. There is
//! no retry loop: whatever the resolver returns is final for that session.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::time::Duration;

use crate::config::ResolverConfig;
use crate::models::ConflictReport;
use crate::utils::process::{program_available, run_shell};

/// Outcome of one resolution attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved,
    Unresolved { reason: String },
}

impl Resolution {
    pub fn unresolved(reason: impl Into<String>) -> Self {
        Resolution::Unresolved {
            reason: reason.into(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved)
    }
}

#[async_trait]
pub trait ConflictResolver: Send + Sync {
    /// Attempt to resolve the conflicts described by `report`
    async fn resolve(&self, report: ConflictReport) -> Resolution;
}

/// Resolver that never resolves anything
#[derive(Debug, Clone, Copy, Default)]
pub struct UnresolvedResolver;

#[async_trait]
impl ConflictResolver for UnresolvedResolver {
    async fn resolve(&self, report: ConflictReport) -> Resolution {
        log::info!(
            "[ConflictResolver] No resolver configured, leaving {} conflict(s) unresolved",
            report.conflicting_files.len()
        );
        Resolution::unresolved("no conflict resolver configured")
    }
}

/// Runs an external script as `<command> <workspace>` with the report as JSON
/// on stdin. A zero exit status means the conflicts were resolved.
#[derive(Debug, Clone)]
pub struct CommandConflictResolver {
    command: String,
    workspace: PathBuf,
    timeout: Duration,
}

impl CommandConflictResolver {
    pub fn new(command: &str, workspace: &Path, timeout: Duration) -> Self {
        Self {
            command: command.to_string(),
            workspace: workspace.to_path_buf(),
            timeout,
        }
    }

    fn command_line(&self) -> String {
        let workspace = self.workspace.to_string_lossy();
        if cfg!(windows) {
            format!("{} \"{}\"", self.command, workspace)
        } else {
            format!("{} '{}'", self.command, workspace.replace('\'', r"'\''"))
        }
    }
}

#[async_trait]
impl ConflictResolver for CommandConflictResolver {
    async fn resolve(&self, report: ConflictReport) -> Resolution {
        if !program_available(&self.command, &self.workspace) {
            return Resolution::unresolved(format!("resolver `{}` not found", self.command));
        }

        let payload = match serde_json::to_string(&report) {
            Ok(payload) => payload,
            Err(e) => return Resolution::unresolved(format!("failed to encode report: {}", e)),
        };

        log::info!(
            "[ConflictResolver] Resolving {} conflict(s) with `{}`",
            report.conflicting_files.len(),
            self.command
        );

        let command_line = self.command_line();
        let output = match run_shell(&command_line, &self.workspace, Some(&payload), self.timeout)
            .await
        {
            Ok(output) => output,
            Err(e) => return Resolution::unresolved(format!("failed to spawn resolver: {}", e)),
        };

        if output.timed_out {
            return Resolution::unresolved(format!(
                "Timeout after {} seconds",
                self.timeout.as_secs()
            ));
        }

        if output.success {
            log::info!("[ConflictResolver] Conflicts resolved automatically");
            Resolution::Resolved
        } else {
            let stderr = output.stderr.trim();
            log::warn!(
                "[ConflictResolver] Automatic conflict resolution failed with exit code {:?}: {}",
                output.exit_code,
                stderr
            );
            Resolution::unresolved(format!(
                "resolver exited with code {:?}: {}",
                output.exit_code, stderr
            ))
        }
    }
}

/// Build the resolver described by `config` for `workspace`
pub fn resolver_from_config(
    config: &ResolverConfig,
    workspace: &Path,
) -> Box<dyn ConflictResolver> {
    match &config.command {
        Some(command) if !command.trim().is_empty() => Box::new(CommandConflictResolver::new(
            command,
            workspace,
            Duration::from_secs(config.timeout_secs),
        )),
        _ => Box::new(UnresolvedResolver),
    }
}
