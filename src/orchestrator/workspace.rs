//! Working directories handed to sessions
//!
//! A session runs in whatever [`Workspace`] its provider returns. The shared
//! provider hands every session the same directory; the worktree provider
//! gives each session its own git worktree on the session's branch.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::BranchworkConfig;
use crate::error::GitError;
use crate::git::{GitGateway, GitManager};
use crate::models::Agent;
use crate::quality::CommandQualityRunner;
use crate::resolver::resolver_from_config;
use crate::session::Workspace;
use crate::storage::{FileRecordSink, RecordSink};
use crate::utils::{sanitize_path_component, worktrees_dir};

#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    /// Sink for records written before a workspace exists
    fn record_sink(&self) -> Arc<dyn RecordSink>;

    /// Working directory for `agent`, called once its slot is granted
    async fn acquire(&self, agent: &Agent) -> Result<Workspace, GitError>;

    /// Called after the session reached a terminal phase
    async fn release(&self, _agent: &Agent) {}
}

/// Every session works in the same directory
pub struct SharedWorkspace {
    workspace: Workspace,
}

impl SharedWorkspace {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl WorkspaceProvider for SharedWorkspace {
    fn record_sink(&self) -> Arc<dyn RecordSink> {
        Arc::clone(&self.workspace.sink)
    }

    async fn acquire(&self, _agent: &Agent) -> Result<Workspace, GitError> {
        Ok(self.workspace.clone())
    }
}

/// Git-backed workspace rooted at `root`, with records kept under
/// `records_root`
pub fn git_workspace(root: &Path, records_root: &Path, config: &BranchworkConfig) -> Workspace {
    let gateway = GitGateway::new(root)
        .with_remote(&config.orchestrator.remote)
        .with_author(&config.git.author_name, &config.git.author_email)
        .with_create_missing_branches(config.git.create_missing_branches)
        .with_excluded_path(&config.workspace.records_dir);

    Workspace {
        root: root.to_path_buf(),
        gateway: Arc::new(gateway),
        quality: Arc::new(CommandQualityRunner::new(root, &config.quality)),
        resolver: Arc::from(resolver_from_config(&config.resolver, root)),
        sink: Arc::new(FileRecordSink::new(records_root, &config.workspace.records_dir)),
    }
}

/// One git worktree per session under `<repo>/.branchwork/worktrees/`
pub struct WorktreeProvider {
    repo_path: PathBuf,
    config: BranchworkConfig,
}

impl WorktreeProvider {
    pub fn new(repo_path: &Path, config: BranchworkConfig) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
            config,
        }
    }

    /// Worktree location for an agent
    pub fn worktree_path(&self, agent_id: &str) -> PathBuf {
        worktrees_dir(&self.repo_path).join(sanitize_path_component(agent_id))
    }
}

#[async_trait]
impl WorkspaceProvider for WorktreeProvider {
    fn record_sink(&self) -> Arc<dyn RecordSink> {
        Arc::new(FileRecordSink::new(
            &self.repo_path,
            &self.config.workspace.records_dir,
        ))
    }

    async fn acquire(&self, agent: &Agent) -> Result<Workspace, GitError> {
        let repo_path = self.repo_path.clone();
        let worktree_path = self.worktree_path(&agent.agent_id);
        let branch = agent.branch_name.clone();

        let path = worktree_path.clone();
        tokio::task::spawn_blocking(move || create_worktree(&repo_path, &branch, &path))
            .await
            .map_err(|e| GitError::Worktree(format!("worktree task failed: {}", e)))??;

        log::info!(
            "[WorktreeProvider] {} working in {:?}",
            agent.agent_id,
            worktree_path
        );
        Ok(git_workspace(&worktree_path, &self.repo_path, &self.config))
    }

    async fn release(&self, agent: &Agent) {
        let repo_path = self.repo_path.clone();
        let path = self.worktree_path(&agent.agent_id);

        let removed = tokio::task::spawn_blocking(move || {
            let git = GitManager::new(&repo_path)?;
            git.remove_worktree(&path)
        })
        .await;

        match removed {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!(
                "[WorktreeProvider] Failed to remove worktree for {}: {}",
                agent.agent_id,
                e
            ),
            Err(e) => log::warn!("[WorktreeProvider] Worktree cleanup task failed: {}", e),
        }
    }
}

fn create_worktree(repo_path: &Path, branch: &str, path: &Path) -> Result<(), GitError> {
    let worktree_error = |e: &dyn std::fmt::Display| GitError::Worktree(e.to_string());

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| worktree_error(&e))?;
    }

    let git = GitManager::new(repo_path).map_err(|e| worktree_error(&e))?;

    if let Err(e) = git.prune_orphaned_worktrees() {
        log::warn!("[WorktreeProvider] Failed to prune orphaned worktrees: {}", e);
    }

    // Leftover directory from an interrupted run
    if path.exists() && !path.join(".git").exists() {
        log::warn!("[WorktreeProvider] Removing stale directory {:?}", path);
        std::fs::remove_dir_all(path).map_err(|e| worktree_error(&e))?;
    }

    git.create_worktree(branch, path)
        .map_err(|e| worktree_error(&e))?;
    Ok(())
}
