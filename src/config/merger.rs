// Configuration merging with priority

use serde::{Deserialize, Serialize};

use crate::config::BranchworkConfig;

/// Partial configuration for merging
/// Uses Option<T> for all fields to support partial overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PartialConfig {
    #[serde(default)]
    pub orchestrator: Option<PartialOrchestratorConfig>,
    #[serde(default)]
    pub quality: Option<PartialQualityConfig>,
    #[serde(default)]
    pub resolver: Option<PartialResolverConfig>,
    #[serde(default)]
    pub workspace: Option<PartialWorkspaceConfig>,
    #[serde(default)]
    pub git: Option<PartialGitConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PartialOrchestratorConfig {
    pub max_concurrency: Option<usize>,
    pub target_branch: Option<String>,
    pub remote: Option<String>,
    pub phase_timeout_secs: Option<u64>,
    pub isolate_worktrees: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PartialQualityConfig {
    pub analyze_command: Option<String>,
    pub test_command: Option<String>,
    pub format_command: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PartialResolverConfig {
    pub command: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PartialWorkspaceConfig {
    pub source_dirs: Option<Vec<String>>,
    pub source_extensions: Option<Vec<String>>,
    pub manifest_files: Option<Vec<String>>,
    pub key_files: Option<Vec<String>>,
    pub records_dir: Option<String>,
    pub max_key_files: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PartialGitConfig {
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub create_missing_branches: Option<bool>,
}

/// Overwrite `target` with `value` when it is set
fn apply<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

impl PartialConfig {
    /// Apply every value set here on top of `config`
    pub fn merge_into(self, config: &mut BranchworkConfig) {
        if let Some(orchestrator) = self.orchestrator {
            let target = &mut config.orchestrator;
            apply(&mut target.max_concurrency, orchestrator.max_concurrency);
            apply(&mut target.target_branch, orchestrator.target_branch);
            apply(&mut target.remote, orchestrator.remote);
            if orchestrator.phase_timeout_secs.is_some() {
                target.phase_timeout_secs = orchestrator.phase_timeout_secs;
            }
            apply(&mut target.isolate_worktrees, orchestrator.isolate_worktrees);
        }

        if let Some(quality) = self.quality {
            let target = &mut config.quality;
            if quality.analyze_command.is_some() {
                target.analyze_command = quality.analyze_command;
            }
            if quality.test_command.is_some() {
                target.test_command = quality.test_command;
            }
            if quality.format_command.is_some() {
                target.format_command = quality.format_command;
            }
            apply(&mut target.timeout_secs, quality.timeout_secs);
        }

        if let Some(resolver) = self.resolver {
            if resolver.command.is_some() {
                config.resolver.command = resolver.command;
            }
            apply(&mut config.resolver.timeout_secs, resolver.timeout_secs);
        }

        if let Some(workspace) = self.workspace {
            let target = &mut config.workspace;
            apply(&mut target.source_dirs, workspace.source_dirs);
            apply(&mut target.source_extensions, workspace.source_extensions);
            apply(&mut target.manifest_files, workspace.manifest_files);
            apply(&mut target.key_files, workspace.key_files);
            apply(&mut target.records_dir, workspace.records_dir);
            apply(&mut target.max_key_files, workspace.max_key_files);
        }

        if let Some(git) = self.git {
            let target = &mut config.git;
            apply(&mut target.author_name, git.author_name);
            apply(&mut target.author_email, git.author_email);
            apply(&mut target.create_missing_branches, git.create_missing_branches);
        }
    }
}
