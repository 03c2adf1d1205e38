//! Configuration for branchwork
//!
//! Reads `.branchwork/config.yaml` in the repository and `~/.branchwork/config.yaml`
//! globally. Both files may be partial; missing values fall back to the
//! defaults below. Priority order: CLI -> Project -> Global -> Defaults

mod merger;

pub use merger::{
    PartialConfig, PartialGitConfig, PartialOrchestratorConfig, PartialQualityConfig,
    PartialResolverConfig, PartialWorkspaceConfig,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::utils::{config_path, BRANCHWORK_DIR};

/// Admission and integration settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    /// Sessions running at once; further sessions queue
    pub max_concurrency: usize,
    pub target_branch: String,
    pub remote: String,
    /// Deadline applied to each phase; `None` disables it
    pub phase_timeout_secs: Option<u64>,
    /// Give each batch session its own git worktree
    pub isolate_worktrees: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            target_branch: "develop".to_string(),
            remote: "origin".to_string(),
            phase_timeout_secs: None,
            isolate_worktrees: true,
        }
    }
}

/// Commands run during quality assurance. Unset commands are skipped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QualityConfig {
    pub analyze_command: Option<String>,
    pub test_command: Option<String>,
    pub format_command: Option<String>,
    pub timeout_secs: u64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            analyze_command: None,
            test_command: None,
            format_command: None,
            timeout_secs: 600,
        }
    }
}

/// External conflict resolver
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolverConfig {
    /// Invoked as `<command> <workspace>` with the conflict report on stdin
    pub command: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: 120,
        }
    }
}

/// What the environment analysis and snapshot look at
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    pub source_dirs: Vec<String>,
    /// Extensions without the leading dot
    pub source_extensions: Vec<String>,
    /// Checked in order; the first one present supplies the dependency set
    pub manifest_files: Vec<String>,
    /// Files hashed into the snapshot
    pub key_files: Vec<String>,
    /// Per-agent record directory, relative to the workspace
    pub records_dir: String,
    pub max_key_files: usize,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            source_dirs: vec!["lib".to_string(), "src".to_string()],
            source_extensions: ["dart", "rs", "js", "ts", "py"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            manifest_files: vec![
                "pubspec.yaml".to_string(),
                "Cargo.toml".to_string(),
                "package.json".to_string(),
            ],
            key_files: vec!["pubspec.yaml".to_string(), "lib/main.dart".to_string()],
            records_dir: ".agent-workspace".to_string(),
            max_key_files: 10,
        }
    }
}

/// Commit identity and branch handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitConfig {
    pub author_name: String,
    pub author_email: String,
    pub create_missing_branches: bool,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            author_name: "Branchwork Agent".to_string(),
            author_email: "agent@branchwork.local".to_string(),
            create_missing_branches: true,
        }
    }
}

/// Fully resolved configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BranchworkConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub git: GitConfig,
}

/// Path of the global config file, if a home directory is known
pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(BRANCHWORK_DIR).join("config.yaml"))
}

/// Configuration file manager
pub struct ConfigManager {
    config_path: PathBuf,
    global_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create a config manager for a repository
    pub fn new(repo_path: &Path) -> Self {
        Self {
            config_path: config_path(repo_path),
            global_path: global_config_path(),
        }
    }

    /// Use an explicit project config file instead of `.branchwork/config.yaml`
    pub fn with_config_path(mut self, path: &Path) -> Self {
        self.config_path = path.to_path_buf();
        self
    }

    /// Override (or disable) the global config file
    pub fn with_global_path(mut self, path: Option<PathBuf>) -> Self {
        self.global_path = path;
        self
    }

    /// Check if the project config file exists
    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }

    /// Get the project config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    fn read_partial(path: &Path) -> Result<Option<PartialConfig>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;

        // An empty file parses as YAML null
        if content.trim().is_empty() {
            return Ok(Some(PartialConfig::default()));
        }

        serde_yaml::from_str(&content)
            .map(Some)
            .map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }

    /// Resolve the effective configuration: defaults, then the global file,
    /// then the project file, then `overrides`
    pub fn load(&self, overrides: Option<PartialConfig>) -> Result<BranchworkConfig, ConfigError> {
        let mut config = BranchworkConfig::default();

        if let Some(global_path) = &self.global_path {
            if let Some(global) = Self::read_partial(global_path)? {
                log::debug!("[ConfigManager] Applying global config {:?}", global_path);
                global.merge_into(&mut config);
            }
        }

        if let Some(project) = Self::read_partial(&self.config_path)? {
            log::debug!("[ConfigManager] Applying project config {:?}", self.config_path);
            project.merge_into(&mut config);
        }

        if let Some(overrides) = overrides {
            overrides.merge_into(&mut config);
        }

        Ok(config)
    }

    /// Write a full config to the project file
    pub fn write(&self, config: &BranchworkConfig) -> Result<(), ConfigError> {
        let write_error = |message: String| ConfigError::Write {
            path: self.config_path.display().to_string(),
            message,
        };

        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| write_error(format!("Failed to create config directory: {}", e)))?;
        }

        let content = serde_yaml::to_string(config)
            .map_err(|e| write_error(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&self.config_path, content).map_err(|e| write_error(e.to_string()))
    }

    /// Write the defaults if no project config exists yet
    pub fn initialize(&self) -> Result<BranchworkConfig, ConfigError> {
        if self.exists() {
            return self.load(None);
        }

        let config = BranchworkConfig::default();
        self.write(&config)?;
        log::info!("[ConfigManager] Created {:?}", self.config_path);
        Ok(config)
    }
}
