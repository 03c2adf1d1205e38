//! Quality runner backed by configured shell commands

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::time::Duration;

use super::parse::{parse_findings, parse_test_counts};
use super::{Diagnostics, QualityRunner, TestRunResult};
use crate::config::QualityConfig;
use crate::utils::process::{program_available, run_shell, CommandOutput};

/// Runs the analyze / test / format commands in a workspace
#[derive(Debug, Clone)]
pub struct CommandQualityRunner {
    workspace: PathBuf,
    analyze_command: Option<String>,
    test_command: Option<String>,
    format_command: Option<String>,
    timeout: Duration,
}

impl CommandQualityRunner {
    pub fn new(workspace: &Path, config: &QualityConfig) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            analyze_command: config.analyze_command.clone(),
            test_command: config.test_command.clone(),
            format_command: config.format_command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Run one configured command; `None` means it was skipped
    async fn run(&self, label: &str, command: Option<&str>) -> Option<CommandOutput> {
        let command = command?;

        if !program_available(command, &self.workspace) {
            log::info!(
                "[QualityRunner] Skipping {}: `{}` is not available",
                label,
                command
            );
            return None;
        }

        match run_shell(command, &self.workspace, None, self.timeout).await {
            Ok(output) => Some(output),
            Err(e) => {
                log::warn!("[QualityRunner] Failed to spawn {} `{}`: {}", label, command, e);
                None
            }
        }
    }
}

#[async_trait]
impl QualityRunner for CommandQualityRunner {
    async fn analyze(&self) -> Diagnostics {
        let Some(output) = self.run("analysis", self.analyze_command.as_deref()).await else {
            return Diagnostics::skipped();
        };

        let mut findings = parse_findings(&output.combined());
        if output.timed_out {
            findings.push(output.stderr.clone());
        }

        if output.success {
            log::info!("[QualityRunner] Static analysis passed");
        } else {
            log::warn!(
                "[QualityRunner] Static analysis reported {} finding(s)",
                findings.len()
            );
        }

        Diagnostics {
            passed: output.success,
            findings,
        }
    }

    async fn test(&self) -> TestRunResult {
        let Some(output) = self.run("tests", self.test_command.as_deref()).await else {
            return TestRunResult::default();
        };

        let result = match parse_test_counts(&output.combined()) {
            Some((passed, failed)) => TestRunResult { passed, failed },
            None if output.success => TestRunResult { passed: 1, failed: 0 },
            None => TestRunResult { passed: 0, failed: 1 },
        };

        if result.failed == 0 {
            log::info!("[QualityRunner] All {} test(s) passed", result.passed);
        } else {
            log::warn!(
                "[QualityRunner] {} test(s) failed, {} passed",
                result.failed,
                result.passed
            );
        }
        result
    }

    async fn format(&self) -> bool {
        let Some(output) = self.run("formatting", self.format_command.as_deref()).await else {
            return false;
        };

        if output.success {
            log::info!("[QualityRunner] Code formatting applied");
        } else {
            log::warn!("[QualityRunner] Code formatting issues: {}", output.stderr.trim());
        }
        output.success
    }
}
