//! Quality checks run after the core work
//!
//! None of the checks can fail a session: their outcome only feeds the
//! merge request's `QualitySummary`.

mod command;
mod parse;

pub use command::CommandQualityRunner;
pub use parse::{parse_findings, parse_test_counts, MAX_FINDINGS};

use async_trait::async_trait;

/// Result of static analysis
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub passed: bool,
    pub findings: Vec<String>,
}

impl Diagnostics {
    /// Analysis that was not run
    pub fn skipped() -> Self {
        Self {
            passed: true,
            findings: Vec::new(),
        }
    }
}

/// Result of the test suite
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestRunResult {
    pub passed: u32,
    pub failed: u32,
}

impl TestRunResult {
    pub fn total(&self) -> u32 {
        self.passed + self.failed
    }
}

#[async_trait]
pub trait QualityRunner: Send + Sync {
    /// Run static analysis
    async fn analyze(&self) -> Diagnostics;

    /// Run the test suite
    async fn test(&self) -> TestRunResult;

    /// Apply the formatter; returns whether it ran successfully
    async fn format(&self) -> bool;
}

/// Runner that skips every check
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipQualityRunner;

#[async_trait]
impl QualityRunner for SkipQualityRunner {
    async fn analyze(&self) -> Diagnostics {
        Diagnostics::skipped()
    }

    async fn test(&self) -> TestRunResult {
        TestRunResult::default()
    }

    async fn format(&self) -> bool {
        false
    }
}
