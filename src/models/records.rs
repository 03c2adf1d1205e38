//! Records produced by a session
//!
//! Every record serializes to a flat JSON object: nested metrics and quality
//! summaries are flattened into the parent so that a sink can store them as
//! plain key/value rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::metrics::PerformanceMetrics;
use super::state_machine::SessionPhase;
use crate::error::ErrorKind;

/// Structural overview of the workspace, gathered for reporting only
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentReport {
    pub files_scanned: usize,
    /// First few source files found, for context in reports
    pub key_files: Vec<String>,
    /// Manifest the dependency set was read from
    pub manifest: Option<String>,
    pub dependencies: BTreeMap<String, String>,
    /// Commits landed on the workspace branch recently
    pub recent_changes: bool,
    /// Soft failures encountered while gathering data
    pub warnings: Vec<String>,
}

/// Immutable record of the workspace at the start of task preparation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    agent_id: String,
    branch: String,
    timestamp: DateTime<Utc>,
    base_revision: String,
    /// Key file path to sha256 hex digest; `None` when the file is absent
    file_checksums: BTreeMap<String, Option<String>>,
}

impl Snapshot {
    pub fn new(
        agent_id: &str,
        branch: &str,
        base_revision: &str,
        file_checksums: BTreeMap<String, Option<String>>,
    ) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            branch: branch.to_string(),
            timestamp: Utc::now(),
            base_revision: base_revision.to_string(),
            file_checksums,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn base_revision(&self) -> &str {
        &self.base_revision
    }

    pub fn file_checksums(&self) -> &BTreeMap<String, Option<String>> {
        &self.file_checksums
    }
}

/// Result of comparing the agent branch against the target branch.
///
/// Deliberately not `Clone`: a report is handed to the conflict resolver by
/// value and consumed there.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub has_conflicts: bool,
    pub merge_base: Option<String>,
    pub conflicting_files: Vec<String>,
    /// Backend-specific diff payload
    pub diff: String,
}

impl ConflictReport {
    /// A report with no conflicts
    pub fn clean(merge_base: Option<String>, diff: String) -> Self {
        Self {
            has_conflicts: false,
            merge_base,
            conflicting_files: Vec::new(),
            diff,
        }
    }

    /// A report listing conflicting paths
    pub fn conflicted(merge_base: Option<String>, files: Vec<String>, diff: String) -> Self {
        Self {
            has_conflicts: !files.is_empty(),
            merge_base,
            conflicting_files: files,
            diff,
        }
    }
}

/// Outcome of the quality checks, attached to the merge request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QualitySummary {
    pub analysis_passed: bool,
    pub findings: Vec<String>,
    pub tests_passed: u32,
    pub tests_failed: u32,
    pub format_applied: bool,
}

impl QualitySummary {
    pub fn all_passed(&self) -> bool {
        self.analysis_passed && self.tests_failed == 0
    }
}

/// Terminal output of a successful session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequestArtifact {
    pub agent_id: String,
    pub branch: String,
    pub target_branch: String,
    pub title: String,
    pub description: String,
    #[serde(flatten)]
    pub metrics: PerformanceMetrics,
    #[serde(flatten)]
    pub quality: QualitySummary,
    pub commit_id: Option<String>,
    pub ready_for_review: bool,
    pub created_at: DateTime<Utc>,
}

/// Terminal output of a failed session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub agent_id: String,
    pub kind: ErrorKind,
    pub message: String,
    /// Phase that was running when the failure happened
    pub phase: SessionPhase,
    #[serde(flatten)]
    pub metrics: PerformanceMetrics,
    pub timestamp: DateTime<Utc>,
}

/// Exactly one of these is produced per session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed(MergeRequestArtifact),
    Failed(FailureReport),
}

impl SessionOutcome {
    pub fn agent_id(&self) -> &str {
        match self {
            SessionOutcome::Completed(mr) => &mr.agent_id,
            SessionOutcome::Failed(report) => &report.agent_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, SessionOutcome::Completed(_))
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        match self {
            SessionOutcome::Completed(mr) => &mr.metrics,
            SessionOutcome::Failed(report) => &report.metrics,
        }
    }

    pub fn merge_request(&self) -> Option<&MergeRequestArtifact> {
        match self {
            SessionOutcome::Completed(mr) => Some(mr),
            SessionOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReport> {
        match self {
            SessionOutcome::Completed(_) => None,
            SessionOutcome::Failed(report) => Some(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_failure() -> FailureReport {
        let mut metrics = PerformanceMetrics::new();
        metrics.add_files_modified(4);
        FailureReport {
            agent_id: "agent-7".to_string(),
            kind: ErrorKind::CoreWork,
            message: "step 3 exited with status 2".to_string(),
            phase: SessionPhase::ExecutingCore,
            metrics,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_failure_report_is_flat() {
        let value = serde_json::to_value(sample_failure()).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object["agentId"], "agent-7");
        assert_eq!(object["kind"], "CoreWorkError");
        assert_eq!(object["phase"], "executing_core");
        assert_eq!(object["filesModified"], 4);
        assert!(object.values().all(|v| !v.is_object()));
    }

    #[test]
    fn test_merge_request_flattens_metrics_and_quality() {
        let mr = MergeRequestArtifact {
            agent_id: "agent-1".to_string(),
            branch: "feature/x".to_string(),
            target_branch: "develop".to_string(),
            title: "AI Agent agent-1: Add alerts".to_string(),
            description: "summary".to_string(),
            metrics: PerformanceMetrics::new(),
            quality: QualitySummary {
                analysis_passed: true,
                tests_passed: 10,
                ..Default::default()
            },
            commit_id: None,
            ready_for_review: true,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&mr).unwrap();
        assert_eq!(value["readyForReview"], true);
        assert_eq!(value["testsPassed"], 10);
        assert_eq!(value["commitsMade"], 0);
        assert_eq!(value["targetBranch"], "develop");

        let back: MergeRequestArtifact = serde_json::from_value(value).unwrap();
        assert_eq!(back, mr);
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = SessionOutcome::Failed(sample_failure());
        assert!(!outcome.is_completed());
        assert_eq!(outcome.agent_id(), "agent-7");
        assert!(outcome.merge_request().is_none());
        assert_eq!(outcome.failure().unwrap().kind, ErrorKind::CoreWork);
        assert_eq!(outcome.metrics().files_modified(), 4);

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["outcome"], "failed");
    }

    #[test]
    fn test_conflicted_report_without_files_is_clean() {
        let report = ConflictReport::conflicted(None, Vec::new(), String::new());
        assert!(!report.has_conflicts);

        let report = ConflictReport::conflicted(
            Some("abc".to_string()),
            vec!["lib/main.dart".to_string()],
            "lib/main.dart".to_string(),
        );
        assert!(report.has_conflicts);
    }

    #[test]
    fn test_snapshot_accessors() {
        let mut checksums = BTreeMap::new();
        checksums.insert("Cargo.toml".to_string(), Some("ab12".to_string()));
        checksums.insert("src/main.rs".to_string(), None);
        let snapshot = Snapshot::new("agent-1", "feature/x", "deadbeef", checksums);

        assert_eq!(snapshot.agent_id(), "agent-1");
        assert_eq!(snapshot.branch(), "feature/x");
        assert_eq!(snapshot.base_revision(), "deadbeef");
        assert_eq!(snapshot.file_checksums().len(), 2);
        assert_eq!(snapshot.file_checksums()["src/main.rs"], None);
    }
}
