//! Persistence of session records
//!
//! Each agent gets a record directory (`.agent-workspace/<agent_id>/` by
//! default) holding `snapshot.json`, `failure-report.json` and
//! `merge-request.json`. Files are written to a temp file first and then
//! renamed into place, so readers never observe a half-written record.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StorageError;
use crate::models::{FailureReport, MergeRequestArtifact, Snapshot};
use crate::utils::{agent_records_dir, lock_mutex_recover};

pub const SNAPSHOT_FILE: &str = "snapshot.json";
pub const FAILURE_REPORT_FILE: &str = "failure-report.json";
pub const MERGE_REQUEST_FILE: &str = "merge-request.json";

#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Make sure the agent's record location exists
    async fn prepare(&self, _agent_id: &str) -> Result<(), StorageError> {
        Ok(())
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StorageError>;

    async fn save_failure(&self, report: &FailureReport) -> Result<(), StorageError>;

    async fn save_merge_request(&self, artifact: &MergeRequestArtifact) -> Result<(), StorageError>;
}

/// Writes pretty-printed JSON records under a workspace
#[derive(Debug, Clone)]
pub struct FileRecordSink {
    workspace: PathBuf,
    records_dir: String,
}

impl FileRecordSink {
    pub fn new(workspace: &Path, records_dir: &str) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            records_dir: records_dir.to_string(),
        }
    }

    /// Directory holding one agent's records
    pub fn agent_dir(&self, agent_id: &str) -> PathBuf {
        agent_records_dir(&self.workspace, &self.records_dir, agent_id)
    }

    async fn write_record<T: Serialize + Sync>(
        &self,
        agent_id: &str,
        file_name: &str,
        record: &T,
    ) -> Result<PathBuf, StorageError> {
        let dir = self.agent_dir(agent_id);
        let io_error = |path: &Path, source: std::io::Error| StorageError::Io {
            path: path.display().to_string(),
            source,
        };

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;

        let path = dir.join(file_name);
        let json_content = serde_json::to_string_pretty(record)?;

        // Write to temp, then rename
        let temp_file = path.with_extension("json.tmp");
        tokio::fs::write(&temp_file, json_content)
            .await
            .map_err(|e| io_error(&temp_file, e))?;
        tokio::fs::rename(&temp_file, &path)
            .await
            .map_err(|e| io_error(&path, e))?;

        log::debug!("[RecordSink] Wrote {:?}", path);
        Ok(path)
    }
}

#[async_trait]
impl RecordSink for FileRecordSink {
    async fn prepare(&self, agent_id: &str) -> Result<(), StorageError> {
        let dir = self.agent_dir(agent_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::Io {
                path: dir.display().to_string(),
                source: e,
            })
    }

    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let path = self
            .write_record(snapshot.agent_id(), SNAPSHOT_FILE, snapshot)
            .await?;
        log::info!("[RecordSink] Snapshot saved: {:?}", path);
        Ok(())
    }

    async fn save_failure(&self, report: &FailureReport) -> Result<(), StorageError> {
        let path = self
            .write_record(&report.agent_id, FAILURE_REPORT_FILE, report)
            .await?;
        log::info!("[RecordSink] Failure report saved: {:?}", path);
        Ok(())
    }

    async fn save_merge_request(
        &self,
        artifact: &MergeRequestArtifact,
    ) -> Result<(), StorageError> {
        let path = self
            .write_record(&artifact.agent_id, MERGE_REQUEST_FILE, artifact)
            .await?;
        log::info!("[RecordSink] Merge request prepared: {:?}", path);
        Ok(())
    }
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemoryRecordSink {
    snapshots: Mutex<Vec<Snapshot>>,
    failures: Mutex<Vec<FailureReport>>,
    merge_requests: Mutex<Vec<MergeRequestArtifact>>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        lock_mutex_recover(&self.snapshots).clone()
    }

    pub fn failures(&self) -> Vec<FailureReport> {
        lock_mutex_recover(&self.failures).clone()
    }

    pub fn merge_requests(&self) -> Vec<MergeRequestArtifact> {
        lock_mutex_recover(&self.merge_requests).clone()
    }
}

#[async_trait]
impl RecordSink for MemoryRecordSink {
    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        lock_mutex_recover(&self.snapshots).push(snapshot.clone());
        Ok(())
    }

    async fn save_failure(&self, report: &FailureReport) -> Result<(), StorageError> {
        lock_mutex_recover(&self.failures).push(report.clone());
        Ok(())
    }

    async fn save_merge_request(
        &self,
        artifact: &MergeRequestArtifact,
    ) -> Result<(), StorageError> {
        lock_mutex_recover(&self.merge_requests).push(artifact.clone());
        Ok(())
    }
}
