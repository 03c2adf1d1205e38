//! Per-session performance counters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters owned by exactly one session.
///
/// Fields are private so that counters can only grow: every mutator adds
/// to a counter or raises it to a higher value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    start_time: DateTime<Utc>,
    files_analyzed: u64,
    files_modified: u64,
    tests_run: u64,
    commits_made: u64,
    conflicts_resolved: u64,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            files_analyzed: 0,
            files_modified: 0,
            tests_run: 0,
            commits_made: 0,
            conflicts_resolved: 0,
        }
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn files_analyzed(&self) -> u64 {
        self.files_analyzed
    }

    pub fn files_modified(&self) -> u64 {
        self.files_modified
    }

    pub fn tests_run(&self) -> u64 {
        self.tests_run
    }

    pub fn commits_made(&self) -> u64 {
        self.commits_made
    }

    pub fn conflicts_resolved(&self) -> u64 {
        self.conflicts_resolved
    }

    pub fn add_files_analyzed(&mut self, count: u64) {
        self.files_analyzed = self.files_analyzed.saturating_add(count);
    }

    pub fn add_files_modified(&mut self, count: u64) {
        self.files_modified = self.files_modified.saturating_add(count);
    }

    pub fn add_tests_run(&mut self, count: u64) {
        self.tests_run = self.tests_run.saturating_add(count);
    }

    pub fn record_commit(&mut self) {
        self.commits_made = self.commits_made.saturating_add(1);
    }

    pub fn record_conflict_resolved(&mut self) {
        self.conflicts_resolved = self.conflicts_resolved.saturating_add(1);
    }

    /// Minutes elapsed since the session started
    pub fn elapsed_minutes(&self) -> f64 {
        let elapsed = Utc::now().signed_duration_since(self.start_time);
        elapsed.num_milliseconds().max(0) as f64 / 60_000.0
    }

    /// True if every counter is at least as large as in `earlier` and the
    /// start time is unchanged
    pub fn has_grown_from(&self, earlier: &PerformanceMetrics) -> bool {
        self.start_time == earlier.start_time
            && self.files_analyzed >= earlier.files_analyzed
            && self.files_modified >= earlier.files_modified
            && self.tests_run >= earlier.tests_run
            && self.commits_made >= earlier.commits_made
            && self.conflicts_resolved >= earlier.conflicts_resolved
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}
