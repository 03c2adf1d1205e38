//! In-memory fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

use branchwork::error::{GitError, WorkError};
use branchwork::models::ConflictReport;
use branchwork::quality::{Diagnostics, QualityRunner, TestRunResult};
use branchwork::resolver::{ConflictResolver, Resolution};
use branchwork::storage::MemoryRecordSink;
use branchwork::telemetry::TelemetryEvent;
use branchwork::work::{CoreWork, UnitProgress};
use branchwork::git::VersionControlGateway;
use branchwork::Workspace;

/// What the fake commit step returns
#[derive(Debug, Clone)]
pub enum CommitBehavior {
    Commit(String),
    NothingToCommit,
    Fail,
}

pub struct FakeGateway {
    current: Mutex<String>,
    calls: Mutex<Vec<String>>,
    pub fail_checkout: bool,
    pub fail_fetch: bool,
    pub fail_diff: bool,
    pub conflicts: Vec<String>,
    pub commit: CommitBehavior,
    pub head: Option<String>,
}

impl FakeGateway {
    pub fn new(current_branch: &str) -> Self {
        Self {
            current: Mutex::new(current_branch.to_string()),
            calls: Mutex::new(Vec::new()),
            fail_checkout: false,
            fail_fetch: false,
            fail_diff: false,
            conflicts: Vec::new(),
            commit: CommitBehavior::Commit("c0ffee".to_string()),
            head: Some("base123".to_string()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl VersionControlGateway for FakeGateway {
    async fn checkout(&self, branch: &str) -> Result<(), GitError> {
        self.record(format!("checkout {}", branch));
        if self.fail_checkout {
            return Err(GitError::Checkout {
                branch: branch.to_string(),
                message: "branch is locked".to_string(),
            });
        }
        *self.current.lock().unwrap() = branch.to_string();
        Ok(())
    }

    async fn current_branch(&self) -> String {
        self.current.lock().unwrap().clone()
    }

    async fn head_revision(&self) -> Option<String> {
        self.head.clone()
    }

    async fn fetch_target(&self, target_branch: &str) -> Result<String, GitError> {
        self.record(format!("fetch {}", target_branch));
        if self.fail_fetch {
            return Err(GitError::Fetch {
                target: target_branch.to_string(),
                message: "network unreachable".to_string(),
            });
        }
        Ok(format!("refs/remotes/origin/{}", target_branch))
    }

    async fn merge_base(&self, _ref_a: &str, _ref_b: &str) -> Option<String> {
        Some("base123".to_string())
    }

    async fn diff(
        &self,
        base: Option<&str>,
        branch_a: &str,
        branch_b: &str,
    ) -> Result<ConflictReport, GitError> {
        self.record(format!("diff {} {}", branch_a, branch_b));
        if self.fail_diff {
            return Err(GitError::Diff("both refs unreadable".to_string()));
        }
        Ok(ConflictReport::conflicted(
            base.map(str::to_string),
            self.conflicts.clone(),
            self.conflicts.join("\n"),
        ))
    }

    async fn commit(&self, message: &str) -> Result<Option<String>, GitError> {
        self.record(format!("commit {}", message.lines().next().unwrap_or_default()));
        match &self.commit {
            CommitBehavior::Commit(id) => Ok(Some(id.clone())),
            CommitBehavior::NothingToCommit => Ok(None),
            CommitBehavior::Fail => Err(GitError::Commit("index is locked".to_string())),
        }
    }
}

pub struct FakeQuality {
    pub diagnostics: Diagnostics,
    pub tests: TestRunResult,
    pub format_applied: bool,
}

impl FakeQuality {
    pub fn passing() -> Self {
        Self {
            diagnostics: Diagnostics {
                passed: true,
                findings: Vec::new(),
            },
            tests: TestRunResult {
                passed: 8,
                failed: 0,
            },
            format_applied: true,
        }
    }
}

#[async_trait]
impl QualityRunner for FakeQuality {
    async fn analyze(&self) -> Diagnostics {
        self.diagnostics.clone()
    }

    async fn test(&self) -> TestRunResult {
        self.tests
    }

    async fn format(&self) -> bool {
        self.format_applied
    }
}

/// Resolver that counts its calls and returns a fixed answer
pub struct CountingResolver {
    calls: AtomicUsize,
    resolution: Resolution,
}

impl CountingResolver {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            resolution,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConflictResolver for CountingResolver {
    async fn resolve(&self, _report: ConflictReport) -> Resolution {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.resolution.clone()
    }
}

/// Scripted core work
pub struct ScriptedWork {
    /// Files modified per unit; `None` makes that unit fail
    units: Vec<Option<u64>>,
    delay: Duration,
    panic_at: Option<usize>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl ScriptedWork {
    pub fn new(units: Vec<Option<u64>>) -> Self {
        Self {
            units,
            delay: Duration::ZERO,
            panic_at: None,
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// `count` units that each modify one file
    pub fn succeeding(count: usize) -> Self {
        Self::new(vec![Some(1); count])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_panic_at(mut self, unit: usize) -> Self {
        self.panic_at = Some(unit);
        self
    }

    /// Track concurrently running units in shared counters
    pub fn with_gauge(mut self, active: Arc<AtomicUsize>, max_active: Arc<AtomicUsize>) -> Self {
        self.active = active;
        self.max_active = max_active;
        self
    }
}

#[async_trait]
impl CoreWork for ScriptedWork {
    fn total_units(&self) -> usize {
        self.units.len()
    }

    async fn perform_unit(
        &self,
        index: usize,
        _workspace: &Path,
    ) -> Result<UnitProgress, WorkError> {
        if self.panic_at == Some(index) {
            panic!("unit {} exploded", index);
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        match self.units[index] {
            Some(files_modified) => Ok(UnitProgress {
                files_modified,
                tests_run: 2,
                description: format!("unit {}", index),
            }),
            None => Err(WorkError::UnitFailed {
                unit: index,
                message: "compiler error".to_string(),
            }),
        }
    }
}

/// Collaborators of one test session
pub struct Fakes {
    pub gateway: Arc<FakeGateway>,
    pub quality: Arc<FakeQuality>,
    pub resolver: Arc<CountingResolver>,
    pub sink: Arc<MemoryRecordSink>,
}

impl Fakes {
    pub fn new() -> Self {
        Self {
            gateway: Arc::new(FakeGateway::new("main")),
            quality: Arc::new(FakeQuality::passing()),
            resolver: Arc::new(CountingResolver::new(Resolution::Resolved)),
            sink: Arc::new(MemoryRecordSink::new()),
        }
    }

    pub fn with_gateway(mut self, gateway: FakeGateway) -> Self {
        self.gateway = Arc::new(gateway);
        self
    }

    pub fn with_quality(mut self, quality: FakeQuality) -> Self {
        self.quality = Arc::new(quality);
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolver = Arc::new(CountingResolver::new(resolution));
        self
    }

    pub fn workspace(&self, root: &Path) -> Workspace {
        Workspace {
            root: root.to_path_buf(),
            gateway: self.gateway.clone(),
            quality: self.quality.clone(),
            resolver: self.resolver.clone(),
            sink: self.sink.clone(),
        }
    }
}

/// Drain every event currently buffered in a receiver
pub fn drain(receiver: &mut broadcast::Receiver<TelemetryEvent>) -> Vec<TelemetryEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
