//! Agent session
//!
//! One `AgentSession` drives one agent through the phase pipeline:
//!
//! ```text
//! Initializing -> AnalyzingEnvironment -> PreparingTask -> ExecutingCore
//!     -> AssuringQuality -> PreparingIntegration -> Completed
//! ```
//!
//! Any working phase may end in `Failed`. A session always produces exactly
//! one [`SessionOutcome`] and publishes it on the telemetry bus. A session
//! built `with_registry` claims its branch itself and releases it before
//! returning; under the orchestrator the lease is held by the caller.

pub mod environment;
pub mod snapshot;

pub use environment::analyze_environment;
pub use snapshot::{checksum_file, checksum_key_files};

use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;

use crate::config::{BranchworkConfig, WorkspaceConfig};
use crate::error::{OrchestratorError, SessionError};
use crate::git::VersionControlGateway;
use crate::models::state_machine::{is_terminal_state, transition_state};
use crate::models::{
    Agent, EnvironmentReport, FailureReport, MergeRequestArtifact, PerformanceMetrics,
    QualitySummary, SessionOutcome, SessionPhase, Snapshot,
};
use crate::orchestrator::registry::{BranchLease, BranchRegistry};
use crate::quality::QualityRunner;
use crate::resolver::{ConflictResolver, Resolution};
use crate::storage::RecordSink;
use crate::telemetry::{
    AgentChannel, ConflictAlertPayload, PhaseChangedPayload, ProgressPayload,
    SessionStartedPayload, TelemetryBus, EVENT_AGENT_FAILURE, EVENT_CONFLICT_DETECTED,
    EVENT_CONFLICT_UNRESOLVED, EVENT_ENVIRONMENT_ANALYZED, EVENT_PHASE_CHANGED, EVENT_PROGRESS,
    EVENT_SESSION_COMPLETED, EVENT_SESSION_STARTED, TOPIC_CONFLICT_ALERTS,
    TOPIC_PERFORMANCE_METRICS, TOPIC_TASK_COORDINATION,
};
use crate::templates::{CommitMessageContext, MergeRequestContext, TemplateEngine};
use crate::work::CoreWork;

/// Ref compared against the target branch during integration
const HEAD_REF: &str = "HEAD";

/// Recorded as the base revision when HEAD cannot be resolved
const UNKNOWN_REVISION: &str = "unknown";

/// Window for the informational recent-commits check
const RECENT_CHANGES_WINDOW: Duration = Duration::from_secs(3600);

/// Cooperative cancellation request, observed at phase boundaries
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Collaborators bound to one working directory
#[derive(Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub gateway: Arc<dyn VersionControlGateway>,
    pub quality: Arc<dyn QualityRunner>,
    pub resolver: Arc<dyn ConflictResolver>,
    pub sink: Arc<dyn RecordSink>,
}

/// Per-session knobs taken from configuration
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub target_branch: String,
    /// Deadline applied to each working phase
    pub phase_timeout: Option<Duration>,
    pub workspace: WorkspaceConfig,
}

impl SessionSettings {
    pub fn from_config(config: &BranchworkConfig) -> Self {
        Self {
            target_branch: config.orchestrator.target_branch.clone(),
            phase_timeout: config
                .orchestrator
                .phase_timeout_secs
                .map(Duration::from_secs),
            workspace: config.workspace.clone(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&BranchworkConfig::default())
    }
}

/// Latest phase and metrics of a running session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub metrics: PerformanceMetrics,
}

/// Result of the conflict check during integration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IntegrationCheck {
    checked: bool,
    clear: bool,
}

impl IntegrationCheck {
    fn unverified() -> Self {
        Self {
            checked: false,
            clear: false,
        }
    }
}

pub struct AgentSession {
    agent: Agent,
    work: Arc<dyn CoreWork>,
    workspace: Workspace,
    channel: AgentChannel,
    templates: Arc<TemplateEngine>,
    settings: SessionSettings,
    phase: SessionPhase,
    metrics: PerformanceMetrics,
    lease: Option<BranchLease>,
    registry: Option<Arc<BranchRegistry>>,
    cancellation: CancellationFlag,
    status: watch::Sender<SessionStatus>,
    quality: QualitySummary,
    artifact: Option<MergeRequestArtifact>,
}

impl AgentSession {
    pub fn new(
        agent: Agent,
        work: Arc<dyn CoreWork>,
        workspace: Workspace,
        bus: &TelemetryBus,
        templates: Arc<TemplateEngine>,
        settings: SessionSettings,
    ) -> Self {
        let metrics = PerformanceMetrics::new();
        let (status, _) = watch::channel(SessionStatus {
            phase: SessionPhase::Initializing,
            metrics,
        });

        Self {
            channel: bus.channel(&agent.agent_id),
            agent,
            work,
            workspace,
            templates,
            settings,
            phase: SessionPhase::Initializing,
            metrics,
            lease: None,
            registry: None,
            cancellation: CancellationFlag::new(),
            status,
            quality: QualitySummary::default(),
            artifact: None,
        }
    }

    /// Claim the branch from `registry` during initialization
    pub fn with_registry(mut self, registry: Arc<BranchRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Watch the session's phase and metrics
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Drive the session to a terminal phase
    pub async fn run(mut self) -> SessionOutcome {
        log::info!(
            "[AgentSession] {} starting on branch {}",
            self.agent.agent_id,
            self.agent.branch_name
        );

        match self.drive().await {
            Ok(artifact) => self.complete(artifact),
            Err(e) => self.fail(e).await,
        }
    }

    async fn drive(&mut self) -> Result<MergeRequestArtifact, SessionError> {
        let deadline = self.settings.phase_timeout;
        let working_phases = SessionPhase::PIPELINE
            .into_iter()
            .take_while(|phase| !is_terminal_state(*phase));

        for phase in working_phases {
            self.enter(phase)?;
            match deadline {
                Some(limit) => tokio::time::timeout(limit, self.execute(phase))
                    .await
                    .map_err(|_| SessionError::Timeout {
                        phase,
                        secs: limit.as_secs(),
                    })??,
                None => self.execute(phase).await?,
            }
        }

        self.artifact
            .take()
            .ok_or_else(|| SessionError::Internal("integration produced no artifact".to_string()))
    }

    /// Move to `phase` unless cancellation was requested
    fn enter(&mut self, phase: SessionPhase) -> Result<(), SessionError> {
        if self.cancellation.is_cancelled() {
            return Err(SessionError::Cancelled { phase });
        }
        if phase != self.phase {
            self.advance(phase)?;
        }
        Ok(())
    }

    fn advance(&mut self, phase: SessionPhase) -> Result<(), SessionError> {
        let old_phase = self.phase;
        self.phase = transition_state(old_phase, phase)?;
        log::debug!(
            "[AgentSession] {} {} -> {}",
            self.agent.agent_id,
            old_phase,
            phase
        );
        self.channel.publish(
            TOPIC_TASK_COORDINATION,
            EVENT_PHASE_CHANGED,
            PhaseChangedPayload {
                old_phase,
                new_phase: phase,
            },
        );
        self.publish_status();
        Ok(())
    }

    fn publish_status(&self) {
        self.status.send_replace(SessionStatus {
            phase: self.phase,
            metrics: self.metrics,
        });
    }

    async fn execute(&mut self, phase: SessionPhase) -> Result<(), SessionError> {
        match phase {
            SessionPhase::Initializing => self.initialize().await,
            SessionPhase::AnalyzingEnvironment => {
                self.analyze().await;
                Ok(())
            }
            SessionPhase::PreparingTask => self.prepare().await,
            SessionPhase::ExecutingCore => self.execute_core().await,
            SessionPhase::AssuringQuality => {
                self.assure_quality().await;
                Ok(())
            }
            SessionPhase::PreparingIntegration => {
                let artifact = self.prepare_integration().await;
                self.artifact = Some(artifact);
                Ok(())
            }
            SessionPhase::Completed | SessionPhase::Failed => Err(SessionError::Internal(
                format!("{} is not a working phase", phase),
            )),
        }
    }

    async fn initialize(&mut self) -> Result<(), SessionError> {
        if let Some(registry) = &self.registry {
            let lease = registry
                .claim(&self.agent.branch_name, &self.agent.agent_id)
                .map_err(|e| match e {
                    OrchestratorError::BranchConflict { branch, owner } => {
                        SessionError::BranchConflict { branch, owner }
                    }
                    other => SessionError::Internal(other.to_string()),
                })?;
            self.lease = Some(lease);
        }

        let branch = &self.agent.branch_name;
        let current = self.workspace.gateway.current_branch().await;
        if &current != branch {
            log::info!(
                "[AgentSession] {} switching from {} to {}",
                self.agent.agent_id,
                current,
                branch
            );
            self.workspace
                .gateway
                .checkout(branch)
                .await
                .map_err(SessionError::Checkout)?;
        }

        self.channel.publish(
            TOPIC_TASK_COORDINATION,
            EVENT_SESSION_STARTED,
            SessionStartedPayload {
                branch: branch.clone(),
                task_title: self.agent.task.title.clone(),
            },
        );
        Ok(())
    }

    async fn analyze(&mut self) {
        let root = self.workspace.root.clone();
        let config = self.settings.workspace.clone();
        let mut report =
            tokio::task::spawn_blocking(move || analyze_environment(&root, &config))
                .await
                .unwrap_or_else(|e| EnvironmentReport {
                    warnings: vec![format!("Environment scan aborted: {}", e)],
                    ..Default::default()
                });

        report.recent_changes = self
            .workspace
            .gateway
            .has_recent_commits(RECENT_CHANGES_WINDOW)
            .await;
        if report.recent_changes {
            log::warn!(
                "[AgentSession] {} recent changes detected on the workspace",
                self.agent.agent_id
            );
        }
        for warning in &report.warnings {
            log::debug!("[AgentSession] {} {}", self.agent.agent_id, warning);
        }

        self.metrics.add_files_analyzed(report.files_scanned as u64);
        self.publish_status();
        log::info!(
            "[AgentSession] {} analyzed {} files",
            self.agent.agent_id,
            report.files_scanned
        );

        self.channel
            .publish(TOPIC_TASK_COORDINATION, EVENT_ENVIRONMENT_ANALYZED, &report);
    }

    async fn prepare(&mut self) -> Result<(), SessionError> {
        let snapshot_error = |e: &dyn std::fmt::Display| SessionError::Snapshot(e.to_string());
        let agent_id = self.agent.agent_id.clone();

        self.workspace
            .sink
            .prepare(&agent_id)
            .await
            .map_err(|e| snapshot_error(&e))?;

        let base_revision = self
            .workspace
            .gateway
            .head_revision()
            .await
            .unwrap_or_else(|| UNKNOWN_REVISION.to_string());

        let root = self.workspace.root.clone();
        let key_files = self.settings.workspace.key_files.clone();
        let checksums = tokio::task::spawn_blocking(move || checksum_key_files(&root, &key_files))
            .await
            .map_err(|e| snapshot_error(&e))?
            .map_err(|e| snapshot_error(&e))?;

        let snapshot = Snapshot::new(
            &agent_id,
            &self.agent.branch_name,
            &base_revision,
            checksums,
        );
        self.workspace
            .sink
            .save_snapshot(&snapshot)
            .await
            .map_err(|e| snapshot_error(&e))?;

        log::info!(
            "[AgentSession] {} snapshot taken at {}",
            agent_id,
            base_revision
        );
        Ok(())
    }

    async fn execute_core(&mut self) -> Result<(), SessionError> {
        let total = self.work.total_units();
        log::info!(
            "[AgentSession] {} executing {} units",
            self.agent.agent_id,
            total
        );

        for index in 0..total {
            let progress = self
                .work
                .perform_unit(index, &self.workspace.root)
                .await
                .map_err(|e| SessionError::CoreWork(e.to_string()))?;

            self.metrics.add_files_modified(progress.files_modified);
            self.metrics.add_tests_run(progress.tests_run);
            self.publish_status();

            self.channel.publish(
                TOPIC_PERFORMANCE_METRICS,
                EVENT_PROGRESS,
                ProgressPayload {
                    unit: index + 1,
                    total_units: total,
                    percentage: ProgressPayload::percentage_of(index + 1, total),
                    description: progress.description,
                    files_modified: self.metrics.files_modified(),
                    tests_run: self.metrics.tests_run(),
                },
            );
        }

        Ok(())
    }

    async fn assure_quality(&mut self) {
        let agent_id = &self.agent.agent_id;
        let quality = &self.workspace.quality;

        let diagnostics = quality.analyze().await;
        for finding in &diagnostics.findings {
            log::warn!("[AgentSession] {} analysis: {}", agent_id, finding);
        }

        let tests = quality.test().await;
        if tests.failed > 0 {
            log::warn!(
                "[AgentSession] {} {} of {} tests failed",
                agent_id,
                tests.failed,
                tests.total()
            );
        }

        let format_applied = quality.format().await;

        self.metrics.add_tests_run(u64::from(tests.total()));
        self.quality = QualitySummary {
            analysis_passed: diagnostics.passed,
            findings: diagnostics.findings,
            tests_passed: tests.passed,
            tests_failed: tests.failed,
            format_applied,
        };
        self.publish_status();
    }

    async fn prepare_integration(&mut self) -> MergeRequestArtifact {
        let check = self.check_conflicts().await;
        let (commit_id, commit_ok) = self.commit_work().await;
        let ready_for_review = check.checked && check.clear && commit_ok;
        self.publish_status();

        let task = &self.agent.task;
        let context = MergeRequestContext {
            agent_id: self.agent.agent_id.clone(),
            branch: self.agent.branch_name.clone(),
            target_branch: self.settings.target_branch.clone(),
            execution_minutes: format!("{:.1}", self.metrics.elapsed_minutes()),
            commit_id: commit_id.clone(),
            files_analyzed: self.metrics.files_analyzed(),
            files_modified: self.metrics.files_modified(),
            tests_run: self.metrics.tests_run(),
            commits_made: self.metrics.commits_made(),
            conflicts_resolved: self.metrics.conflicts_resolved(),
            analysis_passed: self.quality.analysis_passed,
            tests_passed: self.quality.tests_passed,
            tests_failed: self.quality.tests_failed,
            format_applied: self.quality.format_applied,
            findings: self.quality.findings.clone(),
            task_description: task.description.clone(),
            conflicts_checked: check.checked,
            conflicts_clear: check.clear,
            ready_for_review,
        };
        let description = self
            .templates
            .render_merge_request(&context)
            .unwrap_or_else(|e| {
                log::error!("[AgentSession] {}", e);
                task.description.clone()
            });

        let artifact = MergeRequestArtifact {
            agent_id: self.agent.agent_id.clone(),
            branch: self.agent.branch_name.clone(),
            target_branch: self.settings.target_branch.clone(),
            title: format!("AI Agent {}: {}", self.agent.agent_id, task.title),
            description,
            metrics: self.metrics,
            quality: self.quality.clone(),
            commit_id,
            ready_for_review,
            created_at: Utc::now(),
        };

        if let Err(e) = self.workspace.sink.save_merge_request(&artifact).await {
            log::error!(
                "[AgentSession] {} failed to persist merge request: {}",
                self.agent.agent_id,
                e
            );
        }

        artifact
    }

    /// Compare HEAD with the target branch and hand conflicts to the resolver
    async fn check_conflicts(&mut self) -> IntegrationCheck {
        let agent_id = self.agent.agent_id.clone();
        let target = self.settings.target_branch.clone();
        let gateway = Arc::clone(&self.workspace.gateway);

        let target_ref = match gateway.fetch_target(&target).await {
            Ok(target_ref) => target_ref,
            Err(e) => {
                log::warn!(
                    "[AgentSession] {} could not check for conflicts: {}",
                    agent_id,
                    e
                );
                return IntegrationCheck::unverified();
            }
        };

        let base = gateway.merge_base(HEAD_REF, &target_ref).await;
        let report = match gateway.diff(base.as_deref(), HEAD_REF, &target_ref).await {
            Ok(report) => report,
            Err(e) => {
                log::warn!(
                    "[AgentSession] {} could not check for conflicts: {}",
                    agent_id,
                    e
                );
                return IntegrationCheck::unverified();
            }
        };

        if !report.has_conflicts {
            log::info!("[AgentSession] {} no conflicts with {}", agent_id, target);
            return IntegrationCheck {
                checked: true,
                clear: true,
            };
        }

        let conflicting_files = report.conflicting_files.clone();
        log::warn!(
            "[AgentSession] {} conflicts with {} in {} files",
            agent_id,
            target,
            conflicting_files.len()
        );
        self.channel.publish(
            TOPIC_CONFLICT_ALERTS,
            EVENT_CONFLICT_DETECTED,
            ConflictAlertPayload {
                branch: self.agent.branch_name.clone(),
                target_branch: target.clone(),
                conflicting_files: conflicting_files.clone(),
                reason: None,
            },
        );

        match self.workspace.resolver.resolve(report).await {
            Resolution::Resolved => {
                log::info!("[AgentSession] {} conflicts resolved", agent_id);
                self.metrics.record_conflict_resolved();
                IntegrationCheck {
                    checked: true,
                    clear: true,
                }
            }
            Resolution::Unresolved { reason } => {
                log::warn!(
                    "[AgentSession] {} conflicts left unresolved: {}",
                    agent_id,
                    reason
                );
                self.channel.publish(
                    TOPIC_CONFLICT_ALERTS,
                    EVENT_CONFLICT_UNRESOLVED,
                    ConflictAlertPayload {
                        branch: self.agent.branch_name.clone(),
                        target_branch: target,
                        conflicting_files,
                        reason: Some(reason),
                    },
                );
                IntegrationCheck {
                    checked: true,
                    clear: false,
                }
            }
        }
    }

    /// Commit pending work. Returns the commit id and whether the step succeeded.
    async fn commit_work(&mut self) -> (Option<String>, bool) {
        let task = &self.agent.task;
        let context = CommitMessageContext {
            agent_type: task.agent_type.clone(),
            task_title: task.title.clone(),
            agent_id: self.agent.agent_id.clone(),
            files_modified: self.metrics.files_modified(),
            tests_run: self.metrics.tests_run(),
            quality_passed: self.quality.all_passed(),
            target_branch: self.settings.target_branch.clone(),
        };
        let message = self
            .templates
            .render_commit_message(&context)
            .unwrap_or_else(|e| {
                log::error!("[AgentSession] {}", e);
                format!("{}: {}", task.agent_type, task.title)
            });

        match self.workspace.gateway.commit(&message).await {
            Ok(Some(commit_id)) => {
                log::info!(
                    "[AgentSession] {} committed {}",
                    self.agent.agent_id,
                    commit_id
                );
                self.metrics.record_commit();
                (Some(commit_id), true)
            }
            Ok(None) => {
                log::info!("[AgentSession] {} nothing to commit", self.agent.agent_id);
                (None, true)
            }
            Err(e) => {
                log::error!("[AgentSession] {} {}", self.agent.agent_id, e);
                (None, false)
            }
        }
    }

    fn complete(mut self, artifact: MergeRequestArtifact) -> SessionOutcome {
        if let Err(e) = self.advance(SessionPhase::Completed) {
            log::error!("[AgentSession] {}", e);
        }

        log::info!(
            "[AgentSession] {} completed (ready for review: {})",
            self.agent.agent_id,
            artifact.ready_for_review
        );
        self.channel
            .publish(TOPIC_TASK_COORDINATION, EVENT_SESSION_COMPLETED, &artifact);

        self.lease.take();
        SessionOutcome::Completed(artifact)
    }

    async fn fail(mut self, error: SessionError) -> SessionOutcome {
        let failed_in = self.phase;
        log::error!(
            "[AgentSession] {} failed during {}: {}",
            self.agent.agent_id,
            failed_in,
            error
        );

        let report = FailureReport {
            agent_id: self.agent.agent_id.clone(),
            kind: error.kind(),
            message: error.to_string(),
            phase: failed_in,
            metrics: self.metrics,
            timestamp: Utc::now(),
        };

        if let Err(e) = self.advance(SessionPhase::Failed) {
            log::error!("[AgentSession] {}", e);
        }
        record_failure(&self.channel, self.workspace.sink.as_ref(), &report).await;

        self.lease.take();
        SessionOutcome::Failed(report)
    }
}

/// Persist a failure report and publish it on `conflict-alerts`
pub(crate) async fn record_failure(
    channel: &AgentChannel,
    sink: &dyn RecordSink,
    report: &FailureReport,
) {
    if let Err(e) = sink.save_failure(report).await {
        log::error!(
            "[AgentSession] {} failed to persist failure report: {}",
            report.agent_id,
            e
        );
    }
    channel.publish(TOPIC_CONFLICT_ALERTS, EVENT_AGENT_FAILURE, report);
}
