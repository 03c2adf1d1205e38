//! Orchestrator
//!
//! Admits tasks, enforces one live session per branch, bounds how many
//! sessions run at once and collects every session's outcome.
//!
//! A submitted session first takes its branch lease, then waits for a
//! concurrency slot while the branch stays reserved. Once a slot is granted
//! the workspace provider hands it a working directory and the session runs
//! on its own tokio task. The lease is held here rather than by the session,
//! and is dropped only after the provider has released the workspace. A
//! panicking session is turned into a failure report; the orchestrator
//! itself never goes down with it.

pub mod registry;
mod workspace;

pub use registry::{BranchLease, BranchRegistry};
pub use workspace::{git_workspace, SharedWorkspace, WorkspaceProvider, WorktreeProvider};

use chrono::Utc;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Semaphore};

use crate::error::{OrchestratorError, SessionError};
use crate::models::{
    Agent, AgentTask, FailureReport, PerformanceMetrics, SessionOutcome, SessionPhase,
};
use crate::session::{record_failure, AgentSession, CancellationFlag, SessionSettings};
use crate::shutdown::ShutdownState;
use crate::telemetry::TelemetryBus;
use crate::templates::TemplateEngine;
use crate::utils::lock_mutex_recover;
use crate::work::CoreWork;

/// Identifies one submitted session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    agent_id: String,
    branch: String,
}

impl SessionHandle {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }
}

struct SessionEntry {
    cancellation: CancellationFlag,
    outcome: watch::Receiver<Option<SessionOutcome>>,
}

/// Everything a spawned session task needs
#[derive(Clone)]
struct SessionContext {
    slots: Arc<Semaphore>,
    bus: TelemetryBus,
    templates: Arc<TemplateEngine>,
    settings: SessionSettings,
    provider: Arc<dyn WorkspaceProvider>,
    outcomes: Arc<Mutex<Vec<SessionOutcome>>>,
}

pub struct Orchestrator {
    context: SessionContext,
    registry: Arc<BranchRegistry>,
    sessions: Mutex<HashMap<String, SessionEntry>>,
    shutdown: ShutdownState,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn WorkspaceProvider>,
        settings: SessionSettings,
        max_concurrency: usize,
    ) -> Self {
        let max_concurrency = max_concurrency.max(1);
        log::info!(
            "[Orchestrator] Created with max_concurrency={}, target_branch={}",
            max_concurrency,
            settings.target_branch
        );

        Self {
            context: SessionContext {
                slots: Arc::new(Semaphore::new(max_concurrency)),
                bus: TelemetryBus::new(),
                templates: Arc::new(TemplateEngine::new()),
                settings,
                provider,
                outcomes: Arc::new(Mutex::new(Vec::new())),
            },
            registry: Arc::new(BranchRegistry::new()),
            sessions: Mutex::new(HashMap::new()),
            shutdown: ShutdownState::new(),
        }
    }

    pub fn with_bus(mut self, bus: TelemetryBus) -> Self {
        self.context.bus = bus;
        self
    }

    pub fn with_templates(mut self, templates: TemplateEngine) -> Self {
        self.context.templates = Arc::new(templates);
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownState) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn bus(&self) -> &TelemetryBus {
        &self.context.bus
    }

    pub fn registry(&self) -> &Arc<BranchRegistry> {
        &self.registry
    }

    /// Admit a session for `task` on `branch`.
    ///
    /// The branch is claimed before anything is spawned: a branch that is
    /// already owned by a live session is rejected and no session is created.
    pub fn submit(
        &self,
        agent_id: Option<String>,
        task: AgentTask,
        branch: &str,
        work: Arc<dyn CoreWork>,
    ) -> Result<SessionHandle, OrchestratorError> {
        if self.shutdown.is_shutdown_requested() {
            return Err(OrchestratorError::ShuttingDown);
        }

        let agent_id = agent_id.unwrap_or_else(Agent::generate_id);
        let mut sessions = lock_mutex_recover(&self.sessions);
        if sessions.contains_key(&agent_id) {
            return Err(OrchestratorError::DuplicateAgent(agent_id));
        }

        let lease = self.registry.claim(branch, &agent_id)?;
        let agent = Agent::new(&agent_id, branch, task);
        let cancellation = CancellationFlag::new();
        let (outcome_tx, outcome_rx) = watch::channel(None);

        tokio::spawn(drive_session(
            self.context.clone(),
            agent,
            work,
            lease,
            cancellation.clone(),
            outcome_tx,
        ));

        sessions.insert(
            agent_id.clone(),
            SessionEntry {
                cancellation,
                outcome: outcome_rx,
            },
        );
        log::info!("[Orchestrator] Submitted {} on branch {}", agent_id, branch);

        Ok(SessionHandle {
            agent_id,
            branch: branch.to_string(),
        })
    }

    /// Wait for a session's outcome; returns at once if it already finished
    pub async fn result(
        &self,
        handle: &SessionHandle,
    ) -> Result<SessionOutcome, OrchestratorError> {
        let mut outcome = {
            let sessions = lock_mutex_recover(&self.sessions);
            sessions
                .get(&handle.agent_id)
                .map(|entry| entry.outcome.clone())
                .ok_or_else(|| OrchestratorError::UnknownSession(handle.agent_id.clone()))?
        };

        let finished = match outcome.wait_for(|value| value.is_some()).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        finished
            .or_else(|| outcome.borrow().clone())
            .ok_or_else(|| OrchestratorError::SessionLost(handle.agent_id.clone()))
    }

    /// Outcomes of every session that has finished, in completion order
    pub fn outcomes(&self) -> Vec<SessionOutcome> {
        lock_mutex_recover(&self.context.outcomes).clone()
    }

    /// Ask a session to stop at its next phase boundary
    pub fn cancel(&self, handle: &SessionHandle) -> Result<(), OrchestratorError> {
        let sessions = lock_mutex_recover(&self.sessions);
        let entry = sessions
            .get(&handle.agent_id)
            .ok_or_else(|| OrchestratorError::UnknownSession(handle.agent_id.clone()))?;
        entry.cancellation.cancel();
        log::info!("[Orchestrator] Cancellation requested for {}", handle.agent_id);
        Ok(())
    }

    pub fn cancel_all(&self) {
        let sessions = lock_mutex_recover(&self.sessions);
        for entry in sessions.values() {
            entry.cancellation.cancel();
        }
        log::info!(
            "[Orchestrator] Cancellation requested for {} sessions",
            sessions.len()
        );
    }

    /// Refuse new sessions and cancel the running ones
    pub fn shutdown(&self) {
        self.shutdown.request_shutdown();
        self.cancel_all();
    }

    /// Wait for every submitted session, then return all outcomes
    pub async fn wait_all(&self) -> Vec<SessionOutcome> {
        let pending: Vec<_> = {
            let sessions = lock_mutex_recover(&self.sessions);
            sessions.values().map(|entry| entry.outcome.clone()).collect()
        };

        for mut outcome in pending {
            if outcome.wait_for(|value| value.is_some()).await.is_err() {
                log::warn!("[Orchestrator] A session ended without an outcome");
            }
        }

        self.outcomes()
    }
}

async fn drive_session(
    context: SessionContext,
    agent: Agent,
    work: Arc<dyn CoreWork>,
    lease: BranchLease,
    cancellation: CancellationFlag,
    outcome_tx: watch::Sender<Option<SessionOutcome>>,
) {
    let outcome = run_in_slot(&context, agent, work, lease, cancellation).await;
    lock_mutex_recover(&context.outcomes).push(outcome.clone());
    outcome_tx.send_replace(Some(outcome));
}

async fn run_in_slot(
    context: &SessionContext,
    agent: Agent,
    work: Arc<dyn CoreWork>,
    lease: BranchLease,
    cancellation: CancellationFlag,
) -> SessionOutcome {
    let channel = context.bus.channel(&agent.agent_id);

    let _permit = match Arc::clone(&context.slots).acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            let report = failure_report(
                &agent,
                SessionError::Internal(format!("no concurrency slot: {}", e)),
                SessionPhase::Initializing,
                PerformanceMetrics::new(),
            );
            record_failure(&channel, context.provider.record_sink().as_ref(), &report).await;
            return SessionOutcome::Failed(report);
        }
    };
    log::debug!("[Orchestrator] {} got a slot", agent.agent_id);

    let workspace = match context.provider.acquire(&agent).await {
        Ok(workspace) => workspace,
        Err(e) => {
            let report = failure_report(
                &agent,
                SessionError::Checkout(e),
                SessionPhase::Initializing,
                PerformanceMetrics::new(),
            );
            record_failure(&channel, context.provider.record_sink().as_ref(), &report).await;
            return SessionOutcome::Failed(report);
        }
    };

    let sink = Arc::clone(&workspace.sink);
    let session = AgentSession::new(
        agent.clone(),
        work,
        workspace,
        &context.bus,
        Arc::clone(&context.templates),
        context.settings.clone(),
    )
    .with_cancellation(cancellation);
    let status = session.status();

    let outcome = match tokio::spawn(session.run()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let message = if e.is_panic() {
                format!("session panicked: {}", panic_message(e.into_panic()))
            } else {
                "session task was aborted".to_string()
            };
            let last = *status.borrow();
            log::error!("[Orchestrator] {} {}", agent.agent_id, message);

            let report = failure_report(
                &agent,
                SessionError::Internal(message),
                last.phase,
                last.metrics,
            );
            record_failure(&channel, sink.as_ref(), &report).await;
            SessionOutcome::Failed(report)
        }
    };

    // The branch stays claimed until its worktree is gone
    context.provider.release(&agent).await;
    drop(lease);
    log::info!(
        "[Orchestrator] {} finished ({})",
        agent.agent_id,
        if outcome.is_completed() { "completed" } else { "failed" }
    );
    outcome
}

fn failure_report(
    agent: &Agent,
    error: SessionError,
    phase: SessionPhase,
    metrics: PerformanceMetrics,
) -> FailureReport {
    FailureReport {
        agent_id: agent.agent_id.clone(),
        kind: error.kind(),
        message: error.to_string(),
        phase,
        metrics,
        timestamp: Utc::now(),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
