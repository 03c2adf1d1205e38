//! Orchestrator admission, concurrency and failure isolation

mod common;

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use branchwork::error::GitError;
use branchwork::orchestrator::WorkspaceProvider;
use branchwork::shutdown::ShutdownState;
use branchwork::storage::{MemoryRecordSink, RecordSink};
use branchwork::telemetry::{EVENT_AGENT_FAILURE, TOPIC_CONFLICT_ALERTS};
use branchwork::{
    Agent, AgentTask, ErrorKind, Orchestrator, OrchestratorError, SessionPhase, SessionSettings,
    Workspace,
};
use common::{drain, Fakes, ScriptedWork};

/// Hands out one shared fake workspace and counts acquire/release calls
struct CountingProvider {
    workspace: Workspace,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl CountingProvider {
    fn new(fakes: &Fakes, dir: &TempDir) -> Self {
        Self {
            workspace: fakes.workspace(dir.path()),
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WorkspaceProvider for CountingProvider {
    fn record_sink(&self) -> Arc<dyn RecordSink> {
        Arc::clone(&self.workspace.sink)
    }

    async fn acquire(&self, _agent: &Agent) -> Result<Workspace, GitError> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(self.workspace.clone())
    }

    async fn release(&self, _agent: &Agent) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Provider whose workspaces can never be created
struct BrokenProvider {
    sink: Arc<MemoryRecordSink>,
}

#[async_trait]
impl WorkspaceProvider for BrokenProvider {
    fn record_sink(&self) -> Arc<dyn RecordSink> {
        self.sink.clone()
    }

    async fn acquire(&self, _agent: &Agent) -> Result<Workspace, GitError> {
        Err(GitError::Worktree("no space left on device".to_string()))
    }
}

struct Harness {
    _dir: TempDir,
    fakes: Fakes,
    provider: Arc<CountingProvider>,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("lib/main.dart"), "void main() {}").unwrap();
        let fakes = Fakes::new();
        let provider = Arc::new(CountingProvider::new(&fakes, &dir));
        Self {
            _dir: dir,
            fakes,
            provider,
        }
    }

    fn orchestrator(&self, max_concurrency: usize) -> Orchestrator {
        Orchestrator::new(
            self.provider.clone(),
            SessionSettings::default(),
            max_concurrency,
        )
    }
}

fn task(title: &str) -> AgentTask {
    AgentTask::new(title)
}

fn slow_work() -> Arc<ScriptedWork> {
    Arc::new(ScriptedWork::succeeding(2).with_delay(Duration::from_millis(100)))
}

#[tokio::test]
async fn test_submit_and_complete() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(2);

    let handle = orchestrator
        .submit(
            Some("agent-a".to_string()),
            task("Add alerts"),
            "feature/alerts",
            Arc::new(ScriptedWork::succeeding(1)),
        )
        .unwrap();
    assert_eq!(handle.agent_id(), "agent-a");
    assert_eq!(handle.branch(), "feature/alerts");

    let outcome = orchestrator.result(&handle).await.unwrap();
    let mr = outcome.merge_request().unwrap();
    assert_eq!(mr.title, "AI Agent agent-a: Add alerts");
    assert!(mr.ready_for_review);

    assert!(harness
        .fakes
        .gateway
        .calls()
        .contains(&"commit feat: Add alerts".to_string()));
    assert_eq!(harness.provider.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(harness.provider.released.load(Ordering::SeqCst), 1);
    assert!(orchestrator.registry().is_empty());
}

#[tokio::test]
async fn test_generated_agent_ids_are_unique() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(2);

    let first = orchestrator
        .submit(None, task("One"), "feature/one", Arc::new(ScriptedWork::succeeding(1)))
        .unwrap();
    let second = orchestrator
        .submit(None, task("Two"), "feature/two", Arc::new(ScriptedWork::succeeding(1)))
        .unwrap();

    assert!(!first.agent_id().is_empty());
    assert_ne!(first.agent_id(), second.agent_id());
    orchestrator.wait_all().await;
}

#[tokio::test]
async fn test_branch_conflict_rejects_second_session() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(2);

    let first = orchestrator
        .submit(Some("agent-a".to_string()), task("First"), "feature/shared", slow_work())
        .unwrap();
    let second = orchestrator.submit(
        Some("agent-b".to_string()),
        task("Second"),
        "feature/shared",
        slow_work(),
    );

    match second {
        Err(OrchestratorError::BranchConflict { branch, owner }) => {
            assert_eq!(branch, "feature/shared");
            assert_eq!(owner, "agent-a");
        }
        other => panic!(
            "expected a branch conflict, got {:?}",
            other.map(|h| h.agent_id().to_string())
        ),
    }

    assert!(orchestrator.result(&first).await.unwrap().is_completed());
    // Only the admitted session produced an outcome
    let outcomes = orchestrator.wait_all().await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].agent_id(), "agent-a");
}

#[tokio::test]
async fn test_branch_reusable_after_completion() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(1);

    let first = orchestrator
        .submit(None, task("First"), "feature/reuse", Arc::new(ScriptedWork::succeeding(1)))
        .unwrap();
    orchestrator.result(&first).await.unwrap();

    let second = orchestrator
        .submit(None, task("Second"), "feature/reuse", Arc::new(ScriptedWork::succeeding(1)))
        .unwrap();
    assert!(orchestrator.result(&second).await.unwrap().is_completed());
}

#[tokio::test]
async fn test_branch_freed_only_after_workspace_release() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(1);

    let handle = orchestrator
        .submit(None, task("First"), "feature/held", Arc::new(ScriptedWork::succeeding(1)))
        .unwrap();
    while orchestrator.registry().owner("feature/held").is_some() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert_eq!(harness.provider.released.load(Ordering::SeqCst), 1);
    orchestrator.result(&handle).await.unwrap();
}

#[tokio::test]
async fn test_duplicate_agent_id() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(2);

    orchestrator
        .submit(Some("agent-a".to_string()), task("First"), "feature/one", slow_work())
        .unwrap();
    let duplicate = orchestrator.submit(
        Some("agent-a".to_string()),
        task("Second"),
        "feature/two",
        slow_work(),
    );

    assert!(matches!(duplicate, Err(OrchestratorError::DuplicateAgent(id)) if id == "agent-a"));
    // The rejected submission must not hold its branch
    assert_eq!(orchestrator.registry().owner("feature/two"), None);
    orchestrator.wait_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_is_bounded() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(2);
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));

    for i in 0..6 {
        let work = ScriptedWork::succeeding(2)
            .with_delay(Duration::from_millis(50))
            .with_gauge(Arc::clone(&active), Arc::clone(&max_active));
        orchestrator
            .submit(
                None,
                task(&format!("Task {}", i)),
                &format!("feature/{}", i),
                Arc::new(work),
            )
            .unwrap();
    }

    let outcomes = orchestrator.wait_all().await;
    assert_eq!(outcomes.len(), 6);
    assert!(outcomes.iter().all(|o| o.is_completed()));

    let peak = max_active.load(Ordering::SeqCst);
    assert!(peak >= 1);
    assert!(peak <= 2, "{} sessions ran at once", peak);
}

#[tokio::test]
async fn test_exactly_one_outcome_per_session() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(3);

    let mut handles = Vec::new();
    for (i, units) in [vec![Some(1)], vec![None], vec![Some(2), None], vec![Some(1), Some(1)]]
        .into_iter()
        .enumerate()
    {
        handles.push(
            orchestrator
                .submit(
                    None,
                    task("Mixed"),
                    &format!("feature/{}", i),
                    Arc::new(ScriptedWork::new(units)),
                )
                .unwrap(),
        );
    }

    let outcomes = orchestrator.wait_all().await;
    assert_eq!(outcomes.len(), 4);
    let ids: HashSet<&str> = outcomes.iter().map(|o| o.agent_id()).collect();
    assert_eq!(ids.len(), 4);
    assert_eq!(outcomes.iter().filter(|o| o.is_completed()).count(), 2);

    // One persisted record per session, whichever way it ended
    assert_eq!(harness.fakes.sink.merge_requests().len(), 2);
    assert_eq!(harness.fakes.sink.failures().len(), 2);
    assert_eq!(harness.provider.released.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_agent_type_prefixes_commit() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(1);

    let handle = orchestrator
        .submit(
            None,
            task("Handle expired tokens").with_agent_type("fix"),
            "fix/login",
            Arc::new(ScriptedWork::succeeding(1)),
        )
        .unwrap();
    orchestrator.result(&handle).await.unwrap();

    assert!(harness
        .fakes
        .gateway
        .calls()
        .contains(&"commit fix: Handle expired tokens".to_string()));
}

#[tokio::test]
async fn test_result_can_be_read_twice() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(1);

    let handle = orchestrator
        .submit(None, task("Twice"), "feature/twice", Arc::new(ScriptedWork::succeeding(1)))
        .unwrap();

    let first = orchestrator.result(&handle).await.unwrap();
    let second = orchestrator.result(&handle).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(orchestrator.outcomes().len(), 1);
}

#[tokio::test]
async fn test_panicking_session_is_isolated() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(2);
    let mut alerts = orchestrator.bus().subscribe(TOPIC_CONFLICT_ALERTS);

    let panicking = orchestrator
        .submit(
            Some("agent-boom".to_string()),
            task("Explode"),
            "feature/boom",
            Arc::new(ScriptedWork::succeeding(3).with_panic_at(1)),
        )
        .unwrap();
    let healthy = orchestrator
        .submit(None, task("Fine"), "feature/fine", Arc::new(ScriptedWork::succeeding(2)))
        .unwrap();

    let outcome = orchestrator.result(&panicking).await.unwrap();
    let report = outcome.failure().unwrap();
    assert_eq!(report.kind, ErrorKind::Internal);
    assert_eq!(report.phase, SessionPhase::ExecutingCore);
    assert!(report.message.contains("unit 1 exploded"));
    // Progress made before the panic survives
    assert_eq!(report.metrics.files_modified(), 1);

    assert!(orchestrator.result(&healthy).await.unwrap().is_completed());
    assert_eq!(orchestrator.registry().owner("feature/boom"), None);
    assert!(harness
        .fakes
        .sink
        .failures()
        .iter()
        .any(|f| f.agent_id == "agent-boom"));
    assert!(drain(&mut alerts)
        .iter()
        .any(|e| e.kind == EVENT_AGENT_FAILURE && e.agent_id == "agent-boom"));

    // Still accepting work
    let after = orchestrator
        .submit(None, task("After"), "feature/boom", Arc::new(ScriptedWork::succeeding(1)))
        .unwrap();
    assert!(orchestrator.result(&after).await.unwrap().is_completed());
}

#[tokio::test]
async fn test_cancel_queued_session() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(1);

    let running = orchestrator
        .submit(None, task("Running"), "feature/running", slow_work())
        .unwrap();
    let queued = orchestrator
        .submit(None, task("Queued"), "feature/queued", slow_work())
        .unwrap();
    orchestrator.cancel(&queued).unwrap();

    assert!(orchestrator.result(&running).await.unwrap().is_completed());
    let outcome = orchestrator.result(&queued).await.unwrap();
    let report = outcome.failure().unwrap();
    assert_eq!(report.kind, ErrorKind::Cancelled);
    assert_eq!(report.phase, SessionPhase::Initializing);
    assert!(orchestrator.registry().is_empty());
}

#[tokio::test]
async fn test_unknown_session() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(1);
    let other = harness.orchestrator(1);

    let foreign = other
        .submit(None, task("Elsewhere"), "feature/elsewhere", Arc::new(ScriptedWork::succeeding(1)))
        .unwrap();

    assert!(matches!(
        orchestrator.result(&foreign).await,
        Err(OrchestratorError::UnknownSession(_))
    ));
    assert!(matches!(
        orchestrator.cancel(&foreign),
        Err(OrchestratorError::UnknownSession(_))
    ));
    other.wait_all().await;
}

#[tokio::test]
async fn test_shutdown_cancels_and_refuses() {
    let harness = Harness::new();
    let shutdown = ShutdownState::new();
    let orchestrator = harness.orchestrator(1).with_shutdown(shutdown.clone());

    let handle = orchestrator
        .submit(None, task("Interrupted"), "feature/interrupted", slow_work())
        .unwrap();
    orchestrator.shutdown();
    assert!(shutdown.is_shutdown_requested());

    assert!(matches!(
        orchestrator.submit(None, task("Late"), "feature/late", slow_work()),
        Err(OrchestratorError::ShuttingDown)
    ));

    let report = orchestrator.result(&handle).await.unwrap();
    assert_eq!(report.failure().unwrap().kind, ErrorKind::Cancelled);
    assert_eq!(orchestrator.wait_all().await.len(), 1);
}

#[tokio::test]
async fn test_workspace_failure_is_reported_as_checkout() {
    let sink = Arc::new(MemoryRecordSink::new());
    let orchestrator = Orchestrator::new(
        Arc::new(BrokenProvider { sink: sink.clone() }),
        SessionSettings::default(),
        2,
    );

    let handle = orchestrator
        .submit(
            Some("agent-x".to_string()),
            task("Nowhere"),
            "feature/nowhere",
            Arc::new(ScriptedWork::succeeding(1)),
        )
        .unwrap();

    let outcome = orchestrator.result(&handle).await.unwrap();
    let report = outcome.failure().unwrap();
    assert_eq!(report.kind, ErrorKind::Checkout);
    assert_eq!(report.phase, SessionPhase::Initializing);
    assert!(report.message.contains("no space left on device"));
    assert_eq!(sink.failures(), vec![report.clone()]);
    assert!(orchestrator.registry().is_empty());
}
