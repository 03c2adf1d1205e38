//! End-to-end sessions against a real git repository

#![cfg(unix)]

use git2::{Repository, Signature};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use branchwork::orchestrator::{git_workspace, WorktreeProvider};
use branchwork::storage::{MERGE_REQUEST_FILE, SNAPSHOT_FILE};
use branchwork::telemetry::{
    EVENT_CONFLICT_DETECTED, EVENT_CONFLICT_UNRESOLVED, TOPIC_CONFLICT_ALERTS,
};
use branchwork::templates::TemplateEngine;
use branchwork::work::CommandWork;
use branchwork::{
    Agent, AgentSession, AgentTask, BranchworkConfig, Orchestrator, SessionOutcome,
    SessionSettings, TelemetryBus,
};

const BRANCH: &str = "feature/alerts";

/// Repository with an initial commit plus `develop` and the agent branch
fn setup_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    std::fs::write(dir.path().join("README.md"), "# App\n").unwrap();
    std::fs::write(dir.path().join("pubspec.yaml"), "name: app\n").unwrap();
    let sig = Signature::now("Test User", "test@example.com").unwrap();
    let tree_id = {
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("README.md")).unwrap();
        index.add_path(Path::new("pubspec.yaml")).unwrap();
        index.write().unwrap();
        index.write_tree().unwrap()
    };
    let tree = repo.find_tree(tree_id).unwrap();
    let initial = repo
        .commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
        .unwrap();

    let commit = repo.find_commit(initial).unwrap();
    repo.branch("develop", &commit, false).unwrap();
    repo.branch(BRANCH, &commit, false).unwrap();
    dir
}

/// Commit `content` to `path` on `branch` without touching the working tree
fn commit_on(repo_path: &Path, branch: &str, path: &str, content: &str) {
    let repo = Repository::open(repo_path).unwrap();
    let refname = format!("refs/heads/{}", branch);
    let parent = repo
        .find_reference(&refname)
        .unwrap()
        .peel_to_commit()
        .unwrap();

    let blob = repo.blob(content.as_bytes()).unwrap();
    let mut builder = repo.treebuilder(Some(&parent.tree().unwrap())).unwrap();
    builder.insert(path, blob, 0o100644).unwrap();
    let tree = repo.find_tree(builder.write().unwrap()).unwrap();

    let sig = Signature::now("Test User", "test@example.com").unwrap();
    repo.commit(
        Some(&refname),
        &sig,
        &sig,
        &format!("Update {}", path),
        &tree,
        &[&parent],
    )
    .unwrap();
}

async fn run_session(repo_path: &Path, bus: &TelemetryBus, steps: &[&str]) -> SessionOutcome {
    let config = BranchworkConfig::default();
    let work = CommandWork::new(steps.iter().map(|s| s.to_string()).collect())
        .with_ignored_dir(&config.workspace.records_dir);

    AgentSession::new(
        Agent::new("agent-1", BRANCH, AgentTask::new("Add price alerts")),
        Arc::new(work),
        git_workspace(repo_path, repo_path, &config),
        bus,
        Arc::new(TemplateEngine::for_repo(repo_path)),
        SessionSettings::from_config(&config),
    )
    .run()
    .await
}

#[tokio::test]
async fn test_session_commits_work_on_its_branch() {
    let dir = setup_repo();
    let bus = TelemetryBus::new();

    let outcome = run_session(
        dir.path(),
        &bus,
        &["mkdir -p lib && printf 'class Alerts {}\\n' > lib/alerts.dart"],
    )
    .await;

    let mr = outcome.merge_request().expect("session should complete");
    assert!(mr.ready_for_review);
    assert_eq!(mr.metrics.files_modified(), 1);
    assert_eq!(mr.metrics.commits_made(), 1);

    let repo = Repository::open(dir.path()).unwrap();
    let head = repo.head().unwrap();
    assert_eq!(head.shorthand(), Some(BRANCH));

    let commit = head.peel_to_commit().unwrap();
    assert_eq!(Some(commit.id().to_string()), mr.commit_id);
    assert_eq!(commit.summary(), Some("feat: Add price alerts"));
    assert_eq!(commit.author().name(), Some("Branchwork Agent"));

    let tree = commit.tree().unwrap();
    assert!(tree.get_path(Path::new("lib/alerts.dart")).is_ok());
    // Session records stay out of the commit
    assert!(tree.get_path(Path::new(".agent-workspace")).is_err());

    let records = dir.path().join(".agent-workspace").join("agent-1");
    assert!(records.join(SNAPSHOT_FILE).is_file());
    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(records.join(MERGE_REQUEST_FILE)).unwrap())
            .unwrap();
    assert_eq!(saved["readyForReview"], true);
    assert_eq!(saved["commitsMade"], 1);

    // develop is untouched
    let develop = repo
        .find_reference("refs/heads/develop")
        .unwrap()
        .peel_to_commit()
        .unwrap();
    assert_ne!(develop.id(), commit.id());
}

#[tokio::test]
async fn test_snapshot_uses_base_revision_before_work() {
    let dir = setup_repo();
    let base = Repository::open(dir.path())
        .unwrap()
        .head()
        .unwrap()
        .peel_to_commit()
        .unwrap()
        .id()
        .to_string();

    run_session(dir.path(), &TelemetryBus::new(), &["printf 'v2\\n' > pubspec.yaml"]).await;

    let snapshot: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join(".agent-workspace/agent-1").join(SNAPSHOT_FILE))
            .unwrap(),
    )
    .unwrap();
    assert_eq!(snapshot["baseRevision"], base.as_str());
    // Checksum of the pubspec as it was before the work ran
    assert_eq!(
        snapshot["fileChecksums"]["pubspec.yaml"].as_str().map(str::len),
        Some(64)
    );
    assert!(snapshot["fileChecksums"]["lib/main.dart"].is_null());
}

#[tokio::test]
async fn test_conflicting_target_blocks_review() {
    let dir = setup_repo();
    commit_on(dir.path(), "develop", "README.md", "# App\n\nDevelop notes\n");
    commit_on(dir.path(), BRANCH, "README.md", "# App\n\nAgent notes\n");
    let bus = TelemetryBus::new();
    let mut alerts = bus.subscribe(TOPIC_CONFLICT_ALERTS);

    let outcome = run_session(
        dir.path(),
        &bus,
        &["mkdir -p lib && printf 'class Alerts {}\\n' > lib/alerts.dart"],
    )
    .await;

    let mr = outcome.merge_request().expect("conflicts do not fail the session");
    assert!(!mr.ready_for_review);
    assert_eq!(mr.metrics.conflicts_resolved(), 0);
    assert!(mr.commit_id.is_some());

    let mut kinds = Vec::new();
    while let Ok(event) = alerts.try_recv() {
        if event.kind == EVENT_CONFLICT_DETECTED {
            assert_eq!(event.payload["conflictingFiles"][0], "README.md");
        }
        kinds.push(event.kind);
    }
    assert_eq!(kinds, vec![EVENT_CONFLICT_DETECTED, EVENT_CONFLICT_UNRESOLVED]);
}

#[tokio::test]
async fn test_failing_step_records_failure() {
    let dir = setup_repo();

    let outcome = run_session(dir.path(), &TelemetryBus::new(), &["exit 3"]).await;

    let report = outcome.failure().expect("failing step fails the session");
    assert_eq!(report.kind.as_str(), "CoreWorkError");
    assert!(dir
        .path()
        .join(".agent-workspace/agent-1/failure-report.json")
        .is_file());

    // Nothing was committed on the agent branch
    let repo = Repository::open(dir.path()).unwrap();
    let head = repo.head().unwrap().peel_to_commit().unwrap();
    assert_eq!(head.summary(), Some("Initial commit"));
}

#[tokio::test]
async fn test_branch_resubmitted_as_soon_as_it_is_free() {
    let dir = setup_repo();
    let config = BranchworkConfig::default();
    let provider = Arc::new(WorktreeProvider::new(dir.path(), config.clone()));
    let orchestrator = Orchestrator::new(provider, SessionSettings::from_config(&config), 2);

    for round in 0..5 {
        let first = orchestrator
            .submit(
                Some(format!("a-{}", round)),
                AgentTask::new("First pass"),
                BRANCH,
                Arc::new(CommandWork::new(vec!["true".to_string()])),
            )
            .unwrap();
        while orchestrator.registry().owner(BRANCH).is_some() {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }

        let second = orchestrator
            .submit(
                Some(format!("b-{}", round)),
                AgentTask::new("Second pass"),
                BRANCH,
                Arc::new(CommandWork::new(vec!["true".to_string()])),
            )
            .unwrap();
        orchestrator.result(&first).await.unwrap();
        let outcome = orchestrator.result(&second).await.unwrap();
        assert!(
            outcome.is_completed(),
            "round {}: {:?}",
            round,
            outcome.failure()
        );
    }
}
