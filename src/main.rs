use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use branchwork::batch::{parse_task_arg, BatchFile};
use branchwork::config::PartialOrchestratorConfig;
use branchwork::orchestrator::{git_workspace, SharedWorkspace, WorkspaceProvider, WorktreeProvider};
use branchwork::shutdown::{spawn_ctrl_c_listener, ShutdownState};
use branchwork::templates::TemplateEngine;
use branchwork::work::CommandWork;
use branchwork::{
    BranchworkConfig, ConfigManager, Orchestrator, PartialConfig, SessionOutcome,
    SessionSettings, TelemetryBus,
};

/// Branchwork - run agent tasks on isolated branches
#[derive(Parser, Debug)]
#[command(name = "branchwork")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Repository to work in
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,

    /// Project config file (default: <repo>/.branchwork/config.yaml)
    #[arg(long, global = true, env = "BRANCHWORK_CONFIG")]
    config: Option<PathBuf>,

    /// Branch merge requests target
    #[arg(long, global = true)]
    target_branch: Option<String>,

    /// Sessions allowed to run at once
    #[arg(long, global = true)]
    max_concurrency: Option<usize>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one session in the repository itself
    Run {
        /// Agent id (generated when omitted)
        #[arg(long)]
        agent_id: Option<String>,

        /// Branch the session owns
        #[arg(long)]
        branch: String,

        /// Task file, inline YAML/JSON task, or a bare title
        #[arg(long)]
        task: String,

        /// Shell step run as core work; repeat for more steps
        #[arg(long = "step")]
        steps: Vec<String>,
    },

    /// Run every task of a batch file through the orchestrator
    Batch {
        /// YAML file with a `tasks` list
        #[arg(long)]
        tasks: PathBuf,
    },

    /// Print the effective configuration
    Config {
        /// Write the defaults to the project config file if it is missing
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

/// Returns whether every session completed
async fn run(cli: Cli) -> Result<bool> {
    let repo = cli
        .repo
        .canonicalize()
        .with_context(|| format!("Repository path {:?} does not exist", cli.repo))?;

    let mut manager = ConfigManager::new(&repo);
    if let Some(path) = &cli.config {
        manager = manager.with_config_path(path);
    }
    let overrides = PartialConfig {
        orchestrator: Some(PartialOrchestratorConfig {
            target_branch: cli.target_branch.clone(),
            max_concurrency: cli.max_concurrency,
            ..Default::default()
        }),
        ..Default::default()
    };
    let config = manager
        .load(Some(overrides))
        .context("Failed to load configuration")?;

    match cli.command {
        Command::Config { init } => {
            if init && !manager.exists() {
                manager.initialize().context("Failed to write configuration")?;
                log::info!("Wrote default configuration to {:?}", manager.path());
            }
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(true)
        }
        Command::Run {
            agent_id,
            branch,
            task,
            steps,
        } => {
            let task = parse_task_arg(&task)?;
            let provider = Arc::new(SharedWorkspace::new(git_workspace(&repo, &repo, &config)));
            let orchestrator = build_orchestrator(&repo, &config, provider, 1);
            let work = CommandWork::new(steps).with_ignored_dir(&config.workspace.records_dir);

            orchestrator.submit(agent_id, task, &branch, Arc::new(work))?;
            report(orchestrator.wait_all().await, 0)
        }
        Command::Batch { tasks } => {
            let batch = BatchFile::load(&tasks)?;

            let (provider, max_concurrency): (Arc<dyn WorkspaceProvider>, usize) =
                if config.orchestrator.isolate_worktrees {
                    (
                        Arc::new(WorktreeProvider::new(&repo, config.clone())),
                        config.orchestrator.max_concurrency,
                    )
                } else {
                    if config.orchestrator.max_concurrency > 1 {
                        log::warn!("Worktree isolation is off; running sessions one at a time");
                    }
                    (
                        Arc::new(SharedWorkspace::new(git_workspace(&repo, &repo, &config))),
                        1,
                    )
                };
            let orchestrator = build_orchestrator(&repo, &config, provider, max_concurrency);

            let mut rejected = 0;
            for entry in batch.tasks {
                let work = CommandWork::new(entry.steps)
                    .with_ignored_dir(&config.workspace.records_dir);
                if let Err(e) =
                    orchestrator.submit(entry.agent_id, entry.task, &entry.branch, Arc::new(work))
                {
                    log::error!("Rejected task on branch {}: {}", entry.branch, e);
                    rejected += 1;
                }
            }

            report(orchestrator.wait_all().await, rejected)
        }
    }
}

fn build_orchestrator(
    repo: &std::path::Path,
    config: &BranchworkConfig,
    provider: Arc<dyn WorkspaceProvider>,
    max_concurrency: usize,
) -> Arc<Orchestrator> {
    let bus = TelemetryBus::new();
    spawn_event_logger(&bus);

    let shutdown = ShutdownState::new();
    let orchestrator = Arc::new(
        Orchestrator::new(provider, SessionSettings::from_config(config), max_concurrency)
            .with_bus(bus)
            .with_templates(TemplateEngine::for_repo(repo))
            .with_shutdown(shutdown.clone()),
    );

    let on_ctrl_c = Arc::clone(&orchestrator);
    spawn_ctrl_c_listener(shutdown, move || on_ctrl_c.shutdown());

    orchestrator
}

fn spawn_event_logger(bus: &TelemetryBus) {
    let mut events = bus.subscribe_all();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log::debug!(
                    "[{}] {} {} {}",
                    event.topic,
                    event.agent_id,
                    event.kind,
                    event.payload
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!("Event logger missed {} events", missed)
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Print every outcome as JSON; returns whether all tasks completed
fn report(outcomes: Vec<SessionOutcome>, rejected: usize) -> Result<bool> {
    println!("{}", serde_json::to_string_pretty(&outcomes)?);

    let failed = outcomes.iter().filter(|o| !o.is_completed()).count();
    log::info!(
        "{} sessions finished, {} completed, {} failed, {} rejected",
        outcomes.len(),
        outcomes.len() - failed,
        failed,
        rejected
    );
    Ok(failed == 0 && rejected == 0)
}
