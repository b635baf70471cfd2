//! Command handlers for the forge CLI.
//!
//! Each handler turns parsed arguments into engine calls and renders the
//! result: markdown through [`TerminalRenderer`], or JSON when asked.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use forge_core::{
    config::{EngineConfig, StrategyKind},
    display::{AnalysisSummary, OperationStatus, Snapshots},
    executor::worker,
    pool::{HardwareProfile, PoolSettings},
    Agent, OrchestratorBuilder, Plan, PlanStepAnalyzer, RunStatus, SnapshotManager, StepExecutor,
    WorkerCommand,
};
use log::{info, warn};

use crate::{
    args::{AnalyzeArgs, RunArgs, SnapshotCommands, WorkerArgs},
    renderer::TerminalRenderer,
};

/// Loads the config file if one is given, then applies `FORGE_*` overrides.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config
        .apply_env()
        .context("Invalid FORGE_* environment variable")?;
    Ok(config)
}

fn read_plan(path: &Path) -> Result<Plan> {
    Plan::from_file(path).with_context(|| format!("Failed to read plan {}", path.display()))
}

pub struct Cli {
    config: EngineConfig,
    config_path: Option<PathBuf>,
    snapshot_dir: Option<PathBuf>,
    renderer: TerminalRenderer,
}

impl Cli {
    pub fn new(
        config: EngineConfig,
        config_path: Option<PathBuf>,
        snapshot_dir: Option<PathBuf>,
        renderer: TerminalRenderer,
    ) -> Self {
        Self {
            config,
            config_path,
            snapshot_dir,
            renderer,
        }
    }

    pub async fn run_plan(&self, args: RunArgs) -> Result<()> {
        let plan = read_plan(&args.plan)?;

        let mut config = self.config.clone();
        if let Some(minutes) = args.timeout_minutes {
            config.limits.max_duration_secs = minutes * 60;
        }
        if args.threads {
            config.pool.strategy = StrategyKind::Thread;
        }
        if !args.generator.is_empty() {
            config.generator.command = Some(args.generator.clone());
        }

        let mut builder = OrchestratorBuilder::new()
            .with_config(config)
            .with_snapshot_directory(self.snapshot_dir.as_ref())
            .with_worker_command(self.worker_command(&args.generator)?);
        if args.no_snapshot {
            builder = builder.without_snapshots();
        }
        let orchestrator = builder
            .build()
            .await
            .context("Failed to initialize orchestrator")?;

        let workspace = std::env::current_dir().context("Failed to read current directory")?;
        let agent = Agent::new(orchestrator, workspace);

        let controller = agent.controller();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current group");
                controller.stop();
            }
        });

        let report = match &args.target {
            Some(target) => agent.orchestrator().start(&plan, target).await,
            None => agent.execute_plan(&plan).await,
        }
        .context("Failed to start run")?;
        agent
            .orchestrator()
            .shutdown()
            .await
            .context("Failed to stop workers")?;

        if args.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            self.renderer.render(&report.to_string())?;
        }

        if report.status != RunStatus::Completed {
            bail!("Run ended with status {}", report.status);
        }
        Ok(())
    }

    /// This binary re-invoked as a pool worker with the same configuration.
    fn worker_command(&self, generator: &[String]) -> Result<WorkerCommand> {
        let program = std::env::current_exe().context("Failed to locate forge executable")?;
        let mut args = Vec::new();
        if let Some(path) = &self.config_path {
            args.push("--config".to_string());
            args.push(path.to_string_lossy().into_owned());
        }
        args.push("worker".to_string());
        for arg in generator {
            args.push("--generator".to_string());
            args.push(arg.clone());
        }
        Ok(WorkerCommand::new(program, args))
    }

    pub fn analyze(&self, args: AnalyzeArgs) -> Result<()> {
        let plan = read_plan(&args.plan)?;
        let settings = PoolSettings::resolve(&self.config.pool, &HardwareProfile::detect());
        let summary = AnalysisSummary::new(&plan, &PlanStepAnalyzer::new(settings.workers));

        if args.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            self.renderer.render(&summary.to_string())?;
        }
        Ok(())
    }

    pub async fn handle_snapshot_command(&self, command: SnapshotCommands) -> Result<()> {
        let mut snapshot_config = self.config.snapshots.clone();
        if let Some(dir) = &self.snapshot_dir {
            snapshot_config.directory = Some(dir.clone());
        }

        let output = tokio::task::spawn_blocking(move || -> Result<String> {
            let mut manager = SnapshotManager::from_config(&snapshot_config)
                .context("Failed to open snapshot store")?;
            snapshot_output(&mut manager, command)
        })
        .await
        .context("Snapshot task failed")??;

        self.renderer.render(&output)
    }

    /// Serves pool tasks on stdin/stdout until the parent closes the pipe.
    pub async fn run_worker(&self, args: WorkerArgs) -> Result<()> {
        let mut config = self.config.clone();
        if !args.generator.is_empty() {
            config.generator.command = Some(args.generator);
        }
        let executor = StepExecutor::from_config(&config);

        let handled = tokio::task::spawn_blocking(move || {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            worker::serve(&executor, stdin.lock(), stdout.lock())
        })
        .await
        .context("Worker task failed")?
        .context("Worker protocol failed")?;

        info!("Worker exiting after {handled} tasks");
        Ok(())
    }
}

fn snapshot_output(manager: &mut SnapshotManager, command: SnapshotCommands) -> Result<String> {
    let output = match command {
        SnapshotCommands::List => Snapshots(manager.list()?).to_string(),
        SnapshotCommands::Create { path, label } => {
            let snapshot = manager
                .create(&path, label.as_deref())
                .with_context(|| format!("Failed to snapshot {}", path.display()))?;
            format!(
                "{}\n{snapshot}",
                OperationStatus::success(format!("Created snapshot {}", snapshot.id))
            )
        }
        SnapshotCommands::Restore { id } => {
            let snapshot = manager
                .restore(id.as_deref())
                .context("Failed to restore snapshot")?;
            OperationStatus::success(format!(
                "Restored {} from snapshot {}",
                snapshot.source_path.display(),
                snapshot.id
            ))
            .to_string()
        }
        SnapshotCommands::Delete { id } => {
            manager
                .delete(&id)
                .with_context(|| format!("Failed to delete snapshot {id}"))?;
            OperationStatus::success(format!("Deleted snapshot {id}")).to_string()
        }
        SnapshotCommands::Usage => manager.usage()?.to_string(),
        SnapshotCommands::Clear => {
            let count = manager.clear()?;
            OperationStatus::success(format!("Deleted {count} snapshots")).to_string()
        }
    };
    Ok(output)
}
