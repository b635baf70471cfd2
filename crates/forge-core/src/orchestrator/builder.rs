//! Builder for creating and configuring Orchestrator instances.

use std::{path::Path, sync::Arc};

use log::debug;
use tokio::task;

use super::Orchestrator;
use crate::{
    analyzer::PlanStepAnalyzer,
    config::EngineConfig,
    error::{EngineError, Result},
    executor::{StepExecutor, WorkerTask},
    external::{CodeGenerator, CommandSandbox, ExecutionObserver, NoopObserver, VersionControl},
    pool::{HardwareProfile, ParallelExecutionPool, PoolSettings, TaskHandler, WorkerCommand},
    snapshot::SnapshotManager,
};

/// Builder for creating and configuring Orchestrator instances.
pub struct OrchestratorBuilder {
    config: EngineConfig,
    sandbox: Option<Arc<dyn CommandSandbox>>,
    generator: Option<Arc<dyn CodeGenerator>>,
    vcs: Option<Arc<dyn VersionControl>>,
    observer: Option<Arc<dyn ExecutionObserver>>,
    worker_command: Option<WorkerCommand>,
}

impl OrchestratorBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            sandbox: None,
            generator: None,
            vcs: None,
            observer: None,
            worker_command: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sandbox(mut self, sandbox: Arc<dyn CommandSandbox>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_version_control(mut self, vcs: Arc<dyn VersionControl>) -> Self {
        self.vcs = Some(vcs);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Command that starts one process-pool worker.
    ///
    /// Worker processes build their own executor from the configuration, so
    /// collaborators set with `with_sandbox`, `with_generator` or
    /// `with_version_control` only apply to steps run in this process.
    /// Without a worker command the pool uses threads.
    pub fn with_worker_command(mut self, command: WorkerCommand) -> Self {
        self.worker_command = Some(command);
        self
    }

    /// Sets a custom snapshot root.
    ///
    /// If not specified, uses XDG Base Directory specification:
    /// `$XDG_DATA_HOME/forge/snapshots` or `~/.local/share/forge/snapshots`
    pub fn with_snapshot_directory<P: AsRef<Path>>(mut self, directory: Option<P>) -> Self {
        if let Some(directory) = directory {
            self.config.snapshots.directory = Some(directory.as_ref().to_path_buf());
        }
        self
    }

    pub fn without_snapshots(mut self) -> Self {
        self.config.snapshots.enabled = false;
        self
    }

    /// Builds the configured orchestrator.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::XdgDirectory` if the default snapshot root cannot
    /// be created
    /// Returns `EngineError::Database` if the snapshot database cannot be
    /// opened
    pub async fn build(self) -> Result<Orchestrator> {
        let config = self.config;

        let mut executor = StepExecutor::from_config(&config);
        if let Some(sandbox) = self.sandbox {
            executor = executor.with_sandbox(sandbox);
        }
        if let Some(generator) = self.generator {
            executor = executor.with_generator(generator);
        }
        if let Some(vcs) = self.vcs {
            executor = executor.with_version_control(vcs);
        }

        let hardware = HardwareProfile::detect();
        let settings = PoolSettings::resolve(&config.pool, &hardware);
        debug!(
            "Pool: {} workers, recycled after {} tasks, {} strategy preferred",
            settings.workers,
            settings.recycle_after,
            settings.strategy.as_str()
        );
        let analyzer = PlanStepAnalyzer::new(settings.workers);

        let pool_executor = executor.clone();
        let handler: TaskHandler = Arc::new(move |task: &WorkerTask| pool_executor.execute(task));
        let pool = ParallelExecutionPool::new(settings, handler, self.worker_command);

        let snapshots = if config.snapshots.enabled {
            let snapshot_config = config.snapshots.clone();
            let manager = task::spawn_blocking(move || SnapshotManager::from_config(&snapshot_config))
                .await
                .map_err(|e| EngineError::Configuration {
                    message: format!("Task join error: {e}"),
                })??;
            Some(manager)
        } else {
            None
        };

        let observer = self.observer.unwrap_or_else(|| Arc::new(NoopObserver));
        Ok(Orchestrator::new(
            config, analyzer, executor, pool, snapshots, observer,
        ))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
