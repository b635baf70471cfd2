//! Group-by-group execution of a plan.
//!
//! ```text
//! Idle ─▶ Running ◀─▶ Paused
//!            │           │
//!            ▼           ▼
//!   Completed | Failed | Stopped | TimedOut
//! ```
//!
//! The control loop checks the wall-clock budget, pause and stop requests
//! only between groups. Singleton groups run on a blocking task through the
//! [`StepExecutor`]; larger groups go to the [`ParallelExecutionPool`].

pub mod builder;
pub mod state;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::task;

pub use builder::OrchestratorBuilder;
pub use state::RunController;

use crate::{
    analyzer::{AnalysisStats, PlanStepAnalyzer},
    config::EngineConfig,
    corrector::CorrectionStats,
    error::{EngineError, Result},
    executor::{StepExecutor, WorkerTask},
    external::ExecutionObserver,
    models::{ExecutionGroup, Plan, Progress, RunReport, RunStatus, Snapshot, StepResult},
    pool::{ParallelExecutionPool, PoolStats},
    snapshot::SnapshotManager,
};

/// Runs plans against a target directory.
pub struct Orchestrator {
    config: EngineConfig,
    analyzer: PlanStepAnalyzer,
    executor: StepExecutor,
    pool: Arc<Mutex<ParallelExecutionPool>>,
    snapshots: Option<Arc<Mutex<SnapshotManager>>>,
    observer: Arc<dyn ExecutionObserver>,
    controller: RunController,
}

/// How the control loop left the group sequence.
enum Exit {
    Completed,
    Stopped,
    TimedOut { error: String },
    Failed { step: Option<usize>, error: String },
}

impl Orchestrator {
    pub(crate) fn new(
        config: EngineConfig,
        analyzer: PlanStepAnalyzer,
        executor: StepExecutor,
        pool: ParallelExecutionPool,
        snapshots: Option<SnapshotManager>,
        observer: Arc<dyn ExecutionObserver>,
    ) -> Self {
        Self {
            config,
            analyzer,
            executor,
            pool: Arc::new(Mutex::new(pool)),
            snapshots: snapshots.map(|manager| Arc::new(Mutex::new(manager))),
            observer,
            controller: RunController::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle for controlling runs from another task.
    pub fn controller(&self) -> RunController {
        self.controller.clone()
    }

    pub fn pause(&self) -> bool {
        self.controller.pause()
    }

    pub fn resume(&self) -> bool {
        self.controller.resume()
    }

    pub fn stop(&self) -> bool {
        self.controller.stop()
    }

    pub fn progress(&self) -> Progress {
        self.controller.progress()
    }

    pub fn analyze(&self, plan: &Plan) -> AnalysisStats {
        self.analyzer.stats(&plan.steps)
    }

    pub fn correction_stats(&self) -> CorrectionStats {
        self.executor.corrector().stats()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.lock().stats()
    }

    pub fn snapshots_enabled(&self) -> bool {
        self.snapshots.is_some()
    }

    /// Executes `plan` inside `target`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::RunInProgress` if this orchestrator is already
    /// running a plan. Every other failure is reported in the returned
    /// [`RunReport`].
    pub async fn start(&self, plan: &Plan, target: impl AsRef<Path>) -> Result<RunReport> {
        let project_path = target.as_ref().to_path_buf();
        self.controller.begin(plan.len())?;
        info!(
            "Starting plan '{}' ({} steps) in {}",
            plan.project_name,
            plan.len(),
            project_path.display()
        );

        let mut report = RunReport {
            status: RunStatus::Running,
            project_path,
            results: Vec::with_capacity(plan.len()),
            groups: Vec::new(),
            failed_step: None,
            error: None,
            snapshot_id: None,
            elapsed_ms: 0,
        };

        let exit = self.run(plan, &mut report).await;
        report.status = match exit {
            Exit::Completed => RunStatus::Completed,
            Exit::Stopped => RunStatus::Stopped,
            Exit::TimedOut { error } => {
                report.error = Some(error);
                RunStatus::TimedOut
            }
            Exit::Failed { step, error } => {
                report.failed_step = step;
                report.error = Some(error);
                RunStatus::Failed
            }
        };
        report.elapsed_ms = self.controller.finish(report.status).as_millis() as u64;
        Ok(report)
    }

    async fn run(&self, plan: &Plan, report: &mut RunReport) -> Exit {
        let limits = &self.config.limits;
        if plan.len() > limits.max_steps {
            let error = format!(
                "Plan has {} steps, more than the limit of {}",
                plan.len(),
                limits.max_steps
            );
            warn!("{error}");
            self.observer.on_error(None, &error);
            return Exit::Failed { step: None, error };
        }

        report.snapshot_id = self.take_snapshot(&report.project_path, plan).await;

        let groups = self.analyzer.analyze(&plan.steps);
        let stats = self.analyzer.stats(&plan.steps);
        info!(
            "{} steps in {} groups ({} parallel, up to {} at once, ~{}% saved)",
            stats.total_steps,
            stats.total_groups,
            stats.parallel_groups,
            stats.max_parallel_batch,
            stats.estimated_time_saving_percent
        );
        self.controller.set_groups(groups.len());
        report.groups = groups.clone();

        let budget = Duration::from_secs(limits.max_duration_secs);
        let context = plan.generation_context();

        for (position, group) in groups.iter().enumerate() {
            if !self.wait_while_paused().await {
                info!("Run stopped before group {}", position + 1);
                return Exit::Stopped;
            }
            // Time spent paused counts against the budget
            if self.controller.elapsed() > budget {
                let error = format!("Run exceeded its budget of {}s", budget.as_secs());
                warn!("{error}");
                self.observer.on_error(None, &error);
                return Exit::TimedOut { error };
            }

            self.controller.enter_group(position);
            debug!(
                "Group {}/{}: steps {:?}",
                position + 1,
                groups.len(),
                group.indices
            );

            let tasks: Vec<WorkerTask> = group
                .indices
                .iter()
                .map(|&i| WorkerTask::new(plan.steps[i].clone(), &report.project_path, context.clone()))
                .collect();
            for task in &tasks {
                self.observer.on_step_start(&task.step);
            }

            let mut results = match self.execute_group(group, tasks).await {
                Ok(results) => results,
                Err(e) => {
                    let error = e.to_string();
                    error!("Group {} could not be executed: {error}", position + 1);
                    self.observer.on_error(group.indices.first().copied(), &error);
                    return Exit::Failed {
                        step: group.indices.first().copied(),
                        error,
                    };
                }
            };
            results.sort_by_key(|r| r.step_index);

            for result in results {
                self.observer.on_step_complete(&result);
                let fatal = result.is_fatal();
                let failure = (!result.success).then(|| {
                    (
                        result.step_index,
                        result.error.clone().unwrap_or_else(|| "Step failed".to_string()),
                    )
                });
                report.results.push(result);
                self.controller.step_completed();

                if let Some((index, error)) = failure {
                    self.observer.on_error(Some(index), &error);
                    if fatal {
                        error!("Step {index} failed fatally: {error}");
                        return Exit::Failed {
                            step: Some(index),
                            error,
                        };
                    }
                    warn!("Step {index} failed, continuing: {error}");
                }
            }

            if limits.group_delay_ms > 0 && position + 1 < groups.len() {
                tokio::time::sleep(Duration::from_millis(limits.group_delay_ms)).await;
            }
        }

        Exit::Completed
    }

    /// Blocks while paused. Returns false once a stop has been requested.
    async fn wait_while_paused(&self) -> bool {
        let poll = Duration::from_millis(self.config.limits.pause_poll_ms.max(1));
        loop {
            match self.controller.status() {
                RunStatus::Stopped => return false,
                RunStatus::Paused => {
                    self.observer.on_pause(&self.controller.progress());
                    tokio::time::sleep(poll).await;
                }
                _ => return true,
            }
        }
    }

    async fn execute_group(
        &self,
        group: &ExecutionGroup,
        tasks: Vec<WorkerTask>,
    ) -> Result<Vec<StepResult>> {
        if group.is_parallel() {
            let pool = Arc::clone(&self.pool);
            task::spawn_blocking(move || pool.lock().execute_batch(&tasks))
                .await
                .map_err(EngineError::join)
        } else {
            let executor = self.executor.clone();
            task::spawn_blocking(move || tasks.iter().map(|t| executor.execute(t)).collect::<Vec<_>>())
                .await
                .map_err(EngineError::join)
        }
    }

    /// Best-effort snapshot of the target before anything touches it.
    async fn take_snapshot(&self, path: &Path, plan: &Plan) -> Option<String> {
        let manager = Arc::clone(self.snapshots.as_ref()?);
        let path: PathBuf = path.to_path_buf();
        let label = format!("before {}", plan.project_name);

        let outcome = task::spawn_blocking(move || manager.lock().create(&path, Some(&label)))
            .await
            .map_err(EngineError::join);
        match outcome {
            Ok(Ok(snapshot)) => Some(snapshot.id),
            Ok(Err(EngineError::SourceMissing { path })) => {
                debug!("No snapshot taken, {} does not exist yet", path.display());
                None
            }
            Ok(Err(e)) | Err(e) => {
                warn!("Snapshot before run failed: {e}");
                None
            }
        }
    }

    /// Restores a snapshot; the latest one when `id` is `None`.
    pub async fn restore_snapshot(&self, id: Option<&str>) -> Result<Snapshot> {
        let manager = self.snapshot_manager()?;
        let id = id.map(String::from);
        task::spawn_blocking(move || manager.lock().restore(id.as_deref()))
            .await
            .map_err(EngineError::join)?
    }

    pub async fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        let manager = self.snapshot_manager()?;
        task::spawn_blocking(move || manager.lock().list())
            .await
            .map_err(EngineError::join)?
    }

    fn snapshot_manager(&self) -> Result<Arc<Mutex<SnapshotManager>>> {
        self.snapshots
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| EngineError::configuration("Snapshots are disabled"))
    }

    /// Stops pool workers. The next parallel group starts a fresh pool.
    pub async fn shutdown(&self) -> Result<()> {
        let pool = Arc::clone(&self.pool);
        task::spawn_blocking(move || pool.lock().shutdown())
            .await
            .map_err(EngineError::join)
    }
}
