//! Parallel execution of independent steps.
//!
//! [`ParallelExecutionPool`] runs a batch of [`WorkerTask`]s and returns
//! their results in input order. The work itself is done by an
//! [`ExecutionStrategy`]:
//!
//! - [`ProcessStrategy`]: long-lived worker processes (default)
//! - [`ThreadStrategy`]: OS threads in this process
//!
//! The pool is created lazily on the first batch that needs it, reused across
//! batches, and recycled once it has run a configured number of tasks. A
//! serialization-class failure of the process strategy switches the pool to
//! threads for good and retries the batch once.

pub mod hardware;
pub mod process;
pub mod thread;

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use hardware::HardwareProfile;
pub use process::{ProcessStrategy, WorkerCommand};
pub use thread::ThreadStrategy;

use crate::{
    config::{PoolConfig, StrategyKind},
    executor::{can_continue_after, panic_message, WorkerTask},
    models::StepResult,
};

/// Runs one task in whatever context calls it.
pub type TaskHandler = Arc<dyn Fn(&WorkerTask) -> StepResult + Send + Sync>;

/// Infrastructure failures of a strategy, as opposed to task failures.
#[derive(Error, Debug)]
pub enum PoolError {
    /// A task could not be encoded for a worker
    #[error("Task serialization failed: {message}")]
    Serialization { message: String },
    /// No worker could be started or reached
    #[error("Worker unavailable: {message}")]
    WorkerUnavailable { message: String },
    /// A worker broke the line protocol
    #[error("Worker protocol error: {message}")]
    WorkerProtocol { message: String },
}

impl PoolError {
    /// Errors that mean the process strategy cannot carry tasks at all.
    pub fn is_serialization_class(&self) -> bool {
        matches!(
            self,
            PoolError::Serialization { .. } | PoolError::WorkerUnavailable { .. }
        )
    }
}

/// A way of running a batch of tasks concurrently.
pub trait ExecutionStrategy: Send {
    fn kind(&self) -> StrategyKind;

    /// Whether workers are currently running.
    fn is_started(&self) -> bool;

    /// Runs every task, starting workers if needed. Results are in input
    /// order; a task that fails on its own yields a failed result, not `Err`.
    fn run_batch(&mut self, tasks: &[WorkerTask]) -> Result<Vec<StepResult>, PoolError>;

    fn shutdown(&mut self);
}

/// Failed result for a task that never produced one of its own.
pub(crate) fn failed_result(task: &WorkerTask, message: &str) -> StepResult {
    let kind = task.step.kind();
    StepResult::failure(task.step.index, kind, message, can_continue_after(kind))
}

/// Resolved pool sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub workers: usize,
    pub recycle_after: usize,
    pub min_batch_size: usize,
    pub strategy: StrategyKind,
}

impl PoolSettings {
    /// Explicit config values win over detected ones.
    pub fn resolve(config: &PoolConfig, hardware: &HardwareProfile) -> Self {
        Self {
            workers: config.workers.unwrap_or(hardware.workers).max(1),
            recycle_after: config.recycle_after.unwrap_or(hardware.recycle_after).max(1),
            min_batch_size: config.min_batch_size.max(1),
            strategy: config.strategy,
        }
    }
}

/// Counters describing pool activity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolStats {
    pub strategy: StrategyKind,
    pub workers: usize,
    /// Batches run through the pool
    pub batches: usize,
    /// Batches small enough to run inline
    pub sequential_batches: usize,
    pub tasks_executed: usize,
    pub pools_created: usize,
    pub recycles: usize,
    pub fallbacks: usize,
}

/// Recyclable worker pool with a thread fallback.
pub struct ParallelExecutionPool {
    settings: PoolSettings,
    handler: TaskHandler,
    worker_command: Option<WorkerCommand>,
    active: StrategyKind,
    strategy: Option<Box<dyn ExecutionStrategy>>,
    tasks_since_created: usize,
    stats: PoolStats,
}

impl ParallelExecutionPool {
    /// Creates a pool; no workers start until a batch needs them.
    ///
    /// The process strategy needs `worker_command`; without one the pool
    /// uses threads.
    pub fn new(
        settings: PoolSettings,
        handler: TaskHandler,
        worker_command: Option<WorkerCommand>,
    ) -> Self {
        let active = match (settings.strategy, &worker_command) {
            (StrategyKind::Process, Some(_)) => StrategyKind::Process,
            _ => StrategyKind::Thread,
        };
        if active != settings.strategy {
            debug!("No worker command configured, using the thread strategy");
        }

        Self {
            stats: PoolStats {
                strategy: active,
                workers: settings.workers,
                ..Default::default()
            },
            settings,
            handler,
            worker_command,
            active,
            strategy: None,
            tasks_since_created: 0,
        }
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.active
    }

    /// Whether workers are currently allocated.
    pub fn is_started(&self) -> bool {
        self.strategy.as_ref().is_some_and(|s| s.is_started())
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.clone()
    }

    /// Runs a batch and returns one result per task, in input order.
    pub fn execute_batch(&mut self, tasks: &[WorkerTask]) -> Vec<StepResult> {
        if tasks.is_empty() {
            return Vec::new();
        }

        if tasks.len() < self.settings.min_batch_size {
            self.stats.sequential_batches += 1;
            self.stats.tasks_executed += tasks.len();
            return tasks.iter().map(|task| self.run_inline(task)).collect();
        }

        let results = match self.run_on_pool(tasks) {
            Ok(results) => results,
            Err(e) if e.is_serialization_class() && self.active == StrategyKind::Process => {
                warn!("Process pool failed ({e}), falling back to threads");
                self.discard();
                self.active = StrategyKind::Thread;
                self.stats.strategy = StrategyKind::Thread;
                self.stats.fallbacks += 1;

                self.run_on_pool(tasks).unwrap_or_else(|e| {
                    warn!("Thread pool failed too: {e}");
                    self.discard();
                    fail_all(tasks, &e)
                })
            }
            Err(e) => {
                warn!("Pool batch failed: {e}");
                self.discard();
                fail_all(tasks, &e)
            }
        };

        self.stats.batches += 1;
        self.stats.tasks_executed += tasks.len();
        self.tasks_since_created += tasks.len();

        if self.strategy.is_some() && self.tasks_since_created >= self.settings.recycle_after {
            info!(
                "Recycling {} pool after {} tasks",
                self.active.as_str(),
                self.tasks_since_created
            );
            self.discard();
            self.stats.recycles += 1;
        }

        results
    }

    /// Stops all workers. The next parallel batch starts a fresh pool.
    pub fn shutdown(&mut self) {
        self.discard();
    }

    fn run_inline(&self, task: &WorkerTask) -> StepResult {
        catch_unwind(AssertUnwindSafe(|| (self.handler)(task))).unwrap_or_else(|panic| {
            failed_result(task, &format!("Step panicked: {}", panic_message(panic.as_ref())))
        })
    }

    fn run_on_pool(&mut self, tasks: &[WorkerTask]) -> Result<Vec<StepResult>, PoolError> {
        if self.strategy.is_none() {
            self.strategy = Some(self.create_strategy());
            self.tasks_since_created = 0;
            self.stats.pools_created += 1;
        }

        match self.strategy.as_mut() {
            Some(strategy) => strategy.run_batch(tasks),
            None => Err(PoolError::WorkerUnavailable {
                message: "Pool was not created".to_string(),
            }),
        }
    }

    fn create_strategy(&self) -> Box<dyn ExecutionStrategy> {
        debug!(
            "Creating {} pool with {} workers",
            self.active.as_str(),
            self.settings.workers
        );
        match (self.active, &self.worker_command) {
            (StrategyKind::Process, Some(command)) => {
                Box::new(ProcessStrategy::new(self.settings.workers, command.clone()))
            }
            _ => Box::new(ThreadStrategy::new(
                self.settings.workers,
                Arc::clone(&self.handler),
            )),
        }
    }

    fn discard(&mut self) {
        if let Some(mut strategy) = self.strategy.take() {
            strategy.shutdown();
        }
        self.tasks_since_created = 0;
    }
}

impl Drop for ParallelExecutionPool {
    fn drop(&mut self) {
        self.discard();
    }
}

fn fail_all(tasks: &[WorkerTask], error: &PoolError) -> Vec<StepResult> {
    tasks
        .iter()
        .map(|task| failed_result(task, &error.to_string()))
        .collect()
}
