//! Run reports and progress snapshots.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{ExecutionGroup, RunStatus, StepResult};

/// Final outcome of one orchestrated run.
///
/// Always carries whatever results were produced, even when the run did not
/// complete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub status: RunStatus,

    pub project_path: PathBuf,

    /// Results in original step order
    pub results: Vec<StepResult>,

    pub groups: Vec<ExecutionGroup>,

    /// Index of the step that aborted the run, when `status` is `Failed`
    pub failed_step: Option<usize>,

    pub error: Option<String>,

    /// Snapshot taken before the run, if the target already existed
    pub snapshot_id: Option<String>,

    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }
}

/// Point-in-time view of a run, safe to poll from another task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Progress {
    pub status: RunStatus,

    /// Index of the group being executed, or the number of groups finished
    pub current_group: usize,

    pub total_groups: usize,

    pub completed_steps: usize,

    pub total_steps: usize,

    pub elapsed_ms: u64,
}

impl Progress {
    /// Share of finished steps, 0.0 to 100.0.
    pub fn percent(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        self.completed_steps as f64 / self.total_steps as f64 * 100.0
    }
}
