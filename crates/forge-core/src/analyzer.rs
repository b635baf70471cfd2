//! Partitioning of a plan into execution groups.
//!
//! Only file writes whose paths are pairwise disjoint share a group. Every
//! other action mutates state shared by the whole process (working
//! directory, repository index, installed packages) and always runs alone.

use std::{
    collections::HashSet,
    path::{Component, Path, PathBuf},
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::models::{Action, ExecutionGroup, Step};

/// Splits ordered steps into ordered execution groups.
#[derive(Debug, Clone)]
pub struct PlanStepAnalyzer {
    workers_available: usize,
}

/// Parallelisation summary of one plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisStats {
    pub total_steps: usize,
    pub total_groups: usize,
    pub parallel_groups: usize,
    pub steps_parallelizable: usize,
    pub steps_sequential: usize,
    pub max_parallel_batch: usize,
    /// `(steps - groups) / steps * 100`, one decimal
    pub estimated_time_saving_percent: f64,
    pub workers_available: usize,
}

impl PlanStepAnalyzer {
    pub fn new(workers_available: usize) -> Self {
        Self { workers_available }
    }

    /// Groups `steps` in a single pass.
    ///
    /// Flattening the returned groups yields every position of `steps`
    /// exactly once, in order.
    pub fn analyze(&self, steps: &[Step]) -> Vec<ExecutionGroup> {
        let mut groups = Vec::new();
        let mut open: Vec<usize> = Vec::new();
        let mut claimed: HashSet<PathBuf> = HashSet::new();

        for (position, step) in steps.iter().enumerate() {
            match &step.action {
                Action::CreateFile { file_path, .. } => {
                    let path = normalize(file_path);
                    if claimed.iter().any(|other| overlaps(other, &path)) {
                        debug!(
                            "Step {position} writes '{file_path}', overlapping an earlier write in the group"
                        );
                        flush(&mut groups, &mut open, &mut claimed);
                    }
                    open.push(position);
                    claimed.insert(path);
                }
                _ => {
                    flush(&mut groups, &mut open, &mut claimed);
                    groups.push(ExecutionGroup::singleton(position));
                }
            }
        }
        flush(&mut groups, &mut open, &mut claimed);

        groups
    }

    /// Summarises how much of the plan can run concurrently.
    pub fn stats(&self, steps: &[Step]) -> AnalysisStats {
        let groups = self.analyze(steps);
        let total_steps = steps.len();
        let parallel: Vec<&ExecutionGroup> = groups.iter().filter(|g| g.is_parallel()).collect();
        let steps_parallelizable: usize = parallel.iter().map(|g| g.len()).sum();

        let saving = if total_steps == 0 {
            0.0
        } else {
            let raw = (total_steps - groups.len()) as f64 / total_steps as f64 * 100.0;
            (raw * 10.0).round() / 10.0
        };

        AnalysisStats {
            total_steps,
            total_groups: groups.len(),
            parallel_groups: parallel.len(),
            steps_parallelizable,
            steps_sequential: total_steps - steps_parallelizable,
            max_parallel_batch: parallel.iter().map(|g| g.len()).max().unwrap_or(0),
            estimated_time_saving_percent: saving,
            workers_available: self.workers_available,
        }
    }
}

fn flush(groups: &mut Vec<ExecutionGroup>, open: &mut Vec<usize>, claimed: &mut HashSet<PathBuf>) {
    if !open.is_empty() {
        groups.push(ExecutionGroup {
            indices: std::mem::take(open),
        });
    }
    claimed.clear();
}

fn normalize(path: &str) -> PathBuf {
    Path::new(path)
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// True when one path equals or contains the other.
fn overlaps(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}
