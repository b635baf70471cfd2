//! Collection and summary wrappers.

use std::{fmt, ops::Index};

use serde::Serialize;

use crate::{
    analyzer::{AnalysisStats, PlanStepAnalyzer},
    models::{Action, ExecutionGroup, Plan, Snapshot, Step},
};

/// Newtype wrapper for displaying a list of snapshots.
///
/// # Examples
///
/// ```rust
/// use forge_core::display::Snapshots;
///
/// let empty = Snapshots(Vec::new());
/// assert_eq!(empty.to_string(), "No snapshots found.\n");
/// ```
pub struct Snapshots(pub Vec<Snapshot>);

impl Snapshots {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.0.iter()
    }
}

impl Index<usize> for Snapshots {
    type Output = Snapshot;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl fmt::Display for Snapshots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No snapshots found.");
        }
        // Newest first
        for snapshot in self.0.iter().rev() {
            write!(f, "{snapshot}")?;
        }
        Ok(())
    }
}

/// Grouping of a plan together with its parallelisation statistics.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub project_name: String,
    pub stats: AnalysisStats,
    pub groups: Vec<ExecutionGroup>,
    /// One line per step, indexed like the plan
    #[serde(skip)]
    labels: Vec<String>,
}

impl AnalysisSummary {
    pub fn new(plan: &Plan, analyzer: &PlanStepAnalyzer) -> Self {
        Self {
            project_name: plan.project_name.clone(),
            stats: analyzer.stats(&plan.steps),
            groups: analyzer.analyze(&plan.steps),
            labels: plan.steps.iter().map(step_label).collect(),
        }
    }
}

fn step_label(step: &Step) -> String {
    let target = match &step.action {
        Action::CreateStructure { folders } => folders.join(", "),
        Action::CreateFile { file_path, .. } => file_path.clone(),
        Action::RunCommand { command, .. } => command.clone(),
        Action::GitCommit { message, .. } => message.clone().unwrap_or_default(),
        Action::Unknown { .. } => String::new(),
    };
    if target.is_empty() {
        format!("`{}`", step.action.tag())
    } else {
        format!("`{}` {target}", step.action.tag())
    }
}

impl fmt::Display for AnalysisSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.stats;
        writeln!(f, "# Analysis: {}", self.project_name)?;
        writeln!(f)?;
        writeln!(f, "- **Steps**: {}", stats.total_steps)?;
        writeln!(
            f,
            "- **Groups**: {} ({} parallel)",
            stats.total_groups, stats.parallel_groups
        )?;
        writeln!(
            f,
            "- **Parallelizable steps**: {} (largest batch {})",
            stats.steps_parallelizable, stats.max_parallel_batch
        )?;
        writeln!(f, "- **Sequential steps**: {}", stats.steps_sequential)?;
        writeln!(
            f,
            "- **Estimated time saving**: {}%",
            stats.estimated_time_saving_percent
        )?;
        writeln!(f, "- **Workers available**: {}", stats.workers_available)?;

        if self.groups.is_empty() {
            return Ok(());
        }
        writeln!(f, "\n## Groups")?;
        for (position, group) in self.groups.iter().enumerate() {
            let mode = if group.is_parallel() {
                "parallel"
            } else {
                "sequential"
            };
            writeln!(f, "\n### Group {} ({mode})\n", position + 1)?;
            for &index in &group.indices {
                let label = self.labels.get(index).map(String::as_str).unwrap_or("");
                writeln!(f, "- {index}: {label}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use jiff::Timestamp;

    use super::*;

    fn snapshot(id: &str) -> Snapshot {
        Snapshot {
            id: id.to_string(),
            source_path: PathBuf::from("/work/demo"),
            backup_path: PathBuf::from(format!("/data/{id}")),
            created_at: Timestamp::from_second(1640995200).expect("Failed to build timestamp"),
            label: Some("before demo".to_string()),
        }
    }

    #[test]
    fn test_snapshots_display_newest_first() {
        let snapshots = Snapshots(vec![snapshot("demo_1"), snapshot("demo_2")]);
        let output = snapshots.to_string();

        let newer = output.find("## demo_2").expect("Missing demo_2");
        let older = output.find("## demo_1").expect("Missing demo_1");
        assert!(newer < older);
        assert!(output.contains("- **Label**: before demo"));
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].id, "demo_1");
    }

    #[test]
    fn test_analysis_summary_display() {
        let plan = Plan::new(
            "demo",
            vec![
                Step::create_structure(["src"]),
                Step::create_file("src/a.py", None),
                Step::create_file("src/b.py", None),
                Step::run_command("echo hi"),
                Step::git_commit("init"),
            ],
        );
        let summary = AnalysisSummary::new(&plan, &PlanStepAnalyzer::new(4));
        let output = summary.to_string();

        assert!(output.starts_with("# Analysis: demo"));
        assert!(output.contains("- **Groups**: 4 (1 parallel)"));
        assert!(output.contains("- **Estimated time saving**: 20%"));
        assert!(output.contains("### Group 2 (parallel)"));
        assert!(output.contains("- 2: `create_file` src/b.py"));
        assert!(output.contains("- 3: `run_command` echo hi"));
        assert!(output.contains("- 4: `git_commit` init"));
    }
}
