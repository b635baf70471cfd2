//! Display implementations for domain models.
//!
//! Output is markdown: headings for reports, bullet lists for metadata.

use std::fmt;

use super::datetime::{ByteSize, LocalDateTime};
use crate::models::{
    ActionKind, ErrorKind, Progress, RunReport, RunStatus, Snapshot, SnapshotUsage, StepResult,
};

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let icon = if self.success { "✓" } else { "✗" };
        write!(f, "- {icon} Step {} `{}`", self.step_index, self.action)?;
        if self.attempts > 1 {
            write!(f, " ({} attempts)", self.attempts)?;
        }
        match (&self.error, self.output.lines().next()) {
            (Some(error), _) => {
                let first = error.lines().next().unwrap_or_default();
                writeln!(f, ": {first}")?;
            }
            (None, Some(line)) if !line.is_empty() => writeln!(f, ": {line}")?,
            _ => writeln!(f)?,
        }

        for attempt in &self.retry_history {
            write!(
                f,
                "  - attempt {} `{}` exited {} ({}, {:.0}%)",
                attempt.attempt,
                attempt.command,
                attempt.exit_code,
                attempt.error_kind,
                attempt.confidence * 100.0
            )?;
            match &attempt.auto_fix {
                Some(fix) => writeln!(f, ", retried as `{fix}`")?,
                None => writeln!(f)?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Run {}", self.status.with_icon())?;
        writeln!(f)?;
        writeln!(f, "- **Project**: {}", self.project_path.display())?;
        writeln!(
            f,
            "- **Steps**: {} succeeded, {} failed",
            self.succeeded(),
            self.failed()
        )?;
        writeln!(f, "- **Groups**: {}", self.groups.len())?;
        writeln!(f, "- **Elapsed**: {:.1}s", self.elapsed_ms as f64 / 1000.0)?;
        if let Some(id) = &self.snapshot_id {
            writeln!(f, "- **Snapshot**: {id}")?;
        }

        if let Some(error) = &self.error {
            writeln!(f)?;
            match self.failed_step {
                Some(index) => writeln!(f, "**Error at step {index}**: {error}")?,
                None => writeln!(f, "**Error**: {error}")?,
            }
        }

        if !self.results.is_empty() {
            writeln!(f, "\n## Results")?;
            writeln!(f)?;
            for result in &self.results {
                write!(f, "{result}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} group {}/{}, {}/{} steps ({:.0}%)",
            self.status.with_icon(),
            self.current_group.min(self.total_groups),
            self.total_groups,
            self.completed_steps,
            self.total_steps,
            self.percent()
        )
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## {}", self.id)?;
        writeln!(f)?;
        writeln!(f, "- **Source**: {}", self.source_path.display())?;
        writeln!(f, "- **Backup**: {}", self.backup_path.display())?;
        writeln!(f, "- **Created**: {}", LocalDateTime(&self.created_at))?;
        if let Some(label) = &self.label {
            writeln!(f, "- **Label**: {label}")?;
        }
        writeln!(f)
    }
}

impl fmt::Display for SnapshotUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Snapshot Usage")?;
        writeln!(f)?;
        writeln!(f, "- **Snapshots**: {}", self.count)?;
        writeln!(f, "- **Size**: {}", ByteSize(self.total_bytes))?;
        writeln!(f, "- **Directory**: {}", self.directory.display())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::models::{ExecutionGroup, RetryAttempt};

    fn report(status: RunStatus) -> RunReport {
        RunReport {
            status,
            project_path: PathBuf::from("/work/demo"),
            results: vec![
                StepResult::success(0, ActionKind::CreateStructure, "Created 1 folders"),
                StepResult::failure(1, ActionKind::CreateFile, "disk full", false),
            ],
            groups: vec![ExecutionGroup::singleton(0), ExecutionGroup::singleton(1)],
            failed_step: Some(1),
            error: Some("disk full".to_string()),
            snapshot_id: None,
            elapsed_ms: 1500,
        }
    }

    #[test]
    fn test_run_report_display() {
        let output = report(RunStatus::Failed).to_string();

        assert!(output.starts_with("# Run ✗ Failed"));
        assert!(output.contains("- **Steps**: 1 succeeded, 1 failed"));
        assert!(output.contains("- **Elapsed**: 1.5s"));
        assert!(output.contains("**Error at step 1**: disk full"));
        assert!(output.contains("- ✓ Step 0 `create_structure`: Created 1 folders"));
        assert!(output.contains("- ✗ Step 1 `create_file`: disk full"));
        assert!(!output.contains("Snapshot"));
    }

    #[test]
    fn test_step_result_lists_retries() {
        let attempt = RetryAttempt::new(
            1,
            "python app.py",
            1,
            "ModuleNotFoundError: No module named 'flask'",
            ErrorKind::ModuleNotFound,
            0.85,
            Some("pip install flask && python app.py".to_string()),
        );
        let result = StepResult::success(3, ActionKind::RunCommand, "ok\n")
            .with_attempts(2, vec![attempt]);

        let output = result.to_string();
        assert!(output.starts_with("- ✓ Step 3 `run_command` (2 attempts): ok"));
        assert!(output.contains("module_not_found, 85%"));
        assert!(output.contains("retried as `pip install flask && python app.py`"));
    }

    #[test]
    fn test_progress_display() {
        let progress = Progress {
            status: RunStatus::Paused,
            current_group: 1,
            total_groups: 4,
            completed_steps: 1,
            total_steps: 4,
            elapsed_ms: 10,
        };
        assert_eq!(progress.to_string(), "‖ Paused group 1/4, 1/4 steps (25%)");
    }

    #[test]
    fn test_snapshot_usage_display() {
        let usage = SnapshotUsage {
            count: 2,
            total_bytes: 2048,
            directory: PathBuf::from("/data/snapshots"),
        };
        let output = usage.to_string();
        assert!(output.contains("- **Snapshots**: 2"));
        assert!(output.contains("- **Size**: 2.0 KiB"));
    }
}
