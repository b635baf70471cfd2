//! Facade over [`Orchestrator`] for callers that work in a workspace.
//!
//! An [`Agent`] places every project in `workspace/<project_name>` and
//! exposes rollback and correction statistics next to plan execution.

use std::path::{Component, Path, PathBuf};

use crate::{
    corrector::CorrectionStats,
    error::{EngineError, Result},
    models::{Plan, Progress, RunReport, Snapshot},
    orchestrator::{Orchestrator, RunController},
};

pub struct Agent {
    orchestrator: Orchestrator,
    workspace: PathBuf,
}

impl Agent {
    pub fn new(orchestrator: Orchestrator, workspace: impl Into<PathBuf>) -> Self {
        Self {
            orchestrator,
            workspace: workspace.into(),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Directory a plan's project is built in.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidInput` if the project name is empty or is
    /// not a single plain path component.
    pub fn project_path(&self, plan: &Plan) -> Result<PathBuf> {
        let name = plan.project_name.trim();
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.workspace.join(name)),
            _ => Err(EngineError::invalid_input("project_name")
                .with_reason(format!("'{name}' is not a valid directory name"))),
        }
    }

    /// Runs `plan` in its project directory under the workspace.
    pub async fn execute_plan(&self, plan: &Plan) -> Result<RunReport> {
        let target = self.project_path(plan)?;
        self.orchestrator.start(plan, target).await
    }

    /// Restores the given snapshot, or the latest one.
    pub async fn rollback(&self, snapshot_id: Option<&str>) -> Result<Snapshot> {
        self.orchestrator.restore_snapshot(snapshot_id).await
    }

    pub async fn snapshots(&self) -> Result<Vec<Snapshot>> {
        self.orchestrator.list_snapshots().await
    }

    pub fn correction_stats(&self) -> CorrectionStats {
        self.orchestrator.correction_stats()
    }

    pub fn controller(&self) -> RunController {
        self.orchestrator.controller()
    }

    pub fn pause(&self) -> bool {
        self.orchestrator.pause()
    }

    pub fn resume(&self) -> bool {
        self.orchestrator.resume()
    }

    pub fn stop(&self) -> bool {
        self.orchestrator.stop()
    }

    pub fn progress(&self) -> Progress {
        self.orchestrator.progress()
    }
}
