//! Shared run state and the handle used to control a run.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, info};
use parking_lot::Mutex;

use crate::{
    error::{EngineError, Result},
    models::{Progress, RunStatus},
};

/// Everything a poller may observe about the current run.
#[derive(Debug, Default)]
pub(crate) struct RunState {
    status: RunStatus,
    /// True from `start` until its report is returned
    active: bool,
    started_at: Option<Instant>,
    /// Elapsed time frozen when the run ended
    finished_after: Option<Duration>,
    current_group: usize,
    total_groups: usize,
    completed_steps: usize,
    total_steps: usize,
}

impl RunState {
    fn elapsed(&self) -> Duration {
        match (self.finished_after, self.started_at) {
            (Some(elapsed), _) => elapsed,
            (None, Some(started)) => started.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }

    fn progress(&self) -> Progress {
        Progress {
            status: self.status,
            current_group: self.current_group,
            total_groups: self.total_groups,
            completed_steps: self.completed_steps,
            total_steps: self.total_steps,
            elapsed_ms: self.elapsed().as_millis() as u64,
        }
    }

    fn transition(&mut self, next: RunStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        debug!("Run state {} -> {}", self.status.as_str(), next.as_str());
        self.status = next;
        true
    }
}

/// Cloneable handle for pausing, resuming, stopping and polling a run.
///
/// Requests take effect at the next group boundary; a step that is already
/// executing always runs to completion.
#[derive(Debug, Clone, Default)]
pub struct RunController {
    state: Arc<Mutex<RunState>>,
}

impl RunController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> RunStatus {
        self.state.lock().status
    }

    /// Holds the run at the next group boundary. Returns false unless the
    /// run was running.
    pub fn pause(&self) -> bool {
        let mut state = self.state.lock();
        state.status == RunStatus::Running && state.transition(RunStatus::Paused)
    }

    /// Returns false unless the run was paused.
    pub fn resume(&self) -> bool {
        let mut state = self.state.lock();
        state.status == RunStatus::Paused && state.transition(RunStatus::Running)
    }

    /// Ends the run at the next group boundary. Returns false if no run is
    /// in progress.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock();
        state.active && state.transition(RunStatus::Stopped)
    }

    pub fn progress(&self) -> Progress {
        self.state.lock().progress()
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Marks a new run as started.
    pub(crate) fn begin(&self, total_steps: usize) -> Result<()> {
        let mut state = self.state.lock();
        if state.active || !state.transition(RunStatus::Running) {
            return Err(EngineError::RunInProgress);
        }
        *state = RunState {
            status: RunStatus::Running,
            active: true,
            started_at: Some(Instant::now()),
            total_steps,
            ..Default::default()
        };
        Ok(())
    }

    pub(crate) fn set_groups(&self, total_groups: usize) {
        self.state.lock().total_groups = total_groups;
    }

    pub(crate) fn enter_group(&self, position: usize) {
        self.state.lock().current_group = position;
    }

    pub(crate) fn step_completed(&self) {
        self.state.lock().completed_steps += 1;
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.state.lock().elapsed()
    }

    /// Records the terminal status and releases the run.
    pub(crate) fn finish(&self, status: RunStatus) -> Duration {
        let mut state = self.state.lock();
        let elapsed = state.elapsed();
        if status == RunStatus::Completed {
            state.current_group = state.total_groups;
        }
        state.status = status;
        state.active = false;
        state.finished_after = Some(elapsed);
        info!("Run finished: {} after {:?}", status.as_str(), elapsed);
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controls_are_ignored_without_a_run() {
        let controller = RunController::new();
        assert!(!controller.pause());
        assert!(!controller.resume());
        assert!(!controller.stop());
        assert_eq!(controller.status(), RunStatus::Idle);
    }

    #[test]
    fn test_pause_resume_stop_edges() {
        let controller = RunController::new();
        controller.begin(3).expect("Failed to begin run");

        assert!(controller.pause());
        assert!(!controller.pause());
        assert_eq!(controller.status(), RunStatus::Paused);
        assert!(controller.resume());
        assert!(!controller.resume());
        assert!(controller.stop());
        assert_eq!(controller.status(), RunStatus::Stopped);

        // Still active until the loop reports back
        assert!(matches!(controller.begin(1), Err(EngineError::RunInProgress)));
    }

    #[test]
    fn test_finish_freezes_progress() {
        let controller = RunController::new();
        controller.begin(2).expect("Failed to begin run");
        controller.set_groups(2);
        controller.step_completed();
        controller.step_completed();
        controller.finish(RunStatus::Completed);

        let progress = controller.progress();
        assert_eq!(progress.status, RunStatus::Completed);
        assert_eq!(progress.current_group, 2);
        assert_eq!(progress.percent(), 100.0);
        assert!(!controller.is_active());

        let elapsed = progress.elapsed_ms;
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(controller.progress().elapsed_ms, elapsed);

        // A finished run may be started again
        controller.begin(1).expect("Failed to restart run");
        assert_eq!(controller.progress().completed_steps, 0);
    }
}
