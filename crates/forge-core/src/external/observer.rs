use crate::models::{Progress, Step, StepResult};

/// Receives run events for display.
///
/// Callbacks are observational: they run on the orchestrator's control loop
/// and must return quickly. All methods default to doing nothing.
pub trait ExecutionObserver: Send + Sync {
    fn on_step_start(&self, _step: &Step) {}

    fn on_step_complete(&self, _result: &StepResult) {}

    /// A step failed, or the run itself hit an error with no step attached.
    fn on_error(&self, _step_index: Option<usize>, _error: &str) {}

    /// Called once per poll while the run is paused.
    fn on_pause(&self, _progress: &Progress) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {}
