//! Step results and retry bookkeeping.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{ActionKind, ErrorKind};

/// Longest error text kept per retry attempt.
pub const MAX_ATTEMPT_ERROR_LEN: usize = 500;

/// Uniform outcome of executing one step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub step_index: usize,

    pub action: ActionKind,

    pub success: bool,

    /// Captured output or a short confirmation message
    #[serde(default)]
    pub output: String,

    #[serde(default)]
    pub error: Option<String>,

    /// False when the failure invalidates the rest of the plan
    pub can_continue: bool,

    /// Number of executions, including the first
    #[serde(default = "one")]
    pub attempts: u32,

    /// One entry per failed attempt that was analysed
    #[serde(default)]
    pub retry_history: Vec<RetryAttempt>,

    /// Paths created or written by the step
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,
}

fn one() -> u32 {
    1
}

impl StepResult {
    pub fn success(step_index: usize, action: ActionKind, output: impl Into<String>) -> Self {
        Self {
            step_index,
            action,
            success: true,
            output: output.into(),
            error: None,
            can_continue: true,
            attempts: 1,
            retry_history: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn failure(
        step_index: usize,
        action: ActionKind,
        error: impl Into<String>,
        can_continue: bool,
    ) -> Self {
        Self {
            step_index,
            action,
            success: false,
            output: String::new(),
            error: Some(error.into()),
            can_continue,
            attempts: 1,
            retry_history: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_artifacts(mut self, artifacts: Vec<PathBuf>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_attempts(mut self, attempts: u32, retry_history: Vec<RetryAttempt>) -> Self {
        self.attempts = attempts;
        self.retry_history = retry_history;
        self
    }

    /// A failure that must abort the run.
    pub fn is_fatal(&self) -> bool {
        !self.success && !self.can_continue
    }
}

/// Record of one failed command attempt and the correction decided for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryAttempt {
    /// 1-based attempt number
    pub attempt: u32,

    /// Command that was executed
    pub command: String,

    pub exit_code: i32,

    /// Error text, truncated
    pub error: String,

    pub error_kind: ErrorKind,

    pub confidence: f64,

    /// Command proposed for the next attempt, if any
    pub auto_fix: Option<String>,
}

impl RetryAttempt {
    pub fn new(
        attempt: u32,
        command: impl Into<String>,
        exit_code: i32,
        error: &str,
        error_kind: ErrorKind,
        confidence: f64,
        auto_fix: Option<String>,
    ) -> Self {
        Self {
            attempt,
            command: command.into(),
            exit_code,
            error: truncate_chars(error, MAX_ATTEMPT_ERROR_LEN),
            error_kind,
            confidence,
            auto_fix,
        }
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => text[..byte].to_string(),
        None => text.to_string(),
    }
}
