//! Status enumerations for runs and command failures.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of one orchestrated run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No run has started
    #[default]
    Idle,

    /// Groups are being executed
    Running,

    /// Execution is held at the next group boundary
    Paused,

    /// Stop was requested
    Stopped,

    /// Every group was executed
    Completed,

    /// A fatal step aborted the run
    Failed,

    /// The wall-clock budget ran out
    TimedOut,
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(RunStatus::Idle),
            "running" => Ok(RunStatus::Running),
            "paused" => Ok(RunStatus::Paused),
            "stopped" => Ok(RunStatus::Stopped),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "timedout" | "timed_out" => Ok(RunStatus::TimedOut),
            _ => Err(format!("Invalid run status: {s}")),
        }
    }
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Stopped => "stopped",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::TimedOut => "timed_out",
        }
    }

    /// Get status with consistent icon formatting for display.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use forge_core::models::RunStatus;
    ///
    /// assert_eq!(RunStatus::Completed.with_icon(), "✓ Completed");
    /// assert_eq!(RunStatus::Failed.with_icon(), "✗ Failed");
    /// ```
    pub fn with_icon(&self) -> &'static str {
        match self {
            RunStatus::Idle => "○ Idle",
            RunStatus::Running => "➤ Running",
            RunStatus::Paused => "‖ Paused",
            RunStatus::Stopped => "■ Stopped",
            RunStatus::Completed => "✓ Completed",
            RunStatus::Failed => "✗ Failed",
            RunStatus::TimedOut => "⧗ Timed Out",
        }
    }

    /// Whether the run has ended and will not change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Stopped | RunStatus::Completed | RunStatus::Failed | RunStatus::TimedOut
        )
    }

    /// Allowed state machine edges.
    ///
    /// `Idle -> Running -> {Paused <-> Running} -> {Completed | Failed | Stopped | TimedOut}`.
    /// A paused run may also be stopped directly, and a terminal run may be
    /// started again.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        match (self, next) {
            (Idle, Running) => true,
            (Running, Paused | Stopped | Completed | Failed | TimedOut) => true,
            (Paused, Running | Stopped) => true,
            (Stopped | Completed | Failed | TimedOut, Running) => true,
            _ => false,
        }
    }
}

/// Classification label assigned to a failed command's output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CommandNotFound,
    PermissionDenied,
    ModuleNotFound,
    FileNotFound,
    PortInUse,
    SyntaxError,
    ConnectionError,
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::CommandNotFound,
        ErrorKind::PermissionDenied,
        ErrorKind::ModuleNotFound,
        ErrorKind::FileNotFound,
        ErrorKind::PortInUse,
        ErrorKind::SyntaxError,
        ErrorKind::ConnectionError,
        ErrorKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CommandNotFound => "command_not_found",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::ModuleNotFound => "module_not_found",
            ErrorKind::FileNotFound => "file_not_found",
            ErrorKind::PortInUse => "port_in_use",
            ErrorKind::SyntaxError => "syntax_error",
            ErrorKind::ConnectionError => "connection_error",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Fixed confidence that an automatic fix for this kind will work.
    pub fn confidence(&self) -> f64 {
        match self {
            ErrorKind::CommandNotFound => 0.7,
            ErrorKind::PermissionDenied => 0.9,
            ErrorKind::ModuleNotFound => 0.85,
            ErrorKind::FileNotFound => 0.6,
            ErrorKind::PortInUse => 0.5,
            ErrorKind::SyntaxError => 0.4,
            ErrorKind::ConnectionError => 0.3,
            ErrorKind::Unknown => 0.2,
        }
    }
}
