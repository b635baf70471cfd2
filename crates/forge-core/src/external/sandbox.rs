//! Command execution collaborator.
//!
//! [`CommandSandbox`] is the seam the run-command handler executes through.
//! [`ShellSandbox`] is the production implementation that spawns `sh -c`
//! with a deadline and bounded output capture.
//!
//! Children run in their own process group. A deadline kills the whole
//! group, so backgrounded grandchildren holding the output pipes cannot
//! outlive it, and a terminal interrupt reaches only the engine.

use std::{path::Path, process::Stdio, sync::Arc, time::Duration};

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{Child, Command},
    task::JoinSet,
    time,
};

/// Exit code reported for commands that were killed or never started.
pub const EXIT_ABNORMAL: i32 = -1;

/// How long to wait for pipes to drain after a kill.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Captured result of one command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// A failure that happened before or outside the command itself.
    pub fn abnormal(message: impl Into<String>) -> Self {
        Self {
            exit_code: EXIT_ABNORMAL,
            stdout: String::new(),
            stderr: message.into(),
            timed_out: false,
        }
    }

    /// Text used to classify a failure: stderr, then stdout.
    pub fn error_text(&self) -> String {
        match (self.stderr.trim().is_empty(), self.stdout.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stderr.trim_end(), self.stdout.trim_end()),
            (false, true) => self.stderr.trim_end().to_string(),
            (true, false) => self.stdout.trim_end().to_string(),
            (true, true) => format!("Command exited with code {}", self.exit_code),
        }
    }
}

/// Executes shell command strings.
pub trait CommandSandbox: Send + Sync {
    fn run(&self, command: &str, cwd: &Path, timeout: Duration) -> CommandOutput;
}

/// Production sandbox running commands through `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellSandbox {
    max_output_bytes: usize,
}

impl ShellSandbox {
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }
}

impl Default for ShellSandbox {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}

impl CommandSandbox for ShellSandbox {
    fn run(&self, command: &str, cwd: &Path, timeout: Duration) -> CommandOutput {
        debug!("Running `{command}` in {}", cwd.display());

        let mut shell = Command::new("sh");
        shell.arg("-c").arg(command).current_dir(cwd);
        run_with_deadline(shell, None, timeout, self.max_output_bytes)
    }
}

/// Runs `command` to completion on a private runtime, feeding it `input`
/// and killing its process group once `timeout` elapses.
///
/// The deadline covers the child's exit and the draining of its pipes.
pub(crate) fn run_with_deadline(
    command: Command,
    input: Option<Vec<u8>>,
    timeout: Duration,
    max_output_bytes: usize,
) -> CommandOutput {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build();
    match runtime {
        Ok(runtime) => runtime.block_on(execute(command, input, timeout, max_output_bytes)),
        Err(e) => CommandOutput::abnormal(format!("Failed to start command runtime: {e}")),
    }
}

async fn execute(
    mut command: Command,
    input: Option<Vec<u8>>,
    timeout: Duration,
    max_output_bytes: usize,
) -> CommandOutput {
    command
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => return CommandOutput::abnormal(format!("Failed to execute: {e}")),
    };
    // Also the process group id; unavailable from `child` once it is reaped
    let group = child.id();

    let stdout = Arc::new(Mutex::new(Vec::new()));
    let stderr = Arc::new(Mutex::new(Vec::new()));
    let mut pipes = JoinSet::new();
    if let (Some(mut stdin), Some(payload)) = (child.stdin.take(), input) {
        pipes.spawn(async move {
            // A child may exit without reading; its exit status decides
            if let Err(e) = stdin.write_all(&payload).await {
                debug!("Child closed stdin early: {e}");
            }
        });
    }
    if let Some(pipe) = child.stdout.take() {
        pipes.spawn(capture(pipe, Arc::clone(&stdout), max_output_bytes));
    }
    if let Some(pipe) = child.stderr.take() {
        pipes.spawn(capture(pipe, Arc::clone(&stderr), max_output_bytes));
    }

    let finished = tokio::select! {
        status = wait_and_drain(&mut child, &mut pipes) => Some(status),
        _ = time::sleep(timeout) => None,
    };

    let (exit_code, timed_out) = match finished {
        Some(Ok(status)) => (status.code().unwrap_or(EXIT_ABNORMAL), false),
        Some(Err(e)) => {
            kill(&mut child, group).await;
            return CommandOutput::abnormal(format!("Failed to wait for command: {e}"));
        }
        None => {
            warn!("Command exceeded {}s, killing it", timeout.as_secs());
            kill(&mut child, group).await;
            let _ = time::timeout(DRAIN_GRACE, drain(&mut pipes)).await;
            (EXIT_ABNORMAL, true)
        }
    };
    pipes.abort_all();

    let stdout = String::from_utf8_lossy(&stdout.lock()).into_owned();
    let mut stderr = String::from_utf8_lossy(&stderr.lock()).into_owned();
    if timed_out {
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&format!("Command timed out after {}s", timeout.as_secs()));
    }

    CommandOutput {
        exit_code,
        stdout,
        stderr,
        timed_out,
    }
}

async fn wait_and_drain(
    child: &mut Child,
    pipes: &mut JoinSet<()>,
) -> std::io::Result<std::process::ExitStatus> {
    let status = child.wait().await?;
    drain(pipes).await;
    Ok(status)
}

async fn drain(pipes: &mut JoinSet<()>) {
    while pipes.join_next().await.is_some() {}
}

/// Kills the child and everything left in its process group.
async fn kill(child: &mut Child, group: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = group {
        let target = format!("-{pid}");
        let killed = Command::new("kill")
            .args(["-KILL", "--", &target])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = killed {
            warn!("Failed to signal process group {pid}: {e}");
        }
    }
    #[cfg(not(unix))]
    let _ = group;
    let _ = child.start_kill();
    let _ = time::timeout(DRAIN_GRACE, child.wait()).await;
}

/// Reads a pipe to EOF, keeping at most `limit` bytes.
async fn capture<R: AsyncRead + Unpin>(mut pipe: R, sink: Arc<Mutex<Vec<u8>>>, limit: usize) {
    let mut buf = [0u8; 8192];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut kept = sink.lock();
                let room = limit.saturating_sub(kept.len());
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
}
