#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use forge_core::{
    config::EngineConfig,
    external::{
        CodeGenerator, CommandOutput, CommandSandbox, ExecutionObserver, GenerationRequest,
        VcsOutcome, VersionControl,
    },
    models::{Progress, Step, StepResult},
    Orchestrator, OrchestratorBuilder, Result,
};
use parking_lot::{Condvar, Mutex};
use tempfile::TempDir;

/// Sandbox that answers from a script instead of running anything.
///
/// Commands starting with `fail` exit 1; commands registered with
/// [`ScriptedSandbox::delay`] sleep first.
#[derive(Default)]
pub struct ScriptedSandbox {
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<(String, PathBuf)>>,
}

impl ScriptedSandbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delay(&self, command: &str, delay: Duration) {
        self.delays.lock().insert(command.to_string(), delay);
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(c, _)| c.clone()).collect()
    }
}

impl CommandSandbox for ScriptedSandbox {
    fn run(&self, command: &str, cwd: &Path, _timeout: Duration) -> CommandOutput {
        self.calls.lock().push((command.to_string(), cwd.to_path_buf()));
        let delay = self.delays.lock().get(command).copied();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }

        if command.starts_with("fail") {
            CommandOutput {
                exit_code: 1,
                stderr: format!("{command}: exploded"),
                ..Default::default()
            }
        } else {
            CommandOutput {
                stdout: format!("ran {command}\n"),
                ..Default::default()
            }
        }
    }
}

#[derive(Default)]
struct Meeting {
    arrived: usize,
    active: usize,
    peak: usize,
}

/// Generator that holds each call until `expected` calls have arrived (or
/// a timeout passes) and records the highest number running at once.
pub struct CountingGenerator {
    expected: usize,
    timeout: Duration,
    meeting: Mutex<Meeting>,
    arrivals: Condvar,
}

impl CountingGenerator {
    pub fn new(expected: usize) -> Arc<Self> {
        Arc::new(Self {
            expected,
            timeout: Duration::from_secs(3),
            meeting: Mutex::new(Meeting::default()),
            arrivals: Condvar::new(),
        })
    }

    pub fn peak(&self) -> usize {
        self.meeting.lock().peak
    }

    pub fn calls(&self) -> usize {
        self.meeting.lock().arrived
    }
}

impl CodeGenerator for CountingGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let deadline = Instant::now() + self.timeout;
        let mut meeting = self.meeting.lock();
        meeting.arrived += 1;
        meeting.active += 1;
        meeting.peak = meeting.peak.max(meeting.active);
        self.arrivals.notify_all();

        while meeting.arrived < self.expected {
            if self.arrivals.wait_until(&mut meeting, deadline).timed_out() {
                break;
            }
        }
        meeting.active -= 1;

        Ok(format!("# generated {}\n", request.file_path))
    }
}

/// Version control that only records commits.
#[derive(Default)]
pub struct FakeVcs {
    commits: Mutex<Vec<String>>,
}

impl FakeVcs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn commits(&self) -> Vec<String> {
        self.commits.lock().clone()
    }
}

impl VersionControl for FakeVcs {
    fn is_repository(&self, _path: &Path) -> bool {
        true
    }

    fn init(&self, _path: &Path) -> VcsOutcome {
        VcsOutcome::ok("Initialized")
    }

    fn commit_all(&self, _path: &Path, message: &str) -> VcsOutcome {
        self.commits.lock().push(message.to_string());
        VcsOutcome::ok(format!("Committed: {message}"))
    }
}

/// Observer that keeps every event as a short string.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

impl ExecutionObserver for RecordingObserver {
    fn on_step_start(&self, step: &Step) {
        self.events.lock().push(format!("start {}", step.index));
    }

    fn on_step_complete(&self, result: &StepResult) {
        self.events.lock().push(format!("complete {}", result.step_index));
    }

    fn on_error(&self, step_index: Option<usize>, _error: &str) {
        let at = step_index.map_or_else(|| "run".to_string(), |i| i.to_string());
        self.events.lock().push(format!("error {at}"));
    }

    fn on_pause(&self, _progress: &Progress) {
        self.events.lock().push("pause".to_string());
    }
}

/// Test config: fast pause polling, explicit worker count, snapshots in
/// the temp dir.
pub fn test_config(temp_dir: &TempDir) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.limits.pause_poll_ms = 10;
    config.pool.workers = Some(4);
    config.snapshots.directory = Some(temp_dir.path().join("snapshots"));
    config
}

pub struct Harness {
    pub temp_dir: TempDir,
    pub target: PathBuf,
    pub sandbox: Arc<ScriptedSandbox>,
    pub vcs: Arc<FakeVcs>,
    pub observer: Arc<RecordingObserver>,
}

impl Harness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let target = temp_dir.path().join("project");
        Self {
            temp_dir,
            target,
            sandbox: ScriptedSandbox::new(),
            vcs: FakeVcs::new(),
            observer: RecordingObserver::new(),
        }
    }

    pub fn builder(&self) -> OrchestratorBuilder {
        OrchestratorBuilder::new()
            .with_config(test_config(&self.temp_dir))
            .with_sandbox(self.sandbox.clone())
            .with_version_control(self.vcs.clone())
            .with_observer(self.observer.clone())
    }

    pub async fn orchestrator(&self) -> Orchestrator {
        self.builder()
            .build()
            .await
            .expect("Failed to build orchestrator")
    }
}
