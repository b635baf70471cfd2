//! Process-backed execution strategy.
//!
//! Each worker is a long-lived child process speaking the line protocol in
//! [`crate::executor::worker`]: one task line in, one result line out.
//! Tasks are pulled from a shared queue so a slow worker never holds up
//! tasks another worker could take.
//!
//! Workers run in their own process group so a terminal interrupt reaches
//! only the parent, which then stops between groups while in-flight tasks
//! finish. A worker that cannot accept a task is replaced and the task goes
//! back on the queue.

use std::{
    collections::VecDeque,
    io::{BufRead, BufReader, Write},
    path::PathBuf,
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{failed_result, ExecutionStrategy, PoolError};
use crate::{config::StrategyKind, executor::WorkerTask, models::StepResult};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Rounds of worker replacement per batch before unsent tasks give up.
const RESPAWN_ROUNDS: usize = 3;

/// Program and arguments that start one worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

struct WorkerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    alive: bool,
}

impl WorkerProcess {
    fn spawn(command: &WorkerCommand) -> Result<Self, PoolError> {
        let unavailable = |message: String| PoolError::WorkerUnavailable { message };

        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            process.process_group(0);
        }

        let mut child = process
            .spawn()
            .map_err(|e| {
                unavailable(format!(
                    "Failed to start worker '{}': {e}",
                    command.program.display()
                ))
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        match (stdin, stdout) {
            (Some(stdin), Some(stdout)) => Ok(Self {
                child,
                stdin: Some(stdin),
                stdout: BufReader::new(stdout),
                alive: true,
            }),
            _ => {
                let _ = child.kill();
                Err(unavailable("Worker pipes were not captured".to_string()))
            }
        }
    }

    fn send(&mut self, line: &str) -> std::io::Result<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "worker stdin closed")
        })?;
        stdin.write_all(line.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()
    }

    fn stop(&mut self) {
        // Closing stdin is the worker's signal to exit
        self.stdin.take();
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
                _ => {
                    let _ = self.child.kill();
                    let _ = self.child.wait();
                    return;
                }
            }
        }
    }
}

/// Persistent pool of worker processes.
pub struct ProcessStrategy {
    workers: usize,
    command: WorkerCommand,
    processes: Vec<WorkerProcess>,
}

impl ProcessStrategy {
    pub fn new(workers: usize, command: WorkerCommand) -> Self {
        Self {
            workers: workers.max(1),
            command,
            processes: Vec::new(),
        }
    }

    /// Replaces dead workers and starts missing ones.
    fn top_up(&mut self) -> Result<(), PoolError> {
        for process in self.processes.iter_mut().filter(|p| !p.alive) {
            process.stop();
        }
        self.processes.retain(|p| p.alive);

        while self.processes.len() < self.workers {
            self.processes.push(WorkerProcess::spawn(&self.command)?);
        }
        Ok(())
    }

    /// Feeds `positions` to the live workers and returns those no worker
    /// accepted. A task a worker accepted but never answered is failed, not
    /// retried, since it may have partly run.
    fn dispatch(
        &mut self,
        tasks: &[WorkerTask],
        lines: &[String],
        positions: Vec<usize>,
        slots: &Mutex<Vec<Option<StepResult>>>,
    ) -> Vec<usize> {
        let queue = Mutex::new(VecDeque::from(positions));

        thread::scope(|scope| {
            for process in self.processes.iter_mut() {
                let queue = &queue;
                scope.spawn(move || loop {
                    let Some(position) = queue.lock().pop_front() else {
                        break;
                    };
                    let task = &tasks[position];

                    if let Err(e) = process.send(&lines[position]) {
                        warn!("Worker {} rejected a task: {e}", process.child.id());
                        process.alive = false;
                        queue.lock().push_back(position);
                        break;
                    }

                    let mut reply = String::new();
                    let result = match process.stdout.read_line(&mut reply) {
                        Ok(0) | Err(_) => {
                            warn!("Worker {} exited mid-task", process.child.id());
                            process.alive = false;
                            slots.lock()[position] =
                                Some(failed_result(task, "Worker process exited unexpectedly"));
                            break;
                        }
                        Ok(_) => serde_json::from_str::<StepResult>(reply.trim()).unwrap_or_else(
                            |e| failed_result(task, &format!("Unreadable worker reply: {e}")),
                        ),
                    };
                    slots.lock()[position] = Some(result);
                });
            }
        });

        queue.into_inner().into_iter().collect()
    }
}

impl ExecutionStrategy for ProcessStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Process
    }

    fn is_started(&self) -> bool {
        !self.processes.is_empty()
    }

    fn run_batch(&mut self, tasks: &[WorkerTask]) -> Result<Vec<StepResult>, PoolError> {
        let lines = tasks
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PoolError::Serialization {
                message: e.to_string(),
            })?;

        let slots: Mutex<Vec<Option<StepResult>>> = Mutex::new(vec![None; tasks.len()]);
        let mut unsent: Vec<usize> = (0..tasks.len()).collect();

        for round in 0..RESPAWN_ROUNDS {
            if unsent.is_empty() {
                break;
            }
            match self.top_up() {
                Ok(()) => {}
                Err(e) if round == 0 => return Err(e),
                Err(e) => {
                    // Results already produced stand; only unsent tasks fail
                    warn!("Could not replace workers: {e}");
                    break;
                }
            }
            unsent = self.dispatch(tasks, &lines, unsent, &slots);
            if !unsent.is_empty() {
                warn!("Re-queuing {} task(s) after a worker failure", unsent.len());
            }
        }

        debug!(
            "Process pool ran {} task(s) on {} worker(s)",
            tasks.len(),
            self.processes.len()
        );
        Ok(slots
            .into_inner()
            .into_iter()
            .zip(tasks)
            .map(|(slot, task)| slot.unwrap_or_else(|| failed_result(task, "No worker took the task")))
            .collect())
    }

    fn shutdown(&mut self) {
        for process in self.processes.iter_mut() {
            process.stop();
        }
        if !self.processes.is_empty() {
            debug!("Stopped {} worker process(es)", self.processes.len());
        }
        self.processes.clear();
    }
}

impl Drop for ProcessStrategy {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GenerationContext, Step};

    /// Minimal worker answering every task line with a success for its index.
    fn shell_worker() -> WorkerCommand {
        let script = r#"while read line; do
            i=$(echo "$line" | sed 's/.*"index":\([0-9]*\).*/\1/')
            echo "{\"step_index\":$i,\"action\":\"run_command\",\"success\":true,\"can_continue\":true}"
        done"#;
        WorkerCommand::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    fn tasks(count: usize) -> Vec<WorkerTask> {
        (0..count)
            .map(|i| {
                let mut step = Step::run_command("true");
                step.index = i;
                WorkerTask::new(step, "/tmp/unused", GenerationContext::default())
            })
            .collect()
    }

    #[test]
    fn test_runs_batch_on_worker_processes() {
        let mut strategy = ProcessStrategy::new(2, shell_worker());

        let results = strategy.run_batch(&tasks(4)).expect("Failed to run batch");

        let indices: Vec<usize> = results.iter().map(|r| r.step_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(strategy.processes.len(), 2);
    }

    #[test]
    fn test_worker_dead_between_batches_is_replaced() {
        let mut strategy = ProcessStrategy::new(1, shell_worker());
        strategy.run_batch(&tasks(2)).expect("Failed to run first batch");

        let stale = &mut strategy.processes[0];
        let stale_pid = stale.child.id();
        stale.child.kill().expect("Failed to kill worker");
        stale.child.wait().expect("Failed to reap worker");

        let results = strategy
            .run_batch(&tasks(3))
            .expect("A dead worker must not fail the batch");

        assert!(results.iter().all(|r| r.success));
        let indices: Vec<usize> = results.iter().map(|r| r.step_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(strategy.processes.len(), 1);
        assert!(strategy.processes[0].alive);
        assert_ne!(strategy.processes[0].child.id(), stale_pid);
    }

    #[test]
    fn test_missing_worker_program_is_unavailable() {
        let mut strategy =
            ProcessStrategy::new(1, WorkerCommand::new("/nonexistent/forge-worker", Vec::new()));

        let err = strategy
            .run_batch(&tasks(2))
            .expect_err("Spawning must fail");

        assert!(matches!(err, PoolError::WorkerUnavailable { .. }));
        assert!(err.is_serialization_class());
    }
}
