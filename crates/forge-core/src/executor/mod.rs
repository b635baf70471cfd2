//! Execution of individual steps.
//!
//! [`StepExecutor`] dispatches a [`WorkerTask`] to the handler for its action
//! and always answers with a [`StepResult`]; failures are data, never `Err`.
//!
//! # Failure policy
//!
//! | Action | `can_continue` on failure |
//! |---|---|
//! | `create_structure` | false |
//! | `create_file` | false |
//! | `run_command` | true |
//! | `git_commit` | true |
//! | unknown | true |

mod handlers;
pub mod worker;

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::{
    config::EngineConfig,
    corrector::RetryCorrector,
    external::{
        CodeGenerator, CommandGenerator, CommandSandbox, GitCli, ShellSandbox, VersionControl,
    },
    models::{Action, ActionKind, GenerationContext, Step, StepResult},
};

/// Plain-data unit of work: one step plus where and for what it runs.
///
/// Holds no live references so it can be handed to a worker process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerTask {
    pub step: Step,
    pub project_path: PathBuf,
    #[serde(default)]
    pub context: GenerationContext,
}

impl WorkerTask {
    pub fn new(step: Step, project_path: impl Into<PathBuf>, context: GenerationContext) -> Self {
        Self {
            step,
            project_path: project_path.into(),
            context,
        }
    }
}

/// Whether a failed step of this kind lets the run go on.
pub fn can_continue_after(kind: ActionKind) -> bool {
    !matches!(kind, ActionKind::CreateStructure | ActionKind::CreateFile)
}

/// Dispatches steps to their handlers.
#[derive(Clone)]
pub struct StepExecutor {
    sandbox: Arc<dyn CommandSandbox>,
    generator: Option<Arc<dyn CodeGenerator>>,
    vcs: Arc<dyn VersionControl>,
    corrector: RetryCorrector,
    default_timeout: Duration,
}

impl std::fmt::Debug for StepExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepExecutor")
            .field("has_generator", &self.generator.is_some())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl StepExecutor {
    pub fn new(
        sandbox: Arc<dyn CommandSandbox>,
        vcs: Arc<dyn VersionControl>,
        corrector: RetryCorrector,
        default_timeout: Duration,
    ) -> Self {
        Self {
            sandbox,
            generator: None,
            vcs,
            corrector,
            default_timeout,
        }
    }

    /// Production executor: `sh -c` sandbox, git CLI, and the configured
    /// generator command if there is one.
    pub fn from_config(config: &EngineConfig) -> Self {
        let executor = Self::new(
            Arc::new(ShellSandbox::new(config.commands.max_output_bytes)),
            Arc::new(GitCli::new()),
            RetryCorrector::new(&config.retry),
            Duration::from_secs(config.commands.default_timeout_secs),
        );

        let generator = config.generator.command.as_deref().and_then(|argv| {
            CommandGenerator::from_argv(argv, Duration::from_secs(config.generator.timeout_secs))
        });
        match generator {
            Some(generator) => executor.with_generator(Arc::new(generator)),
            None => executor,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_sandbox(mut self, sandbox: Arc<dyn CommandSandbox>) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_version_control(mut self, vcs: Arc<dyn VersionControl>) -> Self {
        self.vcs = vcs;
        self
    }

    pub fn corrector(&self) -> &RetryCorrector {
        &self.corrector
    }

    /// Runs one task. Panics inside a handler become a failed result.
    pub fn execute(&self, task: &WorkerTask) -> StepResult {
        let step = &task.step;
        debug!("Executing step {} ({})", step.index, step.action.tag());

        let outcome = catch_unwind(AssertUnwindSafe(|| self.dispatch(task)));
        match outcome {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Step {} panicked: {message}", step.index);
                StepResult::failure(
                    step.index,
                    step.kind(),
                    format!("Step panicked: {message}"),
                    can_continue_after(step.kind()),
                )
            }
        }
    }

    fn dispatch(&self, task: &WorkerTask) -> StepResult {
        let step = &task.step;
        let root = &task.project_path;

        match &step.action {
            Action::CreateStructure { folders } => self.create_structure(step.index, root, folders),
            Action::CreateFile { file_path, content } => self.create_file(
                step,
                root,
                file_path,
                content.as_deref(),
                &task.context,
            ),
            Action::RunCommand {
                command,
                cwd,
                timeout_secs,
            } => self.run_command(step.index, root, command, cwd.as_deref(), *timeout_secs),
            Action::GitCommit {
                message,
                project_path,
            } => self.git_commit(step.index, root, message.as_deref(), project_path.as_deref()),
            Action::Unknown { name } => StepResult::failure(
                step.index,
                ActionKind::Unknown,
                format!("Unknown action: {name}"),
                true,
            ),
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
