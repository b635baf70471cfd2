//! Per-action step handlers for the executor.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use log::{info, warn};

use super::StepExecutor;
use crate::{
    error::{EngineError, IoResultExt, Result},
    external::GenerationRequest,
    models::{ActionKind, GenerationContext, Step, StepResult},
};

const DEFAULT_COMMIT_MESSAGE: &str = "Auto commit";

/// Absolute paths are used as given; relative ones live under `root`.
fn resolve(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

impl StepExecutor {
    /// Creates the project root and every folder beneath it.
    pub(super) fn create_structure(
        &self,
        index: usize,
        root: &Path,
        folders: &[String],
    ) -> StepResult {
        let create = || -> Result<Vec<PathBuf>> {
            fs::create_dir_all(root).fs_context(root)?;
            let mut created = vec![root.to_path_buf()];
            for folder in folders {
                let path = resolve(root, folder);
                fs::create_dir_all(&path).fs_context(&path)?;
                created.push(path);
            }
            Ok(created)
        };

        match create() {
            Ok(created) => StepResult::success(
                index,
                ActionKind::CreateStructure,
                format!("Created {} directories", created.len()),
            )
            .with_artifacts(created),
            Err(e) => {
                warn!("Step {index}: {e}");
                StepResult::failure(index, ActionKind::CreateStructure, e.to_string(), false)
            }
        }
    }

    /// Writes inline content, or generated content when none is given.
    pub(super) fn create_file(
        &self,
        step: &Step,
        root: &Path,
        file_path: &str,
        content: Option<&str>,
        context: &GenerationContext,
    ) -> StepResult {
        let full_path = resolve(root, file_path);

        let write = || -> Result<usize> {
            let text = match content {
                Some(text) => text.to_string(),
                None => self.generate(step, file_path, context)?,
            };
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).fs_context(parent)?;
            }
            fs::write(&full_path, &text).fs_context(&full_path)?;
            Ok(text.lines().count())
        };

        match write() {
            Ok(lines) => StepResult::success(
                step.index,
                ActionKind::CreateFile,
                format!("Wrote {} ({lines} lines)", full_path.display()),
            )
            .with_artifacts(vec![full_path]),
            Err(e) => {
                warn!("Step {}: {e}", step.index);
                StepResult::failure(step.index, ActionKind::CreateFile, e.to_string(), false)
            }
        }
    }

    fn generate(&self, step: &Step, file_path: &str, context: &GenerationContext) -> Result<String> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| EngineError::Generation {
                path: PathBuf::from(file_path),
                message: "no inline content and no code generator configured".to_string(),
            })?;

        let request = GenerationRequest::new(file_path, step.description.as_str(), context.clone());
        generator.generate(&request)
    }

    /// Runs a shell command with automatic correction and retry.
    pub(super) fn run_command(
        &self,
        index: usize,
        root: &Path,
        command: &str,
        cwd: Option<&str>,
        timeout_secs: Option<u64>,
    ) -> StepResult {
        if command.trim().is_empty() {
            return StepResult::failure(index, ActionKind::RunCommand, "Empty command", true);
        }

        let dir = cwd.map(|cwd| resolve(root, cwd)).unwrap_or_else(|| root.to_path_buf());
        let timeout = timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        let outcome = self
            .corrector
            .run(command, |attempt| self.sandbox.run(attempt, &dir, timeout));

        if outcome.output.success() {
            info!("Step {index}: `{}` succeeded", outcome.command);
            StepResult::success(index, ActionKind::RunCommand, outcome.output.stdout)
                .with_attempts(outcome.attempts, outcome.history)
        } else {
            let error = outcome.output.error_text();
            warn!(
                "Step {index}: `{}` failed after {} attempt(s)",
                outcome.command, outcome.attempts
            );
            StepResult::failure(index, ActionKind::RunCommand, error, true)
                .with_output(outcome.output.stdout)
                .with_attempts(outcome.attempts, outcome.history)
        }
    }

    /// Commits everything, initialising the repository first if needed.
    pub(super) fn git_commit(
        &self,
        index: usize,
        root: &Path,
        message: Option<&str>,
        project_path: Option<&str>,
    ) -> StepResult {
        let repo = project_path
            .map(|path| resolve(root, path))
            .unwrap_or_else(|| root.to_path_buf());

        if !self.vcs.is_repository(&repo) {
            let init = self.vcs.init(&repo);
            if !init.success {
                warn!("Step {index}: {}", init.message);
                return StepResult::failure(
                    index,
                    ActionKind::GitCommit,
                    format!("Cannot initialise repository: {}", init.message),
                    true,
                );
            }
        }

        let commit = self
            .vcs
            .commit_all(&repo, message.unwrap_or(DEFAULT_COMMIT_MESSAGE));
        if commit.success {
            StepResult::success(index, ActionKind::GitCommit, commit.message)
        } else {
            warn!("Step {index}: {}", commit.message);
            StepResult::failure(index, ActionKind::GitCommit, commit.message, true)
        }
    }
}
