//! Code generation collaborator.
//!
//! File steps without inline content ask a [`CodeGenerator`] for the text to
//! write. The engine ships [`CommandGenerator`], which delegates to any
//! external program: the request is written to its stdin as JSON and the
//! program's stdout becomes the file content.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::sandbox::run_with_deadline;
use crate::{
    error::{EngineError, Result},
    models::GenerationContext,
};

/// Everything a generator needs to produce one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationRequest {
    pub file_path: String,
    pub description: String,
    pub language: String,
    pub context: GenerationContext,
}

impl GenerationRequest {
    pub fn new(
        file_path: impl Into<String>,
        description: impl Into<String>,
        context: GenerationContext,
    ) -> Self {
        let file_path = file_path.into();
        let language = language_for(Path::new(&file_path)).to_string();
        Self {
            file_path,
            description: description.into(),
            language,
            context,
        }
    }
}

/// Produces file content on demand.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Generator backed by an external program.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Builds a generator from `[program, args...]`; `None` when empty.
    pub fn from_argv(argv: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec(), timeout))
    }
}

impl CodeGenerator for CommandGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let failure = |message: String| EngineError::Generation {
            path: PathBuf::from(&request.file_path),
            message,
        };

        let payload = serde_json::to_vec(request)?;
        let mut command = Command::new(&self.program);
        command.args(&self.args);

        let output = run_with_deadline(command, Some(payload), self.timeout, usize::MAX);
        if output.timed_out {
            return Err(failure(format!(
                "Generator timed out after {}s",
                self.timeout.as_secs()
            )));
        }
        if !output.success() {
            return Err(failure(output.error_text()));
        }

        Ok(strip_code_fences(&output.stdout))
    }
}

/// Language hint derived from a file extension.
pub fn language_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("py") => "python",
        Some("js" | "mjs" | "cjs") => "javascript",
        Some("ts") => "typescript",
        Some("jsx") => "jsx",
        Some("tsx") => "tsx",
        Some("rs") => "rust",
        Some("go") => "go",
        Some("java") => "java",
        Some("c" | "h") => "c",
        Some("cpp" | "hpp" | "cc") => "cpp",
        Some("html" | "htm") => "html",
        Some("css") => "css",
        Some("json") => "json",
        Some("toml") => "toml",
        Some("yaml" | "yml") => "yaml",
        Some("md") => "markdown",
        Some("sh") => "bash",
        Some("sql") => "sql",
        _ => "text",
    }
}

/// Removes a surrounding markdown code fence, if the whole text is one.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return text.to_string();
    };
    let Some(body) = rest.strip_suffix("```") else {
        return text.to_string();
    };

    // Drop the info string (```python) on the opening line
    let body = match body.find('\n') {
        Some(newline) => &body[newline + 1..],
        None => "",
    };
    let mut content = body.trim_end().to_string();
    content.push('\n');
    content
}
