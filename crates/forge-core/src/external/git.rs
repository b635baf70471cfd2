//! Version control collaborator.

use std::{
    path::Path,
    process::{Command, Output},
};

use log::{debug, info};

/// Outcome of a version control operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcsOutcome {
    pub success: bool,
    pub message: String,
}

impl VcsOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Repository primitives used by commit steps.
pub trait VersionControl: Send + Sync {
    fn is_repository(&self, path: &Path) -> bool;

    fn init(&self, path: &Path) -> VcsOutcome;

    /// Stages every change under `path` and commits it.
    fn commit_all(&self, path: &Path, message: &str) -> VcsOutcome;
}

const DEFAULT_GITIGNORE: &str = "\
# Python
__pycache__/
*.py[cod]
.venv/
venv/
*.egg-info/

# Node
node_modules/
dist/

# Rust
target/

# Editors and OS
.idea/
.vscode/
.DS_Store

# Environment
.env
";

const FALLBACK_NAME: &str = "forge";
const FALLBACK_EMAIL: &str = "forge@localhost";

/// Version control through the `git` executable.
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    fn git(&self, path: &Path, args: &[&str]) -> std::io::Result<Output> {
        debug!("git {} in {}", args.join(" "), path.display());
        Command::new("git").args(args).current_dir(path).output()
    }

    fn has_identity(&self, path: &Path) -> bool {
        ["user.name", "user.email"].iter().all(|key| {
            self.git(path, &["config", "--get", key])
                .map(|out| out.status.success() && !out.stdout.is_empty())
                .unwrap_or(false)
        })
    }
}

fn combined(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(stderr.trim());
    }
    text
}

impl VersionControl for GitCli {
    fn is_repository(&self, path: &Path) -> bool {
        path.join(".git").exists()
    }

    fn init(&self, path: &Path) -> VcsOutcome {
        if let Err(e) = std::fs::create_dir_all(path) {
            return VcsOutcome::failed(format!("Cannot create '{}': {e}", path.display()));
        }

        match self.git(path, &["init"]) {
            Ok(out) if out.status.success() => {}
            Ok(out) => return VcsOutcome::failed(format!("git init failed: {}", combined(&out))),
            Err(e) => return VcsOutcome::failed(format!("Failed to run git: {e}")),
        }

        let gitignore = path.join(".gitignore");
        if !gitignore.exists() {
            if let Err(e) = std::fs::write(&gitignore, DEFAULT_GITIGNORE) {
                return VcsOutcome::failed(format!("Cannot write .gitignore: {e}"));
            }
        }

        info!("Initialized repository at {}", path.display());
        VcsOutcome::ok(format!("Initialized repository at {}", path.display()))
    }

    fn commit_all(&self, path: &Path, message: &str) -> VcsOutcome {
        match self.git(path, &["add", "-A"]) {
            Ok(out) if out.status.success() => {}
            Ok(out) => return VcsOutcome::failed(format!("git add failed: {}", combined(&out))),
            Err(e) => return VcsOutcome::failed(format!("Failed to run git: {e}")),
        }

        let name = format!("user.name={FALLBACK_NAME}");
        let email = format!("user.email={FALLBACK_EMAIL}");
        let mut args: Vec<&str> = Vec::new();
        if !self.has_identity(path) {
            args.extend(["-c", name.as_str(), "-c", email.as_str()]);
        }
        args.extend(["commit", "-m", message]);

        match self.git(path, &args) {
            Ok(out) if out.status.success() => VcsOutcome::ok(format!("Committed: {message}")),
            Ok(out) => {
                let text = combined(&out);
                if text.contains("nothing to commit") || text.contains("nothing added to commit") {
                    VcsOutcome::ok("Nothing to commit")
                } else {
                    VcsOutcome::failed(format!("git commit failed: {text}"))
                }
            }
            Err(e) => VcsOutcome::failed(format!("Failed to run git: {e}")),
        }
    }
}
