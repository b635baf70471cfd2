//! Step model definition and its wire format.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One unit of work within a plan.
///
/// On the wire a step is a flat JSON object tagged by `action`:
///
/// ```json
/// { "action": "create_file", "file_path": "src/app.py", "description": "entry point" }
/// ```
///
/// Tags the engine does not recognise deserialize to [`Action::Unknown`]
/// instead of failing the whole plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub struct Step {
    /// Position of the step within its plan (0-indexed)
    pub index: usize,

    /// What the step does, with its action-specific payload
    pub action: Action,

    /// Human readable description, also used as the generation prompt
    pub description: String,
}

/// Action-specific payload of a step.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Create the project root and each listed folder beneath it
    CreateStructure { folders: Vec<String> },

    /// Write a file, generating content when none is inlined
    CreateFile {
        file_path: String,
        content: Option<String>,
    },

    /// Run a shell command inside the project
    RunCommand {
        command: String,
        cwd: Option<String>,
        timeout_secs: Option<u64>,
    },

    /// Stage everything and commit, initialising the repository if needed
    GitCommit {
        message: Option<String>,
        project_path: Option<String>,
    },

    /// An action tag this engine does not implement
    Unknown { name: String },
}

/// Payload-free discriminant of [`Action`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateStructure,
    CreateFile,
    RunCommand,
    GitCommit,
    Unknown,
}

impl ActionKind {
    /// Wire tag for the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::CreateStructure => "create_structure",
            ActionKind::CreateFile => "create_file",
            ActionKind::RunCommand => "run_command",
            ActionKind::GitCommit => "git_commit",
            ActionKind::Unknown => "unknown",
        }
    }
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::CreateStructure { .. } => ActionKind::CreateStructure,
            Action::CreateFile { .. } => ActionKind::CreateFile,
            Action::RunCommand { .. } => ActionKind::RunCommand,
            Action::GitCommit { .. } => ActionKind::GitCommit,
            Action::Unknown { .. } => ActionKind::Unknown,
        }
    }

    /// Tag as written in the plan, including unrecognised ones.
    pub fn tag(&self) -> &str {
        match self {
            Action::Unknown { name } => name,
            other => other.kind().as_str(),
        }
    }
}

impl Step {
    /// Creates a step at index 0; [`crate::models::Plan::new`] renumbers.
    pub fn new(action: Action, description: impl Into<String>) -> Self {
        Self {
            index: 0,
            action,
            description: description.into(),
        }
    }

    pub fn create_structure<I, S>(folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            Action::CreateStructure {
                folders: folders.into_iter().map(Into::into).collect(),
            },
            "Create project structure",
        )
    }

    pub fn create_file(file_path: impl Into<String>, content: Option<&str>) -> Self {
        let file_path = file_path.into();
        let description = format!("Create {file_path}");
        Self::new(
            Action::CreateFile {
                file_path,
                content: content.map(String::from),
            },
            description,
        )
    }

    pub fn run_command(command: impl Into<String>) -> Self {
        let command = command.into();
        let description = format!("Run `{command}`");
        Self::new(
            Action::RunCommand {
                command,
                cwd: None,
                timeout_secs: None,
            },
            description,
        )
    }

    pub fn git_commit(message: impl Into<String>) -> Self {
        Self::new(
            Action::GitCommit {
                message: Some(message.into()),
                project_path: None,
            },
            "Commit changes",
        )
    }

    /// Replaces the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }
}

// ============================================================================
// Wire representation
// ============================================================================

#[derive(Serialize, Deserialize)]
struct RawStep {
    action: String,
    #[serde(default)]
    index: usize,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

#[derive(Deserialize)]
struct StructurePayload {
    #[serde(default, alias = "details")]
    folders: Vec<String>,
}

#[derive(Deserialize)]
struct FilePayload {
    file_path: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct CommandPayload {
    command: String,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default, alias = "timeout")]
    timeout_secs: Option<u64>,
}

#[derive(Deserialize)]
struct CommitPayload {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    project_path: Option<String>,
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    action: &str,
    payload: Map<String, Value>,
) -> Result<T, String> {
    serde_json::from_value(Value::Object(payload))
        .map_err(|e| format!("Invalid payload for action '{action}': {e}"))
}

impl TryFrom<RawStep> for Step {
    type Error = String;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let RawStep {
            action,
            index,
            description,
            payload,
        } = raw;

        let action = match action.as_str() {
            "create_structure" => {
                let p: StructurePayload = parse_payload(&action, payload)?;
                Action::CreateStructure { folders: p.folders }
            }
            "create_file" => {
                let p: FilePayload = parse_payload(&action, payload)?;
                Action::CreateFile {
                    file_path: p.file_path,
                    content: p.content,
                }
            }
            "run_command" => {
                let p: CommandPayload = parse_payload(&action, payload)?;
                Action::RunCommand {
                    command: p.command,
                    cwd: p.cwd,
                    timeout_secs: p.timeout_secs,
                }
            }
            "git_commit" => {
                let p: CommitPayload = parse_payload(&action, payload)?;
                Action::GitCommit {
                    message: p.message,
                    project_path: p.project_path,
                }
            }
            _ => Action::Unknown { name: action },
        };

        Ok(Step {
            index,
            action,
            description,
        })
    }
}

impl From<Step> for RawStep {
    fn from(step: Step) -> Self {
        let mut payload = Map::new();
        let tag = step.action.tag().to_string();

        match step.action {
            Action::CreateStructure { folders } => {
                payload.insert("folders".into(), Value::from(folders));
            }
            Action::CreateFile { file_path, content } => {
                payload.insert("file_path".into(), Value::from(file_path));
                if let Some(content) = content {
                    payload.insert("content".into(), Value::from(content));
                }
            }
            Action::RunCommand {
                command,
                cwd,
                timeout_secs,
            } => {
                payload.insert("command".into(), Value::from(command));
                if let Some(cwd) = cwd {
                    payload.insert("cwd".into(), Value::from(cwd));
                }
                if let Some(timeout) = timeout_secs {
                    payload.insert("timeout_secs".into(), Value::from(timeout));
                }
            }
            Action::GitCommit {
                message,
                project_path,
            } => {
                if let Some(message) = message {
                    payload.insert("message".into(), Value::from(message));
                }
                if let Some(path) = project_path {
                    payload.insert("project_path".into(), Value::from(path));
                }
            }
            Action::Unknown { .. } => {}
        }

        RawStep {
            action: tag,
            index: step.index,
            description: step.description,
            payload,
        }
    }
}
