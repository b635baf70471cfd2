//! Plan model definition and loading.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::Step;
use crate::error::{IoResultExt, Result};

/// An ordered list of steps describing a build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    /// Name of the project; also the default target directory name
    pub project_name: String,

    /// Steps in execution order
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Packages the project depends on, passed through to code generation
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Whether the plan expects a repository to be initialised
    #[serde(default)]
    pub git_init: bool,
}

impl Plan {
    /// Builds a plan, renumbering step indices to match their position.
    pub fn new(project_name: impl Into<String>, steps: Vec<Step>) -> Self {
        let steps = steps
            .into_iter()
            .enumerate()
            .map(|(index, mut step)| {
                step.index = index;
                step
            })
            .collect();

        Self {
            project_name: project_name.into(),
            steps,
            dependencies: Vec::new(),
            git_init: false,
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Parses a plan from JSON.
    ///
    /// Step indices always follow array position; any `index` present in the
    /// document is overwritten.
    pub fn from_json(json: &str) -> Result<Self> {
        let plan: Plan = serde_json::from_str(json)?;
        let Plan {
            project_name,
            steps,
            dependencies,
            git_init,
        } = plan;

        let mut plan = Plan::new(project_name, steps).with_dependencies(dependencies);
        plan.git_init = git_init;
        Ok(plan)
    }

    /// Reads and parses a plan file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).fs_context(path)?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Context handed to the code generator for every file in this plan.
    pub fn generation_context(&self) -> GenerationContext {
        GenerationContext {
            project_name: self.project_name.clone(),
            dependencies: self.dependencies.clone(),
        }
    }
}

/// Plain-data project context attached to each worker task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationContext {
    pub project_name: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}
