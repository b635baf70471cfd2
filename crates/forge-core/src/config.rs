//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.
//! Values are layered: defaults, then a JSON file, then `FORGE_*`
//! environment variables, then whatever the caller sets explicitly.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, IoResultExt, Result};

pub const ENV_MAX_DURATION_MINUTES: &str = "FORGE_MAX_DURATION_MINUTES";
pub const ENV_MAX_STEPS: &str = "FORGE_MAX_STEPS";
pub const ENV_GROUP_DELAY_MS: &str = "FORGE_GROUP_DELAY_MS";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: LimitsConfig,
    pub retry: RetryConfig,
    pub pool: PoolConfig,
    pub snapshots: SnapshotConfig,
    pub commands: CommandConfig,
    pub generator: GeneratorConfig,
}

/// Run-level budgets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Wall-clock budget for one run
    pub max_duration_secs: u64,

    /// Plans longer than this are rejected
    pub max_steps: usize,

    /// Sleep between pause checks
    pub pause_poll_ms: u64,

    /// Pause inserted between groups
    pub group_delay_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 30 * 60,
            max_steps: 50,
            pause_poll_ms: 500,
            group_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub confidence_threshold: f64,
    pub history_limit: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            confidence_threshold: 0.6,
            history_limit: 50,
        }
    }
}

/// Which pool implementation runs parallel groups.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Process,
    Thread,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Process => "process",
            StrategyKind::Thread => "thread",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Batches smaller than this run sequentially
    pub min_batch_size: usize,

    /// Worker count; detected from the host when unset
    pub workers: Option<usize>,

    /// Tasks after which the pool is recreated; detected when unset
    pub recycle_after: Option<usize>,

    pub strategy: StrategyKind,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_batch_size: 2,
            workers: None,
            recycle_after: None,
            strategy: StrategyKind::Process,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SnapshotConfig {
    pub enabled: bool,

    /// Backup root; `$XDG_DATA_HOME/forge/snapshots` when unset
    pub directory: Option<PathBuf>,

    pub max_snapshots: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            max_snapshots: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CommandConfig {
    pub default_timeout_secs: u64,

    /// Per-stream capture limit
    pub max_output_bytes: usize,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 120,
            max_output_bytes: 1024 * 1024,
        }
    }
}

/// External program used to generate file content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Program and arguments; no generation is available when unset
    pub command: Option<Vec<String>>,

    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: 60,
        }
    }
}

impl EngineConfig {
    /// Loads a JSON config file. Missing sections take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).fs_context(path)?;
        serde_json::from_str(&json).map_err(|e| {
            EngineError::configuration(format!("Invalid config '{}': {e}", path.display()))
        })
    }

    /// Applies `FORGE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup.
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(minutes) = lookup(ENV_MAX_DURATION_MINUTES) {
            let minutes: u64 = parse_var(ENV_MAX_DURATION_MINUTES, &minutes)?;
            self.limits.max_duration_secs = minutes * 60;
        }
        if let Some(steps) = lookup(ENV_MAX_STEPS) {
            self.limits.max_steps = parse_var(ENV_MAX_STEPS, &steps)?;
        }
        if let Some(delay) = lookup(ENV_GROUP_DELAY_MS) {
            self.limits.group_delay_ms = parse_var(ENV_GROUP_DELAY_MS, &delay)?;
        }
        Ok(())
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        EngineError::invalid_input(key).with_reason(format!("'{value}' is not a valid number"))
    })
}
