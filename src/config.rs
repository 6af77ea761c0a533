use std::{path::Path, time::Duration};

use serde::Deserialize;

use crate::error::{Result, TrainerErr};

/// What the worker does with `Save`/`Backup` requests once the goal is reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalPolicy {
    /// A converged artifact is immutable: no further checkpoints.
    #[default]
    Suppress,
    /// Keep honoring explicit checkpoint requests after the goal.
    Allow,
}

/// Capability a declarative hook exercises when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookAction {
    Checkpoint,
    Backup,
    Preview,
    Log,
}

/// A scheduled hook declared in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct HookSpec {
    /// Signed period in seconds: positive fires once, negative repeats, zero is disabled.
    pub period_secs: f64,
    pub action: HookAction,
}

/// Runtime knobs for the worker/controller pair.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub checkpoint_interval_secs: u64,
    pub controller_quantum_ms: u64,
    pub worker_idle_ms: u64,
    pub readiness_timeout_secs: u64,
    pub max_preview_height: u32,
    pub history_windows: Vec<usize>,
    pub no_preview: bool,
    /// Never checkpoint, show a single debug preview and pace steps with `worker_idle_ms`.
    pub debug: bool,
    pub goal_policy: GoalPolicy,
    pub hooks: Vec<HookSpec>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval_secs: 25 * 60,
            controller_quantum_ms: 30,
            worker_idle_ms: 5,
            readiness_timeout_secs: 600,
            max_preview_height: 800,
            history_windows: vec![500, 5000, 10000, 50000, 0],
            no_preview: false,
            debug: false,
            goal_policy: GoalPolicy::Suppress,
            hooks: Vec::new(),
        }
    }
}

impl TrainerConfig {
    /// Loads a configuration from a JSON file. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns `TrainerErr::Io` if the file cannot be read, or `TrainerErr::Config`
    /// if it is not valid JSON or fails validation.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Parses and validates a configuration from a JSON string.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects values that would stall or spin either loop.
    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_interval_secs == 0 {
            return Err(TrainerErr::Config(
                "checkpoint_interval_secs must be positive".into(),
            ));
        }
        if self.controller_quantum_ms == 0 {
            return Err(TrainerErr::Config(
                "controller_quantum_ms must be positive".into(),
            ));
        }
        if self.readiness_timeout_secs == 0 {
            return Err(TrainerErr::Config(
                "readiness_timeout_secs must be positive".into(),
            ));
        }
        if self.max_preview_height == 0 {
            return Err(TrainerErr::Config(
                "max_preview_height must be positive".into(),
            ));
        }
        if self.history_windows.is_empty() {
            return Err(TrainerErr::Config(
                "history_windows must not be empty".into(),
            ));
        }
        if let Some(hook) = self
            .hooks
            .iter()
            .find(|h| Duration::try_from_secs_f64(h.period_secs.abs()).is_err())
        {
            return Err(TrainerErr::Config(format!(
                "hook period out of range: {}",
                hook.period_secs
            )));
        }
        Ok(())
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }

    pub fn controller_quantum(&self) -> Duration {
        Duration::from_millis(self.controller_quantum_ms)
    }

    pub fn worker_idle(&self) -> Duration {
        Duration::from_millis(self.worker_idle_ms)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }
}
