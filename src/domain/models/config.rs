//! Engine configuration model.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::feedback_loop::LoopSettings;
use super::goal::SuccessCriteria;

/// Main configuration structure for the attractor engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Workspace allocation configuration
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Directory holding the per-entity goal and loop state files
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Convergence loop settings applied to every task
    #[serde(default)]
    pub convergence: LoopSettings,

    /// Default success bar applied to every task's goal
    #[serde(default)]
    pub default_criteria: SuccessCriteria,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".attractor/state")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            workspace: WorkspaceConfig::default(),
            state_dir: default_state_dir(),
            convergence: LoopSettings::default(),
            default_criteria: SuccessCriteria::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Maximum number of tasks iterating concurrently (1-100)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Hard wall-clock deadline per task, in seconds. Enforced by the
    /// scheduler independently of the loop's advisory budget check.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
}

const fn default_max_concurrency() -> usize {
    4
}

const fn default_task_timeout_secs() -> u64 {
    3600
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            task_timeout_secs: default_task_timeout_secs(),
        }
    }
}

/// Workspace allocation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkspaceConfig {
    /// Root directory under which per-task worktrees are created
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,

    /// Ref that task branches are created from
    #[serde(default = "default_base_ref")]
    pub base_ref: String,

    /// Prefix for task branch names
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".attractor/worktrees")
}

fn default_base_ref() -> String {
    "main".to_string()
}

fn default_branch_prefix() -> String {
    "attractor".to_string()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
            base_ref: default_base_ref(),
            branch_prefix: default_branch_prefix(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Optional directory for file output; stderr-only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}
