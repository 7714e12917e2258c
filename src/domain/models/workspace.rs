//! Workspace domain model.
//!
//! Git worktrees provide isolated workspaces for tasks, enabling parallel
//! execution without conflicts. Exactly one live workspace exists per task id;
//! workspaces are destroyed only by explicit bulk cleanup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Lifecycle status of a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    /// Active and in use
    Active,
    /// Work finished successfully
    Completed,
    /// Work failed or did not reach its goal
    Failed,
    /// Cleaned up and removed
    Cleaned,
}

impl Default for WorkspaceStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl WorkspaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cleaned => "cleaned",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cleaned" => Some(Self::Cleaned),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cleaned)
    }
}

/// An isolated, branch-scoped working copy dedicated to one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// The task this workspace belongs to
    pub task_id: Uuid,
    /// Worktree filesystem path
    pub path: PathBuf,
    /// Branch name
    pub branch: String,
    /// Current status
    pub status: WorkspaceStatus,
    /// When created
    pub created_at: DateTime<Utc>,
}

impl Workspace {
    /// Create a new active workspace record.
    pub fn new(task_id: Uuid, path: impl Into<PathBuf>, branch: impl Into<String>) -> Self {
        Self {
            task_id,
            path: path.into(),
            branch: branch.into(),
            status: WorkspaceStatus::Active,
            created_at: Utc::now(),
        }
    }

    /// Generate a branch name from a task id.
    pub fn branch_name_for_task(prefix: &str, task_id: Uuid) -> String {
        format!("{}/task-{}", prefix, &task_id.to_string()[..8])
    }

    /// Generate a worktree path from a task id.
    pub fn path_for_task(root: &std::path::Path, task_id: Uuid) -> PathBuf {
        root.join(format!("task-{task_id}"))
    }
}
