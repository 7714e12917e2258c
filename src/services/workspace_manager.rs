//! Workspace manager.
//!
//! Provides git worktree management for task isolation. Each task gets its
//! own worktree branched from the configured base ref, allowing parallel
//! execution without git conflicts.
//!
//! # Naming convention
//!
//! - Branch: `<prefix>/task-<short_task_id>` (e.g. `attractor/task-a1b2c3d4`)
//! - Worktree path: `<root>/task-<full_task_id>`

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::models::{Task, Workspace, WorkspaceConfig, WorkspaceStatus};

/// Errors raised while allocating or destroying workspaces.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Workspace already allocated for task {0}")]
    AlreadyAllocated(Uuid),

    #[error("Branch '{0}' already exists")]
    BranchExists(String),

    #[error("Worktree path '{0}' already exists")]
    PathExists(PathBuf),

    #[error("git {action} failed: {stderr}")]
    Git { action: &'static str, stderr: String },

    #[error("Workspace io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Service that allocates one isolated git worktree per task and destroys
/// them in a single best-effort cleanup pass at the end of a run.
///
/// A second `create` for a task id that already holds a live workspace fails
/// explicitly with [`WorkspaceError::AlreadyAllocated`]; the scheduler
/// allocates exactly once per task, so a duplicate signals a caller bug.
pub struct WorkspaceManager {
    repo_root: PathBuf,
    config: WorkspaceConfig,
    workspaces: RwLock<HashMap<Uuid, Workspace>>,
}

impl WorkspaceManager {
    /// Create a manager for the repository at `repo_root`.
    pub fn new(repo_root: impl Into<PathBuf>, config: WorkspaceConfig) -> Self {
        Self {
            repo_root: repo_root.into(),
            config,
            workspaces: RwLock::new(HashMap::new()),
        }
    }

    /// Absolute worktree root directory.
    fn worktree_root(&self) -> PathBuf {
        if self.config.root.is_absolute() {
            self.config.root.clone()
        } else {
            self.repo_root.join(&self.config.root)
        }
    }

    /// Allocate a uniquely named worktree for a task.
    ///
    /// Fails when the task already holds a workspace, when the target branch
    /// or path exists in a conflicting state, or when the git operation
    /// itself fails. A stale directory at the target path that is not a
    /// valid worktree (no `.git` file) is removed before creation.
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub async fn create(&self, task: &Task) -> Result<Workspace, WorkspaceError> {
        {
            let workspaces = self.workspaces.read().await;
            if workspaces.contains_key(&task.id) {
                return Err(WorkspaceError::AlreadyAllocated(task.id));
            }
        }

        let branch = Workspace::branch_name_for_task(&self.config.branch_prefix, task.id);
        let path = Workspace::path_for_task(&self.worktree_root(), task.id);

        if self.branch_exists(&branch).await? {
            return Err(WorkspaceError::BranchExists(branch));
        }

        if path.exists() {
            if path.join(".git").is_file() {
                return Err(WorkspaceError::PathExists(path));
            }
            // Stale directory without a .git file; not a worktree.
            warn!(path = %path.display(), "Removing invalid directory at worktree path");
            tokio::fs::remove_dir_all(&path).await?;
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        self.add_worktree(&branch, &path).await?;

        let workspace = Workspace::new(task.id, path, branch);
        info!(
            task_id = %task.id,
            branch = %workspace.branch,
            path = %workspace.path.display(),
            "Workspace created"
        );

        let mut workspaces = self.workspaces.write().await;
        // Re-check under the write lock; two concurrent creates for one id
        // must not both succeed.
        if workspaces.contains_key(&task.id) {
            return Err(WorkspaceError::AlreadyAllocated(task.id));
        }
        workspaces.insert(task.id, workspace.clone());
        Ok(workspace)
    }

    /// Record a terminal status for reporting. No filesystem side effects.
    pub async fn set_status(&self, task_id: Uuid, status: WorkspaceStatus) -> bool {
        let mut workspaces = self.workspaces.write().await;
        match workspaces.get_mut(&task_id) {
            Some(workspace) => {
                debug!(task_id = %task_id, status = status.as_str(), "Workspace status updated");
                workspace.status = status;
                true
            }
            None => {
                warn!(task_id = %task_id, "set_status for unknown workspace");
                false
            }
        }
    }

    /// Look up the workspace allocated for a task.
    pub async fn get(&self, task_id: Uuid) -> Option<Workspace> {
        self.workspaces.read().await.get(&task_id).cloned()
    }

    /// Number of live workspaces.
    pub async fn active_count(&self) -> usize {
        self.workspaces.read().await.len()
    }

    /// Best-effort removal of every workspace created this run.
    ///
    /// Idempotent: calling it again when nothing remains is a no-op. An
    /// already-missing worktree never raises; individual removal failures
    /// are logged and skipped. Returns the number of workspaces processed.
    #[instrument(skip(self))]
    pub async fn cleanup_all(&self) -> usize {
        let drained: Vec<Workspace> = {
            let mut workspaces = self.workspaces.write().await;
            workspaces.drain().map(|(_, ws)| ws).collect()
        };

        let count = drained.len();
        // Removal is sequential; concurrent worktree removals contend on the
        // repository's administrative files.
        for workspace in &drained {
            self.remove_workspace(workspace).await;
        }
        if count > 0 {
            info!(count, "Workspace cleanup finished");
        }
        count
    }

    async fn remove_workspace(&self, workspace: &Workspace) {
        let path = &workspace.path;
        if path.exists() {
            if let Err(stderr) = self
                .run_git(
                    "worktree remove",
                    &["worktree", "remove", "--force", &path.to_string_lossy()],
                )
                .await
            {
                warn!(
                    path = %path.display(),
                    stderr = %stderr,
                    "git worktree remove failed, falling back to directory removal"
                );
                if let Err(err) = tokio::fs::remove_dir_all(path).await {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %path.display(), error = %err, "Failed to remove worktree directory");
                    }
                }
            }
        } else {
            debug!(path = %path.display(), "Worktree already gone");
        }

        // The branch is per-run scratch state; best-effort delete.
        if let Err(stderr) = self
            .run_git("branch delete", &["branch", "-D", &workspace.branch])
            .await
        {
            warn!(branch = %workspace.branch, stderr = %stderr, "Failed to delete task branch");
        }
    }

    async fn add_worktree(&self, branch: &str, path: &Path) -> Result<(), WorkspaceError> {
        let output = Command::new("git")
            .current_dir(&self.repo_root)
            .args([
                "worktree",
                "add",
                "-b",
                branch,
                &path.to_string_lossy(),
                &self.config.base_ref,
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(WorkspaceError::Git {
                action: "worktree add",
                stderr,
            });
        }
        Ok(())
    }

    async fn branch_exists(&self, branch: &str) -> Result<bool, WorkspaceError> {
        let status = Command::new("git")
            .current_dir(&self.repo_root)
            .args([
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        Ok(status.success())
    }

    async fn run_git(&self, action: &'static str, args: &[&str]) -> Result<(), String> {
        let output = Command::new("git")
            .current_dir(&self.repo_root)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| format!("failed to spawn git {action}: {err}"))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    fn git(repo: &Path, args: &[&str]) {
        let status = StdCommand::new("git")
            .current_dir(repo)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .expect("git invocation");
        assert!(status.success(), "git {args:?} failed");
    }

    fn init_test_repo() -> TempDir {
        let dir = TempDir::new().expect("temp dir");
        let repo = dir.path();
        git(repo, &["init", "-b", "main"]);
        git(repo, &["config", "user.email", "test@example.com"]);
        git(repo, &["config", "user.name", "Test"]);
        std::fs::write(repo.join("README.md"), "# fixture\n").unwrap();
        git(repo, &["add", "."]);
        git(repo, &["commit", "-m", "initial"]);
        dir
    }

    fn manager(repo: &TempDir) -> WorkspaceManager {
        WorkspaceManager::new(repo.path(), WorkspaceConfig::default())
    }

    #[tokio::test]
    async fn test_create_allocates_worktree() {
        let repo = init_test_repo();
        let mgr = manager(&repo);
        let task = Task::new("build it", "desc");

        let ws = mgr.create(&task).await.expect("create");
        assert!(ws.path.join(".git").is_file());
        assert_eq!(ws.status, WorkspaceStatus::Active);
        assert_eq!(mgr.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_create_fails_explicitly() {
        let repo = init_test_repo();
        let mgr = manager(&repo);
        let task = Task::new("t", "d");

        mgr.create(&task).await.expect("first create");
        let err = mgr.create(&task).await.expect_err("second create must fail");
        assert!(matches!(err, WorkspaceError::AlreadyAllocated(id) if id == task.id));
    }

    #[tokio::test]
    async fn test_conflicting_branch_fails() {
        let repo = init_test_repo();
        let mgr = manager(&repo);
        let task = Task::new("t", "d");

        let branch = Workspace::branch_name_for_task("attractor", task.id);
        git(repo.path(), &["branch", &branch]);

        let err = mgr.create(&task).await.expect_err("branch conflict");
        assert!(matches!(err, WorkspaceError::BranchExists(_)));
    }

    #[tokio::test]
    async fn test_set_status_records_terminal_state() {
        let repo = init_test_repo();
        let mgr = manager(&repo);
        let task = Task::new("t", "d");
        mgr.create(&task).await.expect("create");

        assert!(mgr.set_status(task.id, WorkspaceStatus::Completed).await);
        assert_eq!(
            mgr.get(task.id).await.unwrap().status,
            WorkspaceStatus::Completed
        );
        assert!(!mgr.set_status(Uuid::new_v4(), WorkspaceStatus::Failed).await);
    }

    #[tokio::test]
    async fn test_cleanup_all_is_idempotent() {
        let repo = init_test_repo();
        let mgr = manager(&repo);
        let first = Task::new("a", "d");
        let second = Task::new("b", "d");
        let ws = mgr.create(&first).await.expect("create a");
        mgr.create(&second).await.expect("create b");

        assert_eq!(mgr.cleanup_all().await, 2);
        assert!(!ws.path.exists());
        assert_eq!(mgr.active_count().await, 0);

        // Second pass has nothing to do and must not error.
        assert_eq!(mgr.cleanup_all().await, 0);
        assert_eq!(mgr.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_tolerates_missing_worktree() {
        let repo = init_test_repo();
        let mgr = manager(&repo);
        let task = Task::new("t", "d");
        let ws = mgr.create(&task).await.expect("create");

        // Simulate an externally deleted worktree.
        std::fs::remove_dir_all(&ws.path).unwrap();
        assert_eq!(mgr.cleanup_all().await, 1);
    }
}
