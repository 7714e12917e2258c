//! Execution tracking and batch reporting models.
//!
//! The scheduler wraps every submitted task in an [`ExecutionTask`] tying it
//! to its workspace, goal, and feedback loop, and snapshots the batch into an
//! [`ExecutionReport`] when the run settles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

use super::feedback_loop::LoopStatus;
use super::task::Task;

/// Status of an execution task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Registered, waiting for admission
    Pending,
    /// Admitted and iterating
    Running,
    /// Loop reached a policy outcome (converged, diverged, or escalated)
    Completed,
    /// Setup or execution error
    Failed,
    /// Loop or scheduler deadline expired
    Timeout,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Timeout)
    }
}

/// The scheduler's runtime wrapper around one submitted task.
///
/// Created at submission and mutated only by the scheduler; moved from the
/// active set to the completed list exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTask {
    /// The submitted task
    pub task: Task,
    /// Workspace path, once allocated
    pub workspace_path: Option<PathBuf>,
    /// Goal id, once created
    pub goal_id: Option<Uuid>,
    /// Feedback loop id, once started
    pub loop_id: Option<Uuid>,
    /// Current status
    pub status: ExecutionStatus,
    /// Terminal loop outcome, when the loop settled
    pub loop_status: Option<LoopStatus>,
    /// Iterations consumed
    pub iterations: u32,
    /// Error message, when failed
    pub error: Option<String>,
    /// When execution started
    pub started_at: Option<DateTime<Utc>>,
    /// When execution reached a terminal status
    pub ended_at: Option<DateTime<Utc>>,
}

impl ExecutionTask {
    /// Register a task in `pending`.
    pub fn new(task: Task) -> Self {
        Self {
            task,
            workspace_path: None,
            goal_id: None,
            loop_id: None,
            status: ExecutionStatus::Pending,
            loop_status: None,
            iterations: 0,
            error: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// Mark as running.
    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Settle into a terminal status. The terminal status is set at most
    /// once; a second settle attempt is ignored.
    pub fn settle(&mut self, status: ExecutionStatus, error: Option<String>) -> bool {
        debug_assert!(status.is_terminal());
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.error = error;
        self.ended_at = Some(Utc::now());
        true
    }
}

/// Point-in-time counts across the active and completed sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// Percentage of tasks in a terminal state; 0.0 when the batch is empty.
    pub completion_percent: f64,
}

/// Aggregate outcome figures for a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// completed / total * 100; 0.0 when the batch is empty.
    pub success_rate: f64,
    /// Total iterations consumed across all tasks.
    pub total_iterations: u32,
    /// Average iterations per settled task; 0.0 when nothing settled.
    pub average_iterations: f64,
    /// Loops that converged.
    pub converged: usize,
    /// Loops that diverged.
    pub diverged: usize,
    /// Loops that escalated.
    pub escalated: usize,
}

/// Snapshot of all execution tasks at batch end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Every execution task, in submission order.
    pub tasks: Vec<ExecutionTask>,
    /// Per-status counts and completion percentage.
    pub progress: ProgressSummary,
    /// Success rate and iteration/outcome aggregates.
    pub summary: BatchSummary,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
}

impl ExecutionReport {
    /// Build a report from a snapshot of execution tasks.
    pub fn from_tasks(tasks: Vec<ExecutionTask>) -> Self {
        let progress = summarize_progress(&tasks);
        let summary = summarize_batch(&tasks);
        Self {
            tasks,
            progress,
            summary,
            generated_at: Utc::now(),
        }
    }
}

/// Count tasks per status and derive the completion percentage.
pub fn summarize_progress(tasks: &[ExecutionTask]) -> ProgressSummary {
    let mut counts: HashMap<ExecutionStatus, usize> = HashMap::new();
    for task in tasks {
        *counts.entry(task.status).or_insert(0) += 1;
    }
    let total = tasks.len();
    let settled = tasks.iter().filter(|t| t.status.is_terminal()).count();
    #[allow(clippy::cast_precision_loss)]
    let completion_percent = if total == 0 {
        0.0
    } else {
        settled as f64 / total as f64 * 100.0
    };
    ProgressSummary {
        total,
        pending: counts.get(&ExecutionStatus::Pending).copied().unwrap_or(0),
        running: counts.get(&ExecutionStatus::Running).copied().unwrap_or(0),
        completed: counts.get(&ExecutionStatus::Completed).copied().unwrap_or(0),
        failed: counts.get(&ExecutionStatus::Failed).copied().unwrap_or(0),
        timed_out: counts.get(&ExecutionStatus::Timeout).copied().unwrap_or(0),
        completion_percent,
    }
}

/// Derive success rate, iteration aggregates, and loop-outcome counts.
pub fn summarize_batch(tasks: &[ExecutionTask]) -> BatchSummary {
    let total = tasks.len();
    let completed = tasks
        .iter()
        .filter(|t| t.status == ExecutionStatus::Completed)
        .count();
    let settled = tasks.iter().filter(|t| t.status.is_terminal()).count();
    let total_iterations: u32 = tasks.iter().map(|t| t.iterations).sum();

    #[allow(clippy::cast_precision_loss)]
    let success_rate = if total == 0 {
        0.0
    } else {
        completed as f64 / total as f64 * 100.0
    };
    #[allow(clippy::cast_precision_loss)]
    let average_iterations = if settled == 0 {
        0.0
    } else {
        f64::from(total_iterations) / settled as f64
    };

    let outcome_count = |status: LoopStatus| {
        tasks
            .iter()
            .filter(|t| t.loop_status == Some(status))
            .count()
    };

    BatchSummary {
        success_rate,
        total_iterations,
        average_iterations,
        converged: outcome_count(LoopStatus::Converged),
        diverged: outcome_count(LoopStatus::Diverged),
        escalated: outcome_count(LoopStatus::Escalated),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settled_task(status: ExecutionStatus, loop_status: Option<LoopStatus>, iterations: u32) -> ExecutionTask {
        let mut exec = ExecutionTask::new(Task::new("t", "d"));
        exec.start();
        exec.iterations = iterations;
        exec.loop_status = loop_status;
        exec.settle(status, None);
        exec
    }

    #[test]
    fn test_settle_is_set_once() {
        let mut exec = ExecutionTask::new(Task::new("t", "d"));
        exec.start();
        assert!(exec.settle(ExecutionStatus::Completed, None));
        assert!(!exec.settle(ExecutionStatus::Failed, Some("late".into())));
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert!(exec.error.is_none());
    }

    #[test]
    fn test_success_rate_zero_for_empty_batch() {
        let summary = summarize_batch(&[]);
        assert!((summary.success_rate - 0.0).abs() < f64::EPSILON);
        assert!((summary.average_iterations - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_success_rate_arithmetic() {
        let tasks = vec![
            settled_task(ExecutionStatus::Completed, Some(LoopStatus::Converged), 4),
            settled_task(ExecutionStatus::Completed, Some(LoopStatus::Diverged), 6),
            settled_task(ExecutionStatus::Failed, None, 0),
            settled_task(ExecutionStatus::Timeout, Some(LoopStatus::Timeout), 10),
        ];
        let summary = summarize_batch(&tasks);
        assert!((summary.success_rate - 50.0).abs() < f64::EPSILON);
        assert_eq!(summary.total_iterations, 20);
        assert!((summary.average_iterations - 5.0).abs() < f64::EPSILON);
        assert_eq!(summary.converged, 1);
        assert_eq!(summary.diverged, 1);
        assert_eq!(summary.escalated, 0);
    }

    #[test]
    fn test_progress_counts_and_completion() {
        let mut pending = ExecutionTask::new(Task::new("p", "d"));
        pending.status = ExecutionStatus::Pending;
        let mut running = ExecutionTask::new(Task::new("r", "d"));
        running.start();

        let tasks = vec![
            pending,
            running,
            settled_task(ExecutionStatus::Completed, Some(LoopStatus::Converged), 2),
            settled_task(ExecutionStatus::Failed, None, 0),
        ];
        let progress = summarize_progress(&tasks);
        assert_eq!(progress.total, 4);
        assert_eq!(progress.pending, 1);
        assert_eq!(progress.running, 1);
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.failed, 1);
        assert!((progress.completion_percent - 50.0).abs() < f64::EPSILON);
    }
}
