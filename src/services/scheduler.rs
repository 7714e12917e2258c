//! Parallel scheduler.
//!
//! Top-level orchestrator for batch execution. For every submitted task it
//! allocates a workspace, creates a goal with the configured default success
//! bar, and starts a feedback loop; it then admits tasks FIFO into execution
//! up to the concurrency bound and drives each admitted task's convergence
//! loop until a terminal state.
//!
//! Completion is reclaimed through [`JoinSet`] futures that carry the task's
//! own id, never by re-probing in-flight work. Each task runs under a hard
//! wall-clock deadline (`tokio::time::timeout`), so a stalled collector
//! cannot block a task past its budget.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    EngineConfig, ExecutionReport, ExecutionStatus, ExecutionTask, LoopStatus, ProgressSummary,
    SuccessCriteria, SchedulerConfig, Task, Workspace, WorkspaceStatus,
};
use crate::domain::models::execution::summarize_progress;
use crate::domain::ports::MetricsCollector;
use crate::infrastructure::store::StoreError;
use crate::services::goal_store::{CreateGoalParams, GoalStore};
use crate::services::loop_controller::LoopController;
use crate::services::workspace_manager::WorkspaceManager;

/// Event emitted during batch execution.
///
/// Events are best-effort observability for the host process; a missing or
/// slow receiver never affects execution.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum ExecutionEvent {
    /// Batch execution started.
    BatchStarted { total_tasks: usize },
    /// A task was admitted and began iterating.
    TaskStarted { task_id: Uuid, title: String },
    /// One convergence iteration was evaluated.
    IterationCompleted {
        task_id: Uuid,
        iteration: u32,
        status: LoopStatus,
    },
    /// A task reached a terminal status.
    TaskSettled {
        task_id: Uuid,
        status: ExecutionStatus,
        loop_status: Option<LoopStatus>,
        iterations: u32,
    },
    /// Batch execution finished.
    BatchCompleted { report: ExecutionReport },
}

/// How a spawned task worker finished.
#[derive(Debug)]
enum TaskOutcome {
    /// The loop settled into a terminal state.
    Settled {
        loop_status: LoopStatus,
        iterations: u32,
    },
    /// Collection or controller failure; no further iterations were run.
    Crashed { error: String },
    /// The scheduler's hard deadline fired.
    DeadlineExceeded,
}

/// Execution state owned by one scheduler instance.
///
/// Tasks move from the active map to the completed list exactly once;
/// `order` preserves submission order for reporting.
#[derive(Debug, Default)]
struct SchedulerState {
    order: Vec<Uuid>,
    active: HashMap<Uuid, ExecutionTask>,
    completed: Vec<ExecutionTask>,
}

impl SchedulerState {
    fn snapshot(&self) -> Vec<ExecutionTask> {
        self.order
            .iter()
            .filter_map(|id| {
                self.completed
                    .iter()
                    .find(|t| t.task.id == *id)
                    .or_else(|| self.active.get(id))
                    .cloned()
            })
            .collect()
    }
}

/// Orchestrates a batch of tasks under a concurrency bound.
pub struct ParallelScheduler {
    config: SchedulerConfig,
    default_criteria: SuccessCriteria,
    workspaces: Arc<WorkspaceManager>,
    goals: Arc<GoalStore>,
    loops: Arc<LoopController>,
    collector: Arc<dyn MetricsCollector>,
    state: Arc<Mutex<SchedulerState>>,
    event_tx: Option<mpsc::Sender<ExecutionEvent>>,
}

impl ParallelScheduler {
    /// Create a scheduler over the given components.
    pub fn new(
        config: SchedulerConfig,
        default_criteria: SuccessCriteria,
        workspaces: Arc<WorkspaceManager>,
        goals: Arc<GoalStore>,
        loops: Arc<LoopController>,
        collector: Arc<dyn MetricsCollector>,
    ) -> Self {
        Self {
            config,
            default_criteria,
            workspaces,
            goals,
            loops,
            collector,
            state: Arc::new(Mutex::new(SchedulerState::default())),
            event_tx: None,
        }
    }

    /// Assemble a scheduler and its components from an engine configuration.
    ///
    /// A relative `state_dir` is resolved against `repo_root`, matching the
    /// workspace root resolution.
    pub fn from_config(
        repo_root: impl Into<PathBuf>,
        config: &EngineConfig,
        collector: Arc<dyn MetricsCollector>,
    ) -> Result<Self, StoreError> {
        let repo_root = repo_root.into();
        let state_dir = if config.state_dir.is_absolute() {
            config.state_dir.clone()
        } else {
            repo_root.join(&config.state_dir)
        };

        let workspaces = Arc::new(WorkspaceManager::new(repo_root, config.workspace.clone()));
        let goals = Arc::new(GoalStore::open(&state_dir)?);
        let loops = Arc::new(LoopController::open(
            &state_dir,
            goals.clone(),
            config.convergence,
        )?);
        Ok(Self::new(
            config.scheduler.clone(),
            config.default_criteria,
            workspaces,
            goals,
            loops,
            collector,
        ))
    }

    /// Stream execution events to the given channel.
    pub fn with_events(mut self, event_tx: mpsc::Sender<ExecutionEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Execute a batch of tasks and return the final report.
    ///
    /// Setup failures (workspace or goal allocation) mark the affected task
    /// `failed` and never block its siblings; the batch always runs to
    /// completion.
    #[instrument(skip(self, tasks), fields(total = tasks.len()))]
    pub async fn execute_batch(&self, tasks: Vec<Task>) -> DomainResult<ExecutionReport> {
        info!(
            total = tasks.len(),
            max_concurrency = self.config.max_concurrency,
            "Batch execution started"
        );
        self.emit(ExecutionEvent::BatchStarted {
            total_tasks: tasks.len(),
        })
        .await;

        let mut queue: VecDeque<Uuid> = VecDeque::new();
        for task in tasks {
            if self.setup_task(&task).await {
                queue.push_back(task.id);
            }
        }

        let mut workers: JoinSet<(Uuid, TaskOutcome)> = JoinSet::new();
        loop {
            while workers.len() < self.config.max_concurrency {
                let Some(task_id) = queue.pop_front() else {
                    break;
                };
                self.admit(task_id, &mut workers).await;
            }

            match workers.join_next().await {
                None => break,
                Some(Ok((task_id, outcome))) => self.settle_task(task_id, outcome).await,
                Some(Err(join_err)) => {
                    // The worker carried its own id in its return value, so a
                    // panicked worker loses it; affected tasks are reconciled
                    // below once the set drains.
                    error!(error = %join_err, "Task worker aborted");
                }
            }
        }

        // Any task still marked active lost its worker to a panic.
        {
            let mut state = self.state.lock().await;
            let orphaned: Vec<Uuid> = state.active.keys().copied().collect();
            for task_id in orphaned {
                if let Some(mut exec) = state.active.remove(&task_id) {
                    warn!(task_id = %task_id, "Reconciling task whose worker aborted");
                    exec.settle(
                        ExecutionStatus::Failed,
                        Some("task worker aborted".to_string()),
                    );
                    state.completed.push(exec);
                }
            }
        }

        let report = self.generate_report().await;
        info!(
            completed = report.progress.completed,
            failed = report.progress.failed,
            timed_out = report.progress.timed_out,
            success_rate = report.summary.success_rate,
            "Batch execution finished"
        );
        self.emit(ExecutionEvent::BatchCompleted {
            report: report.clone(),
        })
        .await;
        Ok(report)
    }

    /// Register a task: allocate its workspace, goal, and feedback loop.
    ///
    /// Returns whether the task is runnable; on failure it is recorded as
    /// `failed` with the error message and the batch continues.
    async fn setup_task(&self, task: &Task) -> bool {
        let mut exec = ExecutionTask::new(task.clone());
        let setup = self.allocate_resources(task).await;

        let runnable = {
            let mut state = self.state.lock().await;
            state.order.push(task.id);
            match setup {
                Ok((workspace, goal_id, loop_id)) => {
                    exec.workspace_path = Some(workspace.path);
                    exec.goal_id = Some(goal_id);
                    exec.loop_id = Some(loop_id);
                    state.active.insert(task.id, exec);
                    true
                }
                Err(err) => {
                    warn!(task_id = %task.id, error = %err, "Task setup failed; excluding from admission");
                    exec.settle(ExecutionStatus::Failed, Some(err.to_string()));
                    state.completed.push(exec);
                    false
                }
            }
        };

        if !runnable {
            self.emit(ExecutionEvent::TaskSettled {
                task_id: task.id,
                status: ExecutionStatus::Failed,
                loop_status: None,
                iterations: 0,
            })
            .await;
        }
        runnable
    }

    async fn allocate_resources(
        &self,
        task: &Task,
    ) -> DomainResult<(Workspace, Uuid, Uuid)> {
        let workspace = self
            .workspaces
            .create(task)
            .await
            .map_err(|err| DomainError::ExecutionFailed(err.to_string()))?;
        let goal = self
            .goals
            .create_goal(CreateGoalParams::for_task(task, self.default_criteria))?;
        let feedback_loop = self.loops.start_loop(goal.id)?;
        Ok((workspace, goal.id, feedback_loop.id))
    }

    /// Mark a task running and spawn its worker into the join set.
    async fn admit(&self, task_id: Uuid, workers: &mut JoinSet<(Uuid, TaskOutcome)>) {
        let (title, loop_id, workspace) = {
            let mut state = self.state.lock().await;
            let Some(exec) = state.active.get_mut(&task_id) else {
                warn!(task_id = %task_id, "Admission for unknown task");
                return;
            };
            exec.start();
            (
                exec.task.title.clone(),
                exec.loop_id,
                self.workspaces.get(task_id).await,
            )
        };

        self.emit(ExecutionEvent::TaskStarted {
            task_id,
            title,
        })
        .await;

        let (Some(loop_id), Some(workspace)) = (loop_id, workspace) else {
            // Setup registered the task runnable, so both must exist.
            self.settle_task(
                task_id,
                TaskOutcome::Crashed {
                    error: "missing workspace or loop for admitted task".to_string(),
                },
            )
            .await;
            return;
        };

        let collector = self.collector.clone();
        let loops = self.loops.clone();
        let event_tx = self.event_tx.clone();
        let deadline = Duration::from_secs(self.config.task_timeout_secs);

        workers.spawn(async move {
            let driven = tokio::time::timeout(
                deadline,
                drive_loop(task_id, &workspace, loop_id, collector, loops.clone(), event_tx),
            )
            .await;

            let outcome = match driven {
                Ok(Ok((loop_status, iterations))) => TaskOutcome::Settled {
                    loop_status,
                    iterations,
                },
                Ok(Err(err)) => TaskOutcome::Crashed {
                    error: err.to_string(),
                },
                Err(_) => {
                    // Deadline fired between evaluations; finalize the loop
                    // so its terminal state is recorded exactly once.
                    if let Err(err) = loops.force_timeout(loop_id) {
                        warn!(task_id = %task_id, error = %err, "Failed to finalize timed-out loop");
                    }
                    TaskOutcome::DeadlineExceeded
                }
            };
            (task_id, outcome)
        });
    }

    /// Move a task from the active set to the completed list exactly once.
    async fn settle_task(&self, task_id: Uuid, outcome: TaskOutcome) {
        let loop_id = {
            let state = self.state.lock().await;
            state.active.get(&task_id).and_then(|exec| exec.loop_id)
        };
        let recorded_iterations = loop_id
            .and_then(|id| self.loops.get_loop(id).ok())
            .map_or(0, |lp| lp.iteration_count());

        let (status, loop_status, iterations, error) = match outcome {
            TaskOutcome::Settled {
                loop_status,
                iterations,
            } => (
                execution_status_for(loop_status),
                Some(loop_status),
                iterations,
                None,
            ),
            TaskOutcome::Crashed { error } => (
                ExecutionStatus::Failed,
                None,
                recorded_iterations,
                Some(error),
            ),
            TaskOutcome::DeadlineExceeded => (
                ExecutionStatus::Timeout,
                Some(LoopStatus::Timeout),
                recorded_iterations,
                Some("task wall-clock deadline exceeded".to_string()),
            ),
        };

        let workspace_status = if loop_status == Some(LoopStatus::Converged) {
            WorkspaceStatus::Completed
        } else {
            WorkspaceStatus::Failed
        };
        self.workspaces.set_status(task_id, workspace_status).await;

        {
            let mut state = self.state.lock().await;
            let Some(mut exec) = state.active.remove(&task_id) else {
                warn!(task_id = %task_id, "Settle for task not in active set");
                return;
            };
            exec.loop_status = loop_status;
            exec.iterations = iterations;
            exec.settle(status, error);
            state.completed.push(exec);
        }

        info!(
            task_id = %task_id,
            status = status.as_str(),
            loop_status = loop_status.map_or("none", |s| s.as_str()),
            iterations,
            "Task settled"
        );
        self.emit(ExecutionEvent::TaskSettled {
            task_id,
            status,
            loop_status,
            iterations,
        })
        .await;
    }

    /// Point-in-time counts across the active and completed sets.
    pub async fn progress(&self) -> ProgressSummary {
        let state = self.state.lock().await;
        summarize_progress(&state.snapshot())
    }

    /// Snapshot the batch into a report.
    pub async fn generate_report(&self) -> ExecutionReport {
        let state = self.state.lock().await;
        ExecutionReport::from_tasks(state.snapshot())
    }

    /// Destroy every workspace created this run. The caller's explicit
    /// responsibility after reading the report; never automatic.
    pub async fn cleanup(&self) -> usize {
        self.workspaces.cleanup_all().await
    }

    async fn emit(&self, event: ExecutionEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event).await;
        }
    }
}

/// Map a settled loop outcome to the task's terminal status.
///
/// Policy-driven outcomes (converged, diverged, escalated) are completed
/// tasks, not errors; only timeouts and crashes are distinguished.
fn execution_status_for(loop_status: LoopStatus) -> ExecutionStatus {
    match loop_status {
        LoopStatus::Timeout => ExecutionStatus::Timeout,
        LoopStatus::Running => ExecutionStatus::Failed,
        LoopStatus::Converged | LoopStatus::Diverged | LoopStatus::Escalated => {
            ExecutionStatus::Completed
        }
    }
}

/// Drive one task's convergence loop to a terminal state.
///
/// Iterations are strictly sequential: collection and evaluation for
/// iteration `i + 1` never start before iteration `i` settles.
async fn drive_loop(
    task_id: Uuid,
    workspace: &Workspace,
    loop_id: Uuid,
    collector: Arc<dyn MetricsCollector>,
    loops: Arc<LoopController>,
    event_tx: Option<mpsc::Sender<ExecutionEvent>>,
) -> DomainResult<(LoopStatus, u32)> {
    let mut iterations = 0u32;
    loop {
        let metrics = collector.collect(workspace).await?;
        let status = loops.execute_iteration(loop_id, &metrics)?;
        iterations += 1;

        if let Some(ref tx) = event_tx {
            let _ = tx
                .send(ExecutionEvent::IterationCompleted {
                    task_id,
                    iteration: iterations,
                    status,
                })
                .await;
        }

        if status.is_terminal() {
            return Ok((status, iterations));
        }
    }
}
