//! Goal store.
//!
//! Creates and tracks the success bar for every task: six-way success
//! criteria, derived thresholds, verification tests, and the append-only
//! feedback history. Every mutation is persisted immediately, one JSON file
//! per goal.

use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    FeedbackRecord, Goal, GoalStatusSummary, MetricsSnapshot, SuccessCriteria, Task, TaskPriority,
    ThresholdOverrides, VerificationTest,
};
use crate::infrastructure::store::{JsonEntityStore, StoreError};

/// Parameters for goal creation.
#[derive(Debug, Clone)]
pub struct CreateGoalParams {
    /// Owning task id
    pub task_id: Uuid,
    /// Success criteria the workspace must clear
    pub criteria: SuccessCriteria,
    /// Optional threshold ceilings; defaults fill the gaps
    pub overrides: ThresholdOverrides,
    /// Acceptance-criteria text
    pub acceptance_criteria: String,
    /// Priority inherited from the task
    pub priority: TaskPriority,
    /// Optional deadline
    pub deadline: Option<DateTime<Utc>>,
    /// Verification-test specifications to register as pending
    pub verification_specs: Vec<String>,
}

impl CreateGoalParams {
    /// Build params for a task using the engine's default success bar.
    pub fn for_task(task: &Task, criteria: SuccessCriteria) -> Self {
        Self {
            task_id: task.id,
            criteria,
            overrides: ThresholdOverrides::default(),
            acceptance_criteria: task.description.clone(),
            priority: task.priority,
            deadline: None,
            verification_specs: Vec::new(),
        }
    }
}

/// A progress update applied to a goal after an iteration.
///
/// `test_specs` replaces the verification-test list wholesale when supplied;
/// `feedback` appends one record to the unbounded history; `attempts`
/// overwrites the attempt counter.
#[derive(Debug, Clone, Default)]
pub struct GoalProgress {
    pub test_specs: Option<Vec<VerificationTest>>,
    pub feedback: Option<String>,
    pub attempts: Option<u32>,
}

/// Service owning goal records and the "is this achieved" predicate.
///
/// Operating on an unknown goal id is an invariant violation (the goal must
/// be created before being referenced) and surfaces as
/// [`DomainError::GoalNotFound`].
pub struct GoalStore {
    store: JsonEntityStore<Goal>,
}

impl GoalStore {
    /// Open the store, persisting goals under `<state_dir>/goals`.
    pub fn open(state_dir: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            store: JsonEntityStore::open(state_dir.join("goals"))?,
        })
    }

    /// Create a goal, deriving unset metric thresholds from fixed defaults.
    #[instrument(skip(self, params), fields(task_id = %params.task_id))]
    pub fn create_goal(&self, params: CreateGoalParams) -> DomainResult<Goal> {
        let mut goal = Goal::new(
            params.task_id,
            params.criteria,
            &params.overrides,
            params.acceptance_criteria,
            params.priority,
        )
        .with_verification_tests(
            params
                .verification_specs
                .into_iter()
                .map(VerificationTest::new)
                .collect(),
        );
        goal.deadline = params.deadline;

        self.store.insert(goal.id, goal.clone())?;
        info!(goal_id = %goal.id, task_id = %goal.task_id, "Goal created");
        Ok(goal)
    }

    /// Fetch a goal by id.
    pub fn get_goal(&self, goal_id: Uuid) -> DomainResult<Goal> {
        self.store
            .get(goal_id)
            .ok_or(DomainError::GoalNotFound(goal_id))
    }

    /// True only when the snapshot clears **all six** criteria
    /// simultaneously. Strict conjunction; no partial credit.
    pub fn is_goal_achieved(
        &self,
        goal_id: Uuid,
        metrics: &MetricsSnapshot,
    ) -> DomainResult<bool> {
        Ok(self.get_goal(goal_id)?.is_achieved_by(metrics))
    }

    /// Verification-test counts by status plus a completion percentage
    /// (0 when there are no tests).
    pub fn goal_status(&self, goal_id: Uuid) -> DomainResult<GoalStatusSummary> {
        Ok(self.get_goal(goal_id)?.status_summary())
    }

    /// Apply a progress update. All mutations persist immediately.
    #[instrument(skip(self, progress), fields(goal_id = %goal_id))]
    pub fn update_goal_progress(
        &self,
        goal_id: Uuid,
        progress: GoalProgress,
    ) -> DomainResult<Goal> {
        let updated = self
            .store
            .update(goal_id, |goal| {
                if let Some(specs) = progress.test_specs {
                    goal.verification_tests = specs;
                }
                if let Some(message) = progress.feedback {
                    goal.feedback_history.push(FeedbackRecord::new(message));
                }
                if let Some(attempts) = progress.attempts {
                    goal.attempts = attempts;
                }
                goal.updated_at = Utc::now();
            })?
            .ok_or(DomainError::GoalNotFound(goal_id))?;

        debug!(goal_id = %goal_id, attempts = updated.attempts, "Goal progress updated");
        Ok(updated)
    }

    /// Number of goals registered.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether no goals are registered.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
