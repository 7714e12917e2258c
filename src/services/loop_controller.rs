//! Convergence loop controller.
//!
//! Owns the per-task iterative state machine. A loop starts `running` and
//! settles into exactly one of `converged`, `diverged`, `escalated`, or
//! `timeout`; the decision rules live on the [`FeedbackLoop`] model, the
//! controller wires them to the goal store and persists every mutation.
//!
//! Iteration evaluation never raises for metric anomalies; only missing
//! goal/loop ids produce errors, since those indicate call-order bugs.

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{FeedbackLoop, LoopSettings, LoopStatus, MetricsSnapshot};
use crate::infrastructure::store::{JsonEntityStore, StoreError};
use crate::services::goal_store::{GoalProgress, GoalStore};

/// Service owning feedback loops and their state machine.
pub struct LoopController {
    goals: Arc<GoalStore>,
    store: JsonEntityStore<FeedbackLoop>,
    settings: LoopSettings,
}

impl LoopController {
    /// Open the controller, persisting loops under `<state_dir>/loops`.
    pub fn open(
        state_dir: &Path,
        goals: Arc<GoalStore>,
        settings: LoopSettings,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            goals,
            store: JsonEntityStore::open(state_dir.join("loops"))?,
            settings,
        })
    }

    /// Create a loop in `running` at iteration 0.
    ///
    /// Fails with [`DomainError::GoalNotFound`] when the goal does not exist.
    #[instrument(skip(self), fields(goal_id = %goal_id))]
    pub fn start_loop(&self, goal_id: Uuid) -> DomainResult<FeedbackLoop> {
        // The goal must exist before a loop can reference it.
        self.goals.get_goal(goal_id)?;

        let feedback_loop = FeedbackLoop::new(goal_id, self.settings);
        self.store.insert(feedback_loop.id, feedback_loop.clone())?;
        info!(loop_id = %feedback_loop.id, goal_id = %goal_id, "Feedback loop started");
        Ok(feedback_loop)
    }

    /// Evaluate one iteration of a loop against a metrics snapshot.
    ///
    /// Appends the iteration record, consults the goal store's achievement
    /// predicate, applies the termination rules, and mirrors progress onto
    /// the owning goal (attempt counter + one feedback entry). Returns the
    /// loop status after the iteration.
    #[instrument(skip(self, metrics), fields(loop_id = %loop_id))]
    pub fn execute_iteration(
        &self,
        loop_id: Uuid,
        metrics: &MetricsSnapshot,
    ) -> DomainResult<LoopStatus> {
        let goal_id = self
            .store
            .get(loop_id)
            .ok_or(DomainError::LoopNotFound(loop_id))?
            .goal_id;

        // A missing goal mid-loop cannot happen by construction (goals are
        // never deleted); if it does, record the anomaly instead of raising.
        let (achieved, anomaly) = match self.goals.is_goal_achieved(goal_id, metrics) {
            Ok(achieved) => (achieved, None),
            Err(err) => (false, Some(err.to_string())),
        };

        let mut status = LoopStatus::Running;
        let updated = self
            .store
            .update(loop_id, |lp| {
                status = lp.evaluate_iteration(metrics, achieved, anomaly);
            })?
            .ok_or(DomainError::LoopNotFound(loop_id))?;

        let iteration = updated.iteration_count();
        debug!(
            loop_id = %loop_id,
            iteration,
            status = status.as_str(),
            achieved,
            "Iteration evaluated"
        );

        // Mirror progress onto the owning goal; skipped when the goal lookup
        // already failed above.
        let _ = self.goals.update_goal_progress(
            goal_id,
            GoalProgress {
                test_specs: None,
                feedback: Some(format!(
                    "iteration {iteration}: {} (quality {:.1}, coverage {:.1}, errors {})",
                    status.as_str(),
                    metrics.quality_score,
                    metrics.test_coverage,
                    metrics.total_errors()
                )),
                attempts: Some(iteration),
            },
        );

        Ok(status)
    }

    /// Read-only snapshot of a loop. Never mutates state.
    pub fn get_loop(&self, loop_id: Uuid) -> DomainResult<FeedbackLoop> {
        self.store
            .get(loop_id)
            .ok_or(DomainError::LoopNotFound(loop_id))
    }

    /// Force a still-running loop terminal with `timeout`.
    ///
    /// Used by the scheduler when a task's hard deadline fires between
    /// evaluations. Returns the loop status afterwards.
    #[instrument(skip(self), fields(loop_id = %loop_id))]
    pub fn force_timeout(&self, loop_id: Uuid) -> DomainResult<LoopStatus> {
        let updated = self
            .store
            .update(loop_id, |lp| {
                lp.force_timeout();
            })?
            .ok_or(DomainError::LoopNotFound(loop_id))?;
        debug!(loop_id = %loop_id, status = updated.status.as_str(), "Loop deadline enforced");
        Ok(updated.status)
    }
}
