//! Feedback loop domain model.
//!
//! The feedback loop is the iterative evaluate-and-decide record for one
//! goal. It starts `running` and settles into exactly one terminal state:
//! `converged`, `diverged`, `escalated`, or `timeout`. The terminal status is
//! set exactly once; iteration records are append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::metrics::{MetricsSnapshot, ProgressWeights};

/// Status of a feedback loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    /// Still iterating
    Running,
    /// Goal achieved with the minimum iteration count satisfied
    Converged,
    /// No meaningful forward progress for too many consecutive iterations
    Diverged,
    /// Iteration budget exhausted; human attention required
    Escalated,
    /// Iteration budget exhausted with escalation disabled, or wall-clock
    /// budget exceeded
    Timeout,
}

impl Default for LoopStatus {
    fn default() -> Self {
        Self::Running
    }
}

impl LoopStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Converged => "converged",
            Self::Diverged => "diverged",
            Self::Escalated => "escalated",
            Self::Timeout => "timeout",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "running" => Some(Self::Running),
            "converged" => Some(Self::Converged),
            "diverged" => Some(Self::Diverged),
            "escalated" => Some(Self::Escalated),
            "timeout" => Some(Self::Timeout),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// The decision made after evaluating one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopDecision {
    /// Keep iterating
    Continue,
    /// Goal achieved and minimum iterations satisfied
    Converge,
    /// Stalled for `convergence_threshold` consecutive iterations
    Diverge,
    /// Iteration budget exhausted with escalation enabled
    Escalate,
    /// Wall-clock budget exceeded, or iteration budget exhausted with
    /// escalation disabled
    Timeout,
}

/// One appended evaluation of the loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based iteration number
    pub sequence: u32,
    /// The metrics snapshot evaluated
    pub metrics: MetricsSnapshot,
    /// Composite progress score for the snapshot
    pub score: f64,
    /// The decision made
    pub decision: LoopDecision,
    /// Anomaly observed while evaluating, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<String>,
    /// When the iteration was evaluated
    pub recorded_at: DateTime<Utc>,
}

/// Tunable settings for a feedback loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopSettings {
    /// Maximum number of iterations before the loop is forced terminal.
    pub max_iterations: u32,
    /// Minimum iterations before convergence is permitted.
    pub min_iterations: u32,
    /// Consecutive non-improving iterations tolerated before divergence.
    pub convergence_threshold: u32,
    /// Minimum composite-score gain over the best seen so far that counts
    /// as meaningful improvement.
    pub min_improvement: f64,
    /// Overall wall-clock budget in seconds, checked at evaluation time.
    pub wall_clock_budget_secs: u64,
    /// Whether iteration exhaustion escalates (true) or times out (false).
    pub escalate_on_exhaustion: bool,
    /// Weights for the composite progress score.
    pub weights: ProgressWeights,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            min_iterations: 1,
            convergence_threshold: 3,
            min_improvement: 0.5,
            wall_clock_budget_secs: 1800,
            escalate_on_exhaustion: true,
            weights: ProgressWeights::default(),
        }
    }
}

/// The iterative evaluate-and-decide cycle for one goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackLoop {
    /// Unique identifier
    pub id: Uuid,
    /// Owning goal
    pub goal_id: Uuid,
    /// Current status
    pub status: LoopStatus,
    /// Ordered, append-only iteration records
    pub iterations: Vec<IterationRecord>,
    /// Loop settings
    pub settings: LoopSettings,
    /// Best composite score observed so far
    pub best_score: Option<f64>,
    /// Consecutive iterations without meaningful improvement
    pub stall_count: u32,
    /// When the loop started
    pub started_at: DateTime<Utc>,
    /// When the loop was last updated
    pub updated_at: DateTime<Utc>,
    /// When the loop reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

impl FeedbackLoop {
    /// Create a new running loop at iteration 0.
    pub fn new(goal_id: Uuid, settings: LoopSettings) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            goal_id,
            status: LoopStatus::Running,
            iterations: Vec::new(),
            settings,
            best_score: None,
            stall_count: 0,
            started_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Number of iterations evaluated so far.
    pub fn iteration_count(&self) -> u32 {
        u32::try_from(self.iterations.len()).unwrap_or(u32::MAX)
    }

    /// Whether the wall-clock budget has been exceeded.
    ///
    /// Only consulted at evaluation time; the scheduler enforces the hard
    /// deadline independently.
    pub fn wall_clock_exceeded(&self, now: DateTime<Utc>) -> bool {
        let elapsed = now.signed_duration_since(self.started_at);
        elapsed.num_seconds() >= 0
            && u64::try_from(elapsed.num_seconds()).unwrap_or(u64::MAX)
                >= self.settings.wall_clock_budget_secs
    }

    /// Evaluate one iteration: append the record, update stall bookkeeping,
    /// and settle into a terminal status when a termination rule fires.
    ///
    /// Never panics and never rejects a snapshot; anomalies ride along in the
    /// iteration record. Evaluating an already-terminal loop is a no-op that
    /// returns the settled status.
    pub fn evaluate_iteration(
        &mut self,
        metrics: &MetricsSnapshot,
        achieved: bool,
        anomaly: Option<String>,
    ) -> LoopStatus {
        if self.status.is_terminal() {
            return self.status;
        }

        let now = Utc::now();
        let score = self.settings.weights.score(metrics);
        let improved = self
            .best_score
            .is_none_or(|best| score > best + self.settings.min_improvement);
        if improved {
            self.best_score = Some(self.best_score.map_or(score, |best| best.max(score)));
            self.stall_count = 0;
        } else {
            self.stall_count += 1;
        }

        let sequence = self.iteration_count() + 1;
        let decision = self.decide(sequence, achieved, now);
        self.iterations.push(IterationRecord {
            sequence,
            metrics: *metrics,
            score,
            decision,
            anomaly,
            recorded_at: now,
        });
        self.updated_at = now;

        match decision {
            LoopDecision::Continue => {}
            LoopDecision::Converge => self.finalize(LoopStatus::Converged, now),
            LoopDecision::Diverge => self.finalize(LoopStatus::Diverged, now),
            LoopDecision::Escalate => self.finalize(LoopStatus::Escalated, now),
            LoopDecision::Timeout => self.finalize(LoopStatus::Timeout, now),
        }
        self.status
    }

    /// Force the loop terminal with `timeout` if it is still running.
    ///
    /// Used by the scheduler when a task's hard deadline fires between
    /// evaluations. A no-op on an already-terminal loop.
    pub fn force_timeout(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.finalize(LoopStatus::Timeout, Utc::now());
        true
    }

    /// Rule order: wall-clock budget, convergence, divergence, exhaustion.
    fn decide(&self, iteration: u32, achieved: bool, now: DateTime<Utc>) -> LoopDecision {
        if self.wall_clock_exceeded(now) {
            return LoopDecision::Timeout;
        }
        if achieved && iteration >= self.settings.min_iterations {
            return LoopDecision::Converge;
        }
        if self.stall_count >= self.settings.convergence_threshold {
            return LoopDecision::Diverge;
        }
        if iteration >= self.settings.max_iterations {
            return if self.settings.escalate_on_exhaustion {
                LoopDecision::Escalate
            } else {
                LoopDecision::Timeout
            };
        }
        LoopDecision::Continue
    }

    /// Terminal status is set exactly once.
    fn finalize(&mut self, status: LoopStatus, now: DateTime<Utc>) {
        debug_assert!(!self.status.is_terminal());
        self.status = status;
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(quality: f64, coverage: f64, tests: u32) -> MetricsSnapshot {
        MetricsSnapshot {
            lint_errors: 0,
            type_errors: 0,
            security_issues: 0,
            quality_score: quality,
            test_coverage: coverage,
            tests_passed: tests,
        }
    }

    #[test]
    fn test_no_convergence_before_min_iterations() {
        let settings = LoopSettings {
            min_iterations: 3,
            ..LoopSettings::default()
        };
        let mut lp = FeedbackLoop::new(Uuid::new_v4(), settings);

        // Goal satisfied immediately, but the floor is 3 iterations.
        assert_eq!(
            lp.evaluate_iteration(&metrics(95.0, 95.0, 10), true, None),
            LoopStatus::Running
        );
        assert_eq!(
            lp.evaluate_iteration(&metrics(96.0, 96.0, 11), true, None),
            LoopStatus::Running
        );
        assert_eq!(
            lp.evaluate_iteration(&metrics(97.0, 97.0, 12), true, None),
            LoopStatus::Converged
        );
        assert_eq!(lp.iteration_count(), 3);
    }

    #[test]
    fn test_divergence_after_stalled_run() {
        let settings = LoopSettings {
            convergence_threshold: 3,
            ..LoopSettings::default()
        };
        let mut lp = FeedbackLoop::new(Uuid::new_v4(), settings);

        let flat = metrics(50.0, 50.0, 5);
        assert_eq!(lp.evaluate_iteration(&flat, false, None), LoopStatus::Running);
        assert_eq!(lp.evaluate_iteration(&flat, false, None), LoopStatus::Running);
        assert_eq!(lp.evaluate_iteration(&flat, false, None), LoopStatus::Running);
        // Third consecutive stall trips the threshold.
        assert_eq!(lp.evaluate_iteration(&flat, false, None), LoopStatus::Diverged);
    }

    #[test]
    fn test_improvement_resets_stall_count() {
        let mut lp = FeedbackLoop::new(Uuid::new_v4(), LoopSettings::default());
        let flat = metrics(50.0, 50.0, 5);
        lp.evaluate_iteration(&flat, false, None);
        lp.evaluate_iteration(&flat, false, None);
        assert_eq!(lp.stall_count, 1);
        lp.evaluate_iteration(&metrics(70.0, 60.0, 8), false, None);
        assert_eq!(lp.stall_count, 0);
    }

    #[test]
    fn test_exhaustion_escalates_when_enabled() {
        let settings = LoopSettings {
            max_iterations: 2,
            convergence_threshold: 10,
            escalate_on_exhaustion: true,
            ..LoopSettings::default()
        };
        let mut lp = FeedbackLoop::new(Uuid::new_v4(), settings);
        lp.evaluate_iteration(&metrics(10.0, 10.0, 0), false, None);
        assert_eq!(
            lp.evaluate_iteration(&metrics(30.0, 20.0, 1), false, None),
            LoopStatus::Escalated
        );
    }

    #[test]
    fn test_exhaustion_times_out_when_escalation_disabled() {
        let settings = LoopSettings {
            max_iterations: 1,
            escalate_on_exhaustion: false,
            ..LoopSettings::default()
        };
        let mut lp = FeedbackLoop::new(Uuid::new_v4(), settings);
        assert_eq!(
            lp.evaluate_iteration(&metrics(10.0, 10.0, 0), false, None),
            LoopStatus::Timeout
        );
    }

    #[test]
    fn test_terminal_status_set_once() {
        let settings = LoopSettings {
            max_iterations: 1,
            ..LoopSettings::default()
        };
        let mut lp = FeedbackLoop::new(Uuid::new_v4(), settings);
        assert_eq!(
            lp.evaluate_iteration(&metrics(10.0, 10.0, 0), false, None),
            LoopStatus::Escalated
        );
        let completed_at = lp.completed_at;
        // Further evaluations are no-ops.
        assert_eq!(
            lp.evaluate_iteration(&metrics(99.0, 99.0, 99), true, None),
            LoopStatus::Escalated
        );
        assert_eq!(lp.iteration_count(), 1);
        assert_eq!(lp.completed_at, completed_at);
        assert!(!lp.force_timeout());
    }

    #[test]
    fn test_force_timeout_only_while_running() {
        let mut lp = FeedbackLoop::new(Uuid::new_v4(), LoopSettings::default());
        assert!(lp.force_timeout());
        assert_eq!(lp.status, LoopStatus::Timeout);
        assert!(!lp.force_timeout());
    }

    #[test]
    fn test_wall_clock_budget_forces_timeout() {
        let settings = LoopSettings {
            wall_clock_budget_secs: 0,
            ..LoopSettings::default()
        };
        let mut lp = FeedbackLoop::new(Uuid::new_v4(), settings);
        assert_eq!(
            lp.evaluate_iteration(&metrics(99.0, 99.0, 99), true, None),
            LoopStatus::Timeout
        );
    }

    #[test]
    fn test_every_bounded_loop_terminates() {
        // Whatever the metric stream, a loop fed up to max_iterations
        // always settles into exactly one terminal state.
        let settings = LoopSettings {
            max_iterations: 6,
            convergence_threshold: 4,
            ..LoopSettings::default()
        };
        let mut lp = FeedbackLoop::new(Uuid::new_v4(), settings);
        for i in 0..settings.max_iterations {
            let m = metrics(f64::from(i), 50.0, i);
            lp.evaluate_iteration(&m, false, None);
            if lp.status.is_terminal() {
                break;
            }
        }
        assert!(lp.status.is_terminal());
    }
}
