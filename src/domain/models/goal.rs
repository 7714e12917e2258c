//! Goal domain model.
//!
//! A goal is the quantified success bar for one task: the six-way success
//! criteria, derived metric thresholds, verification-test tracking, and an
//! append-only feedback history. Goals are created once per task and mutated
//! by the loop controller after every iteration; they are never deleted
//! automatically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::metrics::MetricsSnapshot;
use super::task::TaskPriority;

/// Default build-time ceiling applied when the caller does not supply one.
pub const DEFAULT_MAX_BUILD_TIME_SECS: u64 = 300;
/// Default code-size ceiling applied when the caller does not supply one.
pub const DEFAULT_MAX_CODE_SIZE_LINES: u64 = 10_000;
/// Default cyclomatic-complexity ceiling applied when the caller does not supply one.
pub const DEFAULT_MAX_CYCLOMATIC_COMPLEXITY: u32 = 10;

/// The six-way success bar a workspace must clear simultaneously.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuccessCriteria {
    /// Minimum aggregate quality score (0.0 to 100.0)
    pub min_quality_score: f64,
    /// Maximum tolerated lint errors
    pub max_lint_errors: u32,
    /// Maximum tolerated type errors
    pub max_type_errors: u32,
    /// Maximum tolerated security issues
    pub max_security_issues: u32,
    /// Minimum test coverage percentage (0.0 to 100.0)
    pub min_test_coverage: f64,
    /// Minimum number of passing tests
    pub min_tests_passed: u32,
}

impl Default for SuccessCriteria {
    fn default() -> Self {
        Self {
            min_quality_score: 80.0,
            max_lint_errors: 0,
            max_type_errors: 0,
            max_security_issues: 0,
            min_test_coverage: 80.0,
            min_tests_passed: 1,
        }
    }
}

impl SuccessCriteria {
    /// Strict conjunction over all six criteria. No partial credit.
    pub fn is_satisfied_by(&self, metrics: &MetricsSnapshot) -> bool {
        metrics.quality_score >= self.min_quality_score
            && metrics.lint_errors <= self.max_lint_errors
            && metrics.type_errors <= self.max_type_errors
            && metrics.security_issues <= self.max_security_issues
            && metrics.test_coverage >= self.min_test_coverage
            && metrics.tests_passed >= self.min_tests_passed
    }
}

/// Caller-supplied overrides for the derived thresholds.
///
/// Any field left `None` falls back to the fixed default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdOverrides {
    pub max_build_time_secs: Option<u64>,
    pub max_code_size_lines: Option<u64>,
    pub max_cyclomatic_complexity: Option<u32>,
}

/// Metric thresholds derived from the success criteria at goal creation.
///
/// Quality and coverage mirror the criteria; the build-time, code-size, and
/// complexity ceilings default when unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricThresholds {
    pub min_quality_score: f64,
    pub min_test_coverage: f64,
    pub max_build_time_secs: u64,
    pub max_code_size_lines: u64,
    pub max_cyclomatic_complexity: u32,
}

impl MetricThresholds {
    /// Derive thresholds from the criteria, applying fixed defaults for the
    /// ceilings the caller left unset.
    pub fn derive(criteria: &SuccessCriteria, overrides: &ThresholdOverrides) -> Self {
        Self {
            min_quality_score: criteria.min_quality_score,
            min_test_coverage: criteria.min_test_coverage,
            max_build_time_secs: overrides
                .max_build_time_secs
                .unwrap_or(DEFAULT_MAX_BUILD_TIME_SECS),
            max_code_size_lines: overrides
                .max_code_size_lines
                .unwrap_or(DEFAULT_MAX_CODE_SIZE_LINES),
            max_cyclomatic_complexity: overrides
                .max_cyclomatic_complexity
                .unwrap_or(DEFAULT_MAX_CYCLOMATIC_COMPLEXITY),
        }
    }
}

/// Status of a single verification test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Passed,
    Failed,
}

impl Default for VerificationStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

/// A verification-test specification tracked on a goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationTest {
    /// What the test verifies
    pub spec: String,
    /// Current status
    pub status: VerificationStatus,
}

impl VerificationTest {
    pub fn new(spec: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            status: VerificationStatus::Pending,
        }
    }
}

/// One entry in a goal's append-only feedback history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Free-form feedback text
    pub message: String,
    /// When the feedback was recorded
    pub recorded_at: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Verification-test counts and completion percentage for a goal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalStatusSummary {
    pub total_tests: usize,
    pub pending: usize,
    pub passed: usize,
    pub failed: usize,
    /// Percentage of tests that passed; 0.0 when there are no tests.
    pub completion_percent: f64,
}

/// The quantified success bar and verification-test record for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Unique identifier
    pub id: Uuid,
    /// Owning task
    pub task_id: Uuid,
    /// Success criteria the workspace must clear
    pub criteria: SuccessCriteria,
    /// Derived metric thresholds
    pub thresholds: MetricThresholds,
    /// Verification-test specifications
    pub verification_tests: Vec<VerificationTest>,
    /// Acceptance-criteria text
    pub acceptance_criteria: String,
    /// Priority inherited from the owning task
    pub priority: TaskPriority,
    /// Optional deadline
    pub deadline: Option<DateTime<Utc>>,
    /// Append-only feedback history
    pub feedback_history: Vec<FeedbackRecord>,
    /// Number of executor attempts recorded against this goal
    pub attempts: u32,
    /// When this goal was created
    pub created_at: DateTime<Utc>,
    /// When this goal was last updated
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    /// Create a goal for a task, deriving thresholds from the criteria.
    pub fn new(
        task_id: Uuid,
        criteria: SuccessCriteria,
        overrides: &ThresholdOverrides,
        acceptance_criteria: impl Into<String>,
        priority: TaskPriority,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_id,
            criteria,
            thresholds: MetricThresholds::derive(&criteria, overrides),
            verification_tests: Vec::new(),
            acceptance_criteria: acceptance_criteria.into(),
            priority,
            deadline: None,
            feedback_history: Vec::new(),
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the deadline.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attach verification-test specifications.
    pub fn with_verification_tests(mut self, specs: Vec<VerificationTest>) -> Self {
        self.verification_tests = specs;
        self
    }

    /// True when the snapshot clears every criterion simultaneously.
    pub fn is_achieved_by(&self, metrics: &MetricsSnapshot) -> bool {
        self.criteria.is_satisfied_by(metrics)
    }

    /// Verification-test counts and completion percentage.
    ///
    /// Completion is 0 when no tests are registered; the division is guarded.
    pub fn status_summary(&self) -> GoalStatusSummary {
        let total = self.verification_tests.len();
        let passed = self
            .verification_tests
            .iter()
            .filter(|t| t.status == VerificationStatus::Passed)
            .count();
        let failed = self
            .verification_tests
            .iter()
            .filter(|t| t.status == VerificationStatus::Failed)
            .count();
        #[allow(clippy::cast_precision_loss)]
        let completion_percent = if total == 0 {
            0.0
        } else {
            passed as f64 / total as f64 * 100.0
        };
        GoalStatusSummary {
            total_tests: total,
            pending: total - passed - failed,
            passed,
            failed,
            completion_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing_metrics() -> MetricsSnapshot {
        MetricsSnapshot {
            lint_errors: 0,
            type_errors: 0,
            security_issues: 0,
            quality_score: 90.0,
            test_coverage: 85.0,
            tests_passed: 12,
        }
    }

    #[test]
    fn test_strict_conjunction_no_partial_credit() {
        let criteria = SuccessCriteria::default();
        let mut metrics = passing_metrics();
        assert!(criteria.is_satisfied_by(&metrics));

        metrics.quality_score = 79.0;
        assert!(!criteria.is_satisfied_by(&metrics));
    }

    #[test]
    fn test_threshold_defaults_applied() {
        let thresholds =
            MetricThresholds::derive(&SuccessCriteria::default(), &ThresholdOverrides::default());
        assert_eq!(thresholds.max_build_time_secs, DEFAULT_MAX_BUILD_TIME_SECS);
        assert_eq!(thresholds.max_code_size_lines, DEFAULT_MAX_CODE_SIZE_LINES);
        assert_eq!(
            thresholds.max_cyclomatic_complexity,
            DEFAULT_MAX_CYCLOMATIC_COMPLEXITY
        );
    }

    #[test]
    fn test_threshold_overrides_win() {
        let overrides = ThresholdOverrides {
            max_build_time_secs: Some(60),
            max_code_size_lines: None,
            max_cyclomatic_complexity: Some(5),
        };
        let thresholds = MetricThresholds::derive(&SuccessCriteria::default(), &overrides);
        assert_eq!(thresholds.max_build_time_secs, 60);
        assert_eq!(thresholds.max_code_size_lines, DEFAULT_MAX_CODE_SIZE_LINES);
        assert_eq!(thresholds.max_cyclomatic_complexity, 5);
    }

    #[test]
    fn test_status_summary_empty_is_zero() {
        let goal = Goal::new(
            Uuid::new_v4(),
            SuccessCriteria::default(),
            &ThresholdOverrides::default(),
            "works end to end",
            TaskPriority::Normal,
        );
        let summary = goal.status_summary();
        assert_eq!(summary.total_tests, 0);
        assert!((summary.completion_percent - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_status_summary_counts() {
        let mut goal = Goal::new(
            Uuid::new_v4(),
            SuccessCriteria::default(),
            &ThresholdOverrides::default(),
            "",
            TaskPriority::Normal,
        )
        .with_verification_tests(vec![
            VerificationTest::new("unit tests pass"),
            VerificationTest::new("lint clean"),
            VerificationTest::new("integration passes"),
            VerificationTest::new("docs build"),
        ]);
        goal.verification_tests[0].status = VerificationStatus::Passed;
        goal.verification_tests[1].status = VerificationStatus::Failed;

        let summary = goal.status_summary();
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.pending, 2);
        assert!((summary.completion_percent - 25.0).abs() < f64::EPSILON);
    }
}
