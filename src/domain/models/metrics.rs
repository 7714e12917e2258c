//! Metrics snapshot and progress scoring.
//!
//! A [`MetricsSnapshot`] is the six-dimension quality reading the collector
//! produces from a workspace. The composite progress score reduces a snapshot
//! to a single number so the loop controller can tell whether consecutive
//! iterations are still moving toward the goal.

use serde::{Deserialize, Serialize};

/// A point-in-time quality reading for one workspace.
///
/// Produced by the metrics collector between executor passes. Snapshots are
/// observations only; collecting one must never mutate the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Lint errors currently reported in the workspace
    pub lint_errors: u32,
    /// Type errors currently reported in the workspace
    pub type_errors: u32,
    /// Security issues currently reported in the workspace
    pub security_issues: u32,
    /// Aggregate quality score, 0.0 to 100.0
    pub quality_score: f64,
    /// Test coverage percentage, 0.0 to 100.0
    pub test_coverage: f64,
    /// Number of passing tests
    pub tests_passed: u32,
}

impl MetricsSnapshot {
    /// Total error count across lint, type, and security dimensions.
    pub fn total_errors(&self) -> u32 {
        self.lint_errors + self.type_errors + self.security_issues
    }
}

/// Weights for the composite progress score.
///
/// Controls the relative importance of each signal dimension when deciding
/// whether an iteration made meaningful forward progress. For well-tested
/// work the quality and coverage signals dominate; error elimination acts as
/// a penalty term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressWeights {
    /// Weight for the aggregate quality score. Default: 0.4.
    pub w_quality: f64,
    /// Weight for test coverage. Default: 0.3.
    pub w_coverage: f64,
    /// Weight for the passing-test count. Default: 0.2.
    pub w_tests: f64,
    /// Penalty weight for outstanding errors. Default: 0.1.
    pub w_errors: f64,
}

impl Default for ProgressWeights {
    fn default() -> Self {
        Self {
            w_quality: 0.4,
            w_coverage: 0.3,
            w_tests: 0.2,
            w_errors: 0.1,
        }
    }
}

impl ProgressWeights {
    /// Reduce a snapshot to a single composite progress score.
    ///
    /// Higher is better. The score is a weighted sum of the positive signals
    /// minus an error penalty; it is comparable only between snapshots scored
    /// with the same weights.
    pub fn score(&self, metrics: &MetricsSnapshot) -> f64 {
        self.w_quality * metrics.quality_score
            + self.w_coverage * metrics.test_coverage
            + self.w_tests * f64::from(metrics.tests_passed)
            - self.w_errors * f64::from(metrics.total_errors())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(quality: f64, coverage: f64, tests: u32, errors: u32) -> MetricsSnapshot {
        MetricsSnapshot {
            lint_errors: errors,
            type_errors: 0,
            security_issues: 0,
            quality_score: quality,
            test_coverage: coverage,
            tests_passed: tests,
        }
    }

    #[test]
    fn test_total_errors_sums_all_dimensions() {
        let m = MetricsSnapshot {
            lint_errors: 1,
            type_errors: 2,
            security_issues: 3,
            quality_score: 0.0,
            test_coverage: 0.0,
            tests_passed: 0,
        };
        assert_eq!(m.total_errors(), 6);
    }

    #[test]
    fn test_score_rises_with_quality() {
        let weights = ProgressWeights::default();
        let low = weights.score(&snapshot(50.0, 50.0, 10, 0));
        let high = weights.score(&snapshot(90.0, 50.0, 10, 0));
        assert!(high > low);
    }

    #[test]
    fn test_errors_penalize_score() {
        let weights = ProgressWeights::default();
        let clean = weights.score(&snapshot(80.0, 80.0, 10, 0));
        let dirty = weights.score(&snapshot(80.0, 80.0, 10, 20));
        assert!(clean > dirty);
    }
}
