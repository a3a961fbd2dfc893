//! Result model: per-test results and the aggregated suite result.

use crate::threshold::{MetricVerdict, VerdictOutcome};
use crate::types::TestType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Serde helper: durations as integer milliseconds, so a written report
/// re-renders byte-identically after a round trip.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        u64::try_from(d.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// One collected metric sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricObservation {
    pub name: String,
    pub value: f64,
    pub unit: String,
}

impl MetricObservation {
    pub fn new(name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.into(),
        }
    }
}

/// Outcome of a single test type.
///
/// The derived ordering is the severity ordering used for worst-of
/// aggregation: `Passed < Skipped < Failed < Error`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Skipped,
    Failed,
    Error,
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TestStatus::Passed => "passed",
            TestStatus::Skipped => "skipped",
            TestStatus::Failed => "failed",
            TestStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Result of one executed (or skipped) test type.
///
/// Immutable once the test type completes; owned by [`SuiteResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_type: TestType,
    pub status: TestStatus,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// Ordered error messages. Empty for `passed` results by invariant.
    pub errors: Vec<String>,
    pub observations: Vec<MetricObservation>,
    pub verdicts: Vec<MetricVerdict>,
}

impl TestResult {
    /// Builds a result from collected observations and verdicts.
    ///
    /// Status is `failed` iff any verdict failed; skipped verdicts never
    /// affect it.
    pub fn from_evaluation(
        test_type: TestType,
        duration: Duration,
        observations: Vec<MetricObservation>,
        verdicts: Vec<MetricVerdict>,
        mut errors: Vec<String>,
    ) -> Self {
        let failed: Vec<&MetricVerdict> = verdicts
            .iter()
            .filter(|v| v.outcome == VerdictOutcome::Failed)
            .collect();

        for verdict in &failed {
            errors.push(verdict.describe());
        }

        let status = if failed.is_empty() && errors.is_empty() {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        };

        Self {
            test_type,
            status,
            duration,
            errors,
            observations,
            verdicts,
        }
    }

    /// An infrastructure failure, distinct from a threshold failure.
    pub fn infra_error(test_type: TestType, duration: Duration, message: impl Into<String>) -> Self {
        Self {
            test_type,
            status: TestStatus::Error,
            duration,
            errors: vec![message.into()],
            observations: Vec::new(),
            verdicts: Vec::new(),
        }
    }

    /// A test type that never ran (disabled, fail-fast, or cancelled).
    pub fn skipped(test_type: TestType, reason: impl Into<String>) -> Self {
        Self {
            test_type,
            status: TestStatus::Skipped,
            duration: Duration::ZERO,
            errors: vec![reason.into()],
            observations: Vec::new(),
            verdicts: Vec::new(),
        }
    }
}

/// Aggregated results of one harness invocation.
///
/// Built incrementally by the runner, finalized before hand-off to the
/// report writer, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteResult {
    pub suite: String,
    pub started_at: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// Suite-level infrastructure failure (deployment failed, target never
    /// reachable). Distinct from any individual test failing.
    #[serde(default)]
    pub error: Option<String>,
    pub results: Vec<TestResult>,
}

impl SuiteResult {
    pub fn new(suite: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            started_at: Utc::now(),
            duration: Duration::ZERO,
            error: None,
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, result: TestResult) {
        self.results.push(result);
    }

    /// Worst-of aggregation: `error > failed > skipped > passed`.
    ///
    /// A suite-level error dominates everything. An empty suite without one
    /// counts as passed (vacuous truth), matching a run where every selected
    /// type was filtered out.
    pub fn aggregate_status(&self) -> TestStatus {
        if self.error.is_some() {
            return TestStatus::Error;
        }
        self.results
            .iter()
            .map(|r| r.status)
            .max()
            .unwrap_or(TestStatus::Passed)
    }

    pub fn total_count(&self) -> usize {
        self.results.len()
    }

    pub fn count(&self, status: TestStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn all_passed(&self) -> bool {
        self.aggregate_status() == TestStatus::Passed
    }

    /// Results that failed or errored, for detail rendering.
    pub fn failures(&self) -> Vec<&TestResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, TestStatus::Failed | TestStatus::Error))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threshold::Direction;

    fn passed(test_type: TestType) -> TestResult {
        TestResult::from_evaluation(
            test_type,
            Duration::from_secs(1),
            vec![],
            vec![],
            vec![],
        )
    }

    #[test]
    fn test_status_severity_ordering() {
        assert!(TestStatus::Passed < TestStatus::Skipped);
        assert!(TestStatus::Skipped < TestStatus::Failed);
        assert!(TestStatus::Failed < TestStatus::Error);
    }

    #[test]
    fn test_from_evaluation_passes_without_failures() {
        let result = TestResult::from_evaluation(
            TestType::Sanity,
            Duration::from_millis(120),
            vec![MetricObservation::new("probe_latency_ms", 3.0, "ms")],
            vec![MetricVerdict::skipped("probe_latency_ms", 3.0)],
            vec![],
        );

        assert_eq!(result.status, TestStatus::Passed);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_from_evaluation_fails_on_failed_verdict() {
        let verdict = MetricVerdict::evaluated(
            "http_req_duration_p95_ms",
            900.0,
            500.0,
            Direction::UpperBound,
            VerdictOutcome::Failed,
        );
        let result = TestResult::from_evaluation(
            TestType::Load,
            Duration::from_secs(30),
            vec![],
            vec![verdict],
            vec![],
        );

        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("http_req_duration_p95_ms"));
    }

    #[test]
    fn test_from_evaluation_fails_on_errors_without_verdicts() {
        let result = TestResult::from_evaluation(
            TestType::Integration,
            Duration::from_secs(2),
            vec![],
            vec![],
            vec!["query 'up' returned no samples".to_string()],
        );

        assert_eq!(result.status, TestStatus::Failed);
    }

    #[test]
    fn test_aggregate_worst_of() {
        let mut suite = SuiteResult::new("nightly");
        suite.push(passed(TestType::Sanity));
        assert_eq!(suite.aggregate_status(), TestStatus::Passed);

        suite.push(TestResult::skipped(TestType::Load, "fail-fast"));
        assert_eq!(suite.aggregate_status(), TestStatus::Skipped);

        let mut failed = passed(TestType::Security);
        failed.status = TestStatus::Failed;
        suite.push(failed);
        assert_eq!(suite.aggregate_status(), TestStatus::Failed);

        suite.push(TestResult::infra_error(
            TestType::Stress,
            Duration::ZERO,
            "target unreachable",
        ));
        assert_eq!(suite.aggregate_status(), TestStatus::Error);
    }

    #[test]
    fn test_empty_suite_is_passed() {
        let suite = SuiteResult::new("empty");
        assert_eq!(suite.aggregate_status(), TestStatus::Passed);
        assert!(suite.all_passed());
    }

    #[test]
    fn test_suite_level_error_dominates() {
        let mut suite = SuiteResult::new("deploy-failed");
        suite.error = Some("deployment failed: quota exceeded".to_string());
        suite.push(passed(TestType::Sanity));

        assert_eq!(suite.aggregate_status(), TestStatus::Error);
    }

    #[test]
    fn test_counts_by_status() {
        let mut suite = SuiteResult::new("counts");
        suite.push(passed(TestType::Sanity));
        suite.push(passed(TestType::Integration));
        suite.push(TestResult::skipped(TestType::Load, "disabled"));
        suite.push(TestResult::infra_error(
            TestType::Chaos,
            Duration::ZERO,
            "boom",
        ));

        assert_eq!(suite.total_count(), 4);
        assert_eq!(suite.count(TestStatus::Passed), 2);
        assert_eq!(suite.count(TestStatus::Skipped), 1);
        assert_eq!(suite.count(TestStatus::Error), 1);
        assert_eq!(suite.count(TestStatus::Failed), 0);
        assert_eq!(suite.failures().len(), 1);
    }

    #[test]
    fn test_suite_serde_roundtrip_is_identical() {
        let mut suite = SuiteResult::new("roundtrip");
        suite.push(TestResult::from_evaluation(
            TestType::Sanity,
            Duration::from_millis(350),
            vec![MetricObservation::new("probe_latency_ms", 4.2, "ms")],
            vec![MetricVerdict::skipped("probe_latency_ms", 4.2)],
            vec![],
        ));
        suite.duration = Duration::from_secs(12);

        let json = serde_json::to_string_pretty(&suite).unwrap();
        let reparsed: SuiteResult = serde_json::from_str(&json).unwrap();
        let json_again = serde_json::to_string_pretty(&reparsed).unwrap();

        assert_eq!(suite, reparsed);
        assert_eq!(json, json_again);
    }
}
