//! Regression: current query latency compared against a saved baseline.

use super::{StrategyContext, StrategyError, TestStrategy, mean};
use crate::result::{MetricObservation, SuiteResult, TestResult};
use crate::threshold::evaluate;
use crate::types::TestType;
use async_trait::async_trait;
use promprobe_client::ClientError;
use std::time::Instant;
use tracing::info;

/// Name of the baseline metric this type compares against.
const BASELINE_METRIC: &str = "query_latency_avg_ms";

/// Re-runs the configured queries and compares average latency against the
/// `performance` (or prior `regression`) observations in a saved report.
///
/// Without a baseline file there is nothing to compare; the type is
/// reported skipped rather than failed.
pub struct RegressionStrategy;

impl RegressionStrategy {
    /// Extracts the baseline latency from a saved suite report.
    fn baseline_latency(suite: &SuiteResult) -> Option<f64> {
        suite
            .results
            .iter()
            .filter(|r| {
                matches!(r.test_type, TestType::Performance | TestType::Regression)
            })
            .flat_map(|r| r.observations.iter())
            .find(|obs| obs.name == BASELINE_METRIC)
            .map(|obs| obs.value)
    }
}

#[async_trait]
impl TestStrategy for RegressionStrategy {
    fn test_type(&self) -> TestType {
        TestType::Regression
    }

    async fn run(&self, ctx: &StrategyContext<'_>) -> Result<TestResult, StrategyError> {
        let regression = &ctx.config.tests.regression;
        let Some(baseline_path) = &regression.baseline_file else {
            return Ok(TestResult::skipped(
                TestType::Regression,
                "no baseline_file configured",
            ));
        };

        let raw = std::fs::read_to_string(baseline_path).map_err(|err| {
            StrategyError::Other(format!(
                "failed to read baseline {}: {err}",
                baseline_path.display()
            ))
        })?;
        let baseline: SuiteResult = serde_json::from_str(&raw).map_err(|err| {
            StrategyError::Other(format!(
                "failed to parse baseline {}: {err}",
                baseline_path.display()
            ))
        })?;

        let Some(baseline_ms) = Self::baseline_latency(&baseline) else {
            return Ok(TestResult::skipped(
                TestType::Regression,
                format!("baseline report has no '{BASELINE_METRIC}' observation"),
            ));
        };

        let started = Instant::now();
        let mut latencies_ms = Vec::new();
        let mut errors = Vec::new();

        for query in &regression.queries {
            let query_start = Instant::now();
            match ctx.client.query(query).await {
                Ok(_) => latencies_ms.push(query_start.elapsed().as_secs_f64() * 1000.0),
                Err(err @ (ClientError::Connection { .. } | ClientError::Timeout { .. })) => {
                    return Err(err.into());
                }
                Err(err) => errors.push(format!("query '{query}' failed: {err}")),
            }
        }

        let current_ms = mean(&latencies_ms).unwrap_or(0.0);
        let delta_pct = if baseline_ms > 0.0 {
            (current_ms - baseline_ms) / baseline_ms * 100.0
        } else {
            0.0
        };

        info!(baseline_ms, current_ms, delta_pct, "Regression comparison");

        let observations = vec![
            MetricObservation::new(BASELINE_METRIC, current_ms, "ms"),
            MetricObservation::new("latency_delta_pct", delta_pct, "pct"),
        ];
        let verdicts = evaluate(TestType::Regression, &observations, &ctx.config.thresholds);

        Ok(TestResult::from_evaluation(
            TestType::Regression,
            started.elapsed(),
            observations,
            verdicts,
            errors,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::MetricObservation;
    use std::time::Duration;

    #[test]
    fn test_baseline_latency_prefers_performance_observation() {
        let mut suite = SuiteResult::new("baseline");
        suite.push(TestResult::from_evaluation(
            TestType::Performance,
            Duration::from_secs(1),
            vec![MetricObservation::new(BASELINE_METRIC, 42.0, "ms")],
            vec![],
            vec![],
        ));

        assert_eq!(RegressionStrategy::baseline_latency(&suite), Some(42.0));
    }

    #[test]
    fn test_baseline_latency_missing() {
        let suite = SuiteResult::new("empty");
        assert_eq!(RegressionStrategy::baseline_latency(&suite), None);
    }

    #[test]
    fn test_baseline_latency_ignores_other_types() {
        let mut suite = SuiteResult::new("baseline");
        suite.push(TestResult::from_evaluation(
            TestType::Sanity,
            Duration::from_secs(1),
            vec![MetricObservation::new(BASELINE_METRIC, 5.0, "ms")],
            vec![],
            vec![],
        ));

        assert_eq!(RegressionStrategy::baseline_latency(&suite), None);
    }
}
