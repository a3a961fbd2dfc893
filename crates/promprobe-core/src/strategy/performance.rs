//! Performance: repeated query sampling with latency percentiles.

use super::{StrategyContext, StrategyError, TestStrategy, mean, percentile};
use crate::result::{MetricObservation, TestResult};
use crate::threshold::evaluate;
use crate::types::TestType;
use async_trait::async_trait;
use promprobe_client::ClientError;
use std::time::Instant;
use tracing::debug;

/// Samples each configured query repeatedly and reports latency
/// percentiles across all samples.
pub struct PerformanceStrategy;

#[async_trait]
impl TestStrategy for PerformanceStrategy {
    fn test_type(&self) -> TestType {
        TestType::Performance
    }

    async fn run(&self, ctx: &StrategyContext<'_>) -> Result<TestResult, StrategyError> {
        let started = Instant::now();
        let perf = &ctx.config.tests.performance;

        let mut latencies_ms = Vec::new();
        let mut attempted = 0usize;
        let mut succeeded = 0usize;
        let mut errors = Vec::new();

        for query in &perf.queries {
            for sample in 0..perf.samples {
                attempted += 1;
                let sample_start = Instant::now();
                match ctx.client.query(query).await {
                    Ok(_) => {
                        succeeded += 1;
                        latencies_ms.push(sample_start.elapsed().as_secs_f64() * 1000.0);
                    }
                    Err(err @ (ClientError::Connection { .. } | ClientError::Timeout { .. })) => {
                        return Err(err.into());
                    }
                    Err(err) => {
                        // Record the first failure per query, not one per sample.
                        if sample == 0 {
                            errors.push(format!("query '{query}' failed: {err}"));
                        }
                    }
                }
            }
            debug!(query, samples = perf.samples, "Performance sampling complete");
        }

        let success_rate = if attempted == 0 {
            1.0
        } else {
            succeeded as f64 / attempted as f64
        };

        let mut observations = vec![MetricObservation::new(
            "query_success_rate",
            success_rate,
            "ratio",
        )];
        if let Some(avg) = mean(&latencies_ms) {
            observations.push(MetricObservation::new("query_latency_avg_ms", avg, "ms"));
        }
        if let Some(p95) = percentile(&latencies_ms, 95.0) {
            observations.push(MetricObservation::new("query_latency_p95_ms", p95, "ms"));
        }
        if let Some(p99) = percentile(&latencies_ms, 99.0) {
            observations.push(MetricObservation::new("query_latency_p99_ms", p99, "ms"));
        }

        let verdicts = evaluate(TestType::Performance, &observations, &ctx.config.thresholds);

        Ok(TestResult::from_evaluation(
            TestType::Performance,
            started.elapsed(),
            observations,
            verdicts,
            errors,
        ))
    }
}
