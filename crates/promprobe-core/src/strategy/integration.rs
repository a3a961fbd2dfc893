//! Integration: PromQL query round trips against the live API.

use super::{StrategyContext, StrategyError, TestStrategy, mean};
use crate::result::{MetricObservation, TestResult};
use crate::threshold::evaluate;
use crate::types::TestType;
use async_trait::async_trait;
use promprobe_client::ClientError;
use std::time::Instant;
use tracing::debug;

/// Runs each configured query once and checks it decodes and answers.
pub struct IntegrationStrategy;

#[async_trait]
impl TestStrategy for IntegrationStrategy {
    fn test_type(&self) -> TestType {
        TestType::Integration
    }

    async fn run(&self, ctx: &StrategyContext<'_>) -> Result<TestResult, StrategyError> {
        let started = Instant::now();
        let queries = &ctx.config.tests.integration.queries;

        let mut errors = Vec::new();
        let mut latencies_ms = Vec::new();
        let mut succeeded = 0usize;

        for query in queries {
            let query_start = Instant::now();
            match ctx.client.query(query).await {
                Ok(result) => {
                    latencies_ms.push(query_start.elapsed().as_secs_f64() * 1000.0);
                    succeeded += 1;
                    debug!(query, samples = result.samples.len(), "Integration query ok");
                }
                // A dead target is an infrastructure error for the whole
                // type; a rejected query is this type failing its job.
                Err(err @ (ClientError::Connection { .. } | ClientError::Timeout { .. })) => {
                    return Err(err.into());
                }
                Err(err) => {
                    errors.push(format!("query '{query}' failed: {err}"));
                }
            }
        }

        let success_rate = if queries.is_empty() {
            1.0
        } else {
            succeeded as f64 / queries.len() as f64
        };

        let mut observations = vec![MetricObservation::new(
            "query_success_rate",
            success_rate,
            "ratio",
        )];
        if let Some(avg) = mean(&latencies_ms) {
            observations.push(MetricObservation::new("query_latency_avg_ms", avg, "ms"));
        }

        let verdicts = evaluate(TestType::Integration, &observations, &ctx.config.thresholds);

        Ok(TestResult::from_evaluation(
            TestType::Integration,
            started.elapsed(),
            observations,
            verdicts,
            errors,
        ))
    }
}
