//! Security: the admin surface must be locked down.

use super::{StrategyContext, StrategyError, TestStrategy, probe_with_retry};
use crate::result::{MetricObservation, TestResult};
use crate::threshold::evaluate;
use crate::types::TestType;
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, warn};

/// Probes admin endpoints without credentials; any 2xx answer means the
/// endpoint is exposed.
pub struct SecurityStrategy;

#[async_trait]
impl TestStrategy for SecurityStrategy {
    fn test_type(&self) -> TestType {
        TestType::Security
    }

    async fn run(&self, ctx: &StrategyContext<'_>) -> Result<TestResult, StrategyError> {
        let started = Instant::now();
        let security = &ctx.config.tests.security;

        probe_with_retry(ctx.client).await?;

        let mut exposed = 0u32;
        let mut errors = Vec::new();

        for endpoint in &security.endpoints {
            let open = ctx.client.probe_endpoint(endpoint).await?;
            debug!(endpoint, open, "Security probe");

            if open && security.expect_auth {
                exposed += 1;
                warn!(endpoint, "Admin endpoint answered without credentials");
                errors.push(format!(
                    "endpoint {endpoint} answered 2xx without credentials"
                ));
            }
        }

        let observations = vec![MetricObservation::new(
            "unauthenticated_admin_endpoints",
            f64::from(exposed),
            "count",
        )];
        let verdicts = evaluate(TestType::Security, &observations, &ctx.config.thresholds);

        Ok(TestResult::from_evaluation(
            TestType::Security,
            started.elapsed(),
            observations,
            verdicts,
            errors,
        ))
    }
}
