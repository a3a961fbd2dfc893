//! Test-type strategies.
//!
//! Each test type's execution is a [`TestStrategy`]: it issues API client
//! calls and/or load-generation invocations, collects metric observations,
//! and evaluates them against the threshold table. Infrastructure failures
//! surface as [`StrategyError`]; the runner converts them into a
//! `TestResult` with status `error` so one broken type never crashes the
//! whole run.

mod chaos;
mod integration;
mod load;
mod performance;
mod regression;
mod reliability;
mod sanity;
mod scalability;
mod security;

pub use chaos::ChaosStrategy;
pub use integration::IntegrationStrategy;
pub use load::{EnduranceStrategy, LoadStrategy, StressStrategy};
pub use performance::PerformanceStrategy;
pub use regression::RegressionStrategy;
pub use reliability::ReliabilityStrategy;
pub use sanity::SanityStrategy;
pub use scalability::ScalabilityStrategy;
pub use security::SecurityStrategy;

use crate::config::TestConfig;
use crate::deployer::PlatformDeployer;
use crate::result::{MetricObservation, TestResult};
use crate::types::TestType;
use async_trait::async_trait;
use promprobe_client::{ClientError, K6Runner, LoadgenError, PromClient};

/// Errors from strategy execution that the runner converts into an
/// `error`-status result.
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("load generation error: {0}")]
    Loadgen(#[from] LoadgenError),

    #[error("{0}")]
    Other(String),
}

/// Everything a strategy needs to talk to the world.
///
/// The config and client are shared read-only; the deployer is absent in
/// connect-only mode.
pub struct StrategyContext<'a> {
    pub config: &'a TestConfig,
    pub client: &'a PromClient,
    pub k6: &'a K6Runner,
    pub deployer: Option<&'a dyn PlatformDeployer>,
}

/// One test type's execution.
#[async_trait]
pub trait TestStrategy: Send + Sync {
    /// The test type this strategy implements.
    fn test_type(&self) -> TestType;

    /// Runs the test type and produces its result.
    ///
    /// Threshold failures are a `failed` result, not an `Err`; `Err` is
    /// reserved for infrastructure problems.
    async fn run(&self, ctx: &StrategyContext<'_>) -> Result<TestResult, StrategyError>;
}

/// Builds the strategy for one test type.
pub fn strategy_for(test_type: TestType) -> Box<dyn TestStrategy> {
    match test_type {
        TestType::Sanity => Box::new(SanityStrategy),
        TestType::Integration => Box::new(IntegrationStrategy),
        TestType::Load => Box::new(LoadStrategy),
        TestType::Stress => Box::new(StressStrategy),
        TestType::Performance => Box::new(PerformanceStrategy),
        TestType::Scalability => Box::new(ScalabilityStrategy),
        TestType::Endurance => Box::new(EnduranceStrategy),
        TestType::Reliability => Box::new(ReliabilityStrategy),
        TestType::Chaos => Box::new(ChaosStrategy),
        TestType::Regression => Box::new(RegressionStrategy),
        TestType::Security => Box::new(SecurityStrategy),
    }
}

/// Probes target health with a short retry, classifying persistent
/// transport failure as unreachable.
///
/// 3 attempts, 2s apart; the first positive probe wins.
pub(crate) async fn probe_with_retry(client: &PromClient) -> Result<bool, ClientError> {
    const ATTEMPTS: u32 = 3;
    const BACKOFF: std::time::Duration = std::time::Duration::from_secs(2);

    let mut last_err = None;
    for attempt in 1..=ATTEMPTS {
        match client.health().await {
            Ok(healthy) => return Ok(healthy),
            Err(err) => {
                tracing::debug!(attempt, "health probe failed: {err}");
                last_err = Some(err);
                if attempt < ATTEMPTS {
                    tokio::time::sleep(BACKOFF).await;
                }
            }
        }
    }

    // By construction at least one attempt ran.
    Err(last_err.unwrap_or(ClientError::Timeout {
        url: client.base_url().to_string(),
    }))
}

/// Percentile over unsorted samples, nearest-rank.
pub(crate) fn percentile(samples: &[f64], p: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    Some(sorted[rank.clamp(1, sorted.len()) - 1])
}

/// Mean over samples.
pub(crate) fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Converts loadgen observations into the result model.
pub(crate) fn to_observations(raw: Vec<promprobe_client::Observation>) -> Vec<MetricObservation> {
    raw.into_iter()
        .map(|o| MetricObservation::new(o.name, o.value, o.unit))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_nearest_rank() {
        let samples: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&samples, 50.0), Some(50.0));
        assert_eq!(percentile(&samples, 95.0), Some(95.0));
        assert_eq!(percentile(&samples, 99.0), Some(99.0));
        assert_eq!(percentile(&samples, 100.0), Some(100.0));
    }

    #[test]
    fn test_percentile_small_sample() {
        assert_eq!(percentile(&[7.0], 99.0), Some(7.0));
        assert_eq!(percentile(&[], 99.0), None);
    }

    #[test]
    fn test_percentile_unsorted_input() {
        assert_eq!(percentile(&[30.0, 10.0, 20.0], 50.0), Some(20.0));
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[1.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_strategy_for_covers_all_types() {
        for test_type in TestType::all() {
            assert_eq!(strategy_for(*test_type).test_type(), *test_type);
        }
    }
}
