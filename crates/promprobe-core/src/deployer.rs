//! The deployer seam.
//!
//! `promprobe-deploy` provides one implementation per platform; the runner
//! and the CLI only ever see this trait.

use crate::types::{DeploymentMode, Platform};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// Errors from provisioning or releasing a target.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Provisioning failed unrecoverably (quota, missing tooling, bad image).
    #[error("deployment on {platform} failed: {cause}")]
    Provisioning { platform: Platform, cause: String },

    /// The requested platform/mode combination is invalid.
    ///
    /// Normally caught at config-validation time; this is the deploy-time
    /// backstop.
    #[error("deployment mode '{mode}' is not supported on platform '{platform}'")]
    UnsupportedMode {
        platform: Platform,
        mode: DeploymentMode,
    },

    /// The target never became ready within the wait timeout.
    #[error("target on {platform} not ready after {waited_secs}s")]
    NotReady { platform: Platform, waited_secs: u64 },

    /// Transport-level failure while checking target health.
    #[error("health check transport failure: {0}")]
    HealthCheck(String),
}

/// Capability set shared by every deployment target.
///
/// Implementations must make `deploy` idempotent and `teardown` safe on
/// partial state.
#[async_trait]
pub trait PlatformDeployer: Send + Sync {
    /// The platform this deployer provisions.
    fn platform(&self) -> Platform;

    /// The topology this deployer was configured for.
    fn deployment_mode(&self) -> DeploymentMode;

    /// Base URL of the deployed target's HTTP surface.
    fn endpoint_url(&self) -> String;

    /// Brings the target to a running state.
    ///
    /// Calling this when the target is already running detects the existing
    /// state and returns success.
    async fn deploy(&self) -> Result<(), DeployError>;

    /// Releases everything `deploy` created. Safe to call on partial state;
    /// "nothing to clean up" is success.
    async fn teardown(&self) -> Result<(), DeployError>;

    /// Non-blocking liveness check. A merely-unhealthy target is `Ok(false)`;
    /// only failure to attempt the check is an error.
    async fn is_healthy(&self) -> Result<bool, DeployError>;

    /// Non-blocking readiness check, same error contract as `is_healthy`.
    async fn is_ready(&self) -> Result<bool, DeployError>;
}

/// Polls the deployer until the target is healthy and ready.
///
/// Fixed 2s interval, bounded by `timeout`; surfaced as one blocking call.
pub async fn wait_until_ready(
    deployer: &dyn PlatformDeployer,
    timeout: Duration,
) -> Result<(), DeployError> {
    const POLL_INTERVAL: Duration = Duration::from_secs(2);

    let started = std::time::Instant::now();
    loop {
        let healthy = deployer.is_healthy().await.unwrap_or(false);
        let ready = healthy && deployer.is_ready().await.unwrap_or(false);
        if ready {
            info!(
                platform = %deployer.platform(),
                waited_ms = started.elapsed().as_millis() as u64,
                "Target is healthy and ready"
            );
            return Ok(());
        }

        if started.elapsed() >= timeout {
            return Err(DeployError::NotReady {
                platform: deployer.platform(),
                waited_secs: started.elapsed().as_secs(),
            });
        }

        debug!(platform = %deployer.platform(), healthy, "Target not ready yet, polling");
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Deployer that becomes ready after a fixed number of polls.
    struct CountdownDeployer {
        polls_until_ready: u32,
        polls: AtomicU32,
    }

    impl CountdownDeployer {
        fn new(polls_until_ready: u32) -> Self {
            Self {
                polls_until_ready,
                polls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl PlatformDeployer for CountdownDeployer {
        fn platform(&self) -> Platform {
            Platform::Container
        }

        fn deployment_mode(&self) -> DeploymentMode {
            DeploymentMode::SingleInstance
        }

        fn endpoint_url(&self) -> String {
            "http://localhost:9090".to_string()
        }

        async fn deploy(&self) -> Result<(), DeployError> {
            Ok(())
        }

        async fn teardown(&self) -> Result<(), DeployError> {
            Ok(())
        }

        async fn is_healthy(&self) -> Result<bool, DeployError> {
            Ok(self.polls.fetch_add(1, Ordering::SeqCst) >= self.polls_until_ready)
        }

        async fn is_ready(&self) -> Result<bool, DeployError> {
            Ok(true)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_ready_polls_until_success() {
        let deployer = CountdownDeployer::new(3);
        wait_until_ready(&deployer, Duration::from_secs(30))
            .await
            .unwrap();

        assert!(deployer.polls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_ready_times_out() {
        let deployer = CountdownDeployer::new(u32::MAX);
        let err = wait_until_ready(&deployer, Duration::from_secs(10))
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::NotReady { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn test_ready_on_first_poll_returns_immediately() {
        let deployer = CountdownDeployer::new(0);
        wait_until_ready(&deployer, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(deployer.polls.load(Ordering::SeqCst), 1);
    }
}
