//! Suite runner.
//!
//! Drives one invocation through its phases:
//!
//! ```text
//! Idle -> Deploying -> Verifying -> Executing -> Aggregating -> TearingDown -> Done
//! ```
//!
//! `Deploying`/`TearingDown` are skipped in connect-only mode (a target URL
//! was supplied instead of a platform to provision). Exclusive test types
//! are never scheduled concurrently; this is a scheduling policy enforced by
//! the classification table, not a lock, because the protected resource is
//! the external target's capacity.

use crate::config::TestConfig;
use crate::deployer::{PlatformDeployer, wait_until_ready};
use crate::result::{SuiteResult, TestResult, TestStatus};
use crate::strategy::{StrategyContext, TestStrategy, strategy_for};
use crate::types::TestType;
use futures::StreamExt;
use promprobe_client::{K6Runner, PromClient};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Errors surfaced by the runner itself.
///
/// Most problems become part of the [`RunReport`] instead, so partial
/// results always reach the report writer.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("no test types selected")]
    NothingSelected,
}

/// Phases of the runner state machine, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Deploying,
    Verifying,
    Executing,
    Aggregating,
    TearingDown,
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Deploying => "deploying",
            Phase::Verifying => "verifying",
            Phase::Executing => "executing",
            Phase::Aggregating => "aggregating",
            Phase::TearingDown => "tearing-down",
            Phase::Done => "done",
        };
        f.write_str(s)
    }
}

/// Events emitted while the run progresses.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    PhaseChanged { phase: Phase },
    TypeStarted { test_type: TestType },
    TypeCompleted {
        test_type: TestType,
        status: TestStatus,
        duration: Duration,
    },
}

/// Progress callback for run updates.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Per-invocation execution options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Fan out non-exclusive test types on a bounded pool.
    pub parallel: bool,
    /// Abort remaining types after the first failed or errored result.
    pub fail_fast: bool,
}

/// How the run ended, orthogonal to the suite's pass/fail aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The target never became healthy; nothing executed.
    TargetUnreachable,
    /// The global ceiling expired mid-run.
    GlobalTimeout,
    /// SIGINT or an explicit cancellation.
    Cancelled,
}

impl RunOutcome {
    /// Maps the outcome and suite status onto the CLI exit code contract:
    /// 0 all-pass, 1 any failure, 3 target unreachable, 4 timeout exceeded.
    /// Cancellation uses the conventional 130.
    pub fn exit_code(&self, suite: &SuiteResult) -> i32 {
        match self {
            RunOutcome::TargetUnreachable => 3,
            RunOutcome::GlobalTimeout => 4,
            RunOutcome::Cancelled => 130,
            RunOutcome::Completed => i32::from(!suite.all_passed()),
        }
    }
}

/// Final product of a run: the suite result plus how the run ended.
#[derive(Debug)]
pub struct RunReport {
    pub suite: SuiteResult,
    pub outcome: RunOutcome,
}

type StrategyFactory = fn(TestType) -> Box<dyn TestStrategy>;

/// Orchestrates one harness invocation.
pub struct Runner<'a> {
    config: &'a TestConfig,
    k6: K6Runner,
    strategy_factory: StrategyFactory,
    on_progress: Option<ProgressCallback>,
    cancel: CancellationToken,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a TestConfig) -> Self {
        Self {
            config,
            k6: K6Runner::new(),
            strategy_factory: strategy_for,
            on_progress: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the strategy factory. Used by tests to inject fakes.
    pub fn with_strategy_factory(mut self, factory: StrategyFactory) -> Self {
        self.strategy_factory = factory;
        self
    }

    /// Sets a callback for progress updates.
    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// The token that cancels the in-flight run. Clone it into a signal
    /// handler to wire up SIGINT.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the selected test types and returns the report.
    ///
    /// Never fails after selection is validated: every problem is folded
    /// into the report so partial results always exist.
    pub async fn run(
        &self,
        deployer: Option<&dyn PlatformDeployer>,
        selected: &[TestType],
        options: &RunOptions,
    ) -> Result<RunReport, RunnerError> {
        let selected = TestType::canonical_selection(selected);
        if selected.is_empty() {
            return Err(RunnerError::NothingSelected);
        }

        let started = Instant::now();
        let mut suite = SuiteResult::new(&self.config.suite);

        // ── Deploying ────────────────────────────────────────────────────
        if let Some(deployer) = deployer {
            self.emit(ProgressEvent::PhaseChanged {
                phase: Phase::Deploying,
            });
            info!(platform = %deployer.platform(), "Deploying target");

            let deployed = match deployer.deploy().await {
                Ok(()) => wait_until_ready(deployer, self.config.deploy_timeout()).await,
                Err(err) => Err(err),
            };

            if let Err(err) = deployed {
                error!("Deployment failed: {err}");
                suite.error = Some(format!("deployment failed: {err}"));
                suite.duration = started.elapsed();
                self.teardown(Some(deployer)).await;
                self.emit(ProgressEvent::PhaseChanged { phase: Phase::Done });
                return Ok(RunReport {
                    suite,
                    outcome: RunOutcome::TargetUnreachable,
                });
            }
        }

        // ── Verifying ────────────────────────────────────────────────────
        self.emit(ProgressEvent::PhaseChanged {
            phase: Phase::Verifying,
        });

        let endpoint = match (&self.config.target.url, deployer) {
            (Some(url), _) => url.clone(),
            (None, Some(deployer)) => deployer.endpoint_url(),
            (None, None) => {
                suite.error = Some("no target: neither a URL nor a platform deployer".to_string());
                suite.duration = started.elapsed();
                return Ok(RunReport {
                    suite,
                    outcome: RunOutcome::TargetUnreachable,
                });
            }
        };

        let client = PromClient::new(endpoint, self.config.request_timeout());
        match crate::strategy::probe_with_retry(&client).await {
            Ok(true) => {}
            Ok(false) => {
                // Reachable but reporting unhealthy: the strategies will
                // observe and report it, so proceed.
                warn!("Target is reachable but reports unhealthy");
            }
            Err(err) => {
                error!("Target verification failed: {err}");
                suite.error = Some(format!("target unreachable: {err}"));
                suite.duration = started.elapsed();
                self.teardown(deployer).await;
                self.emit(ProgressEvent::PhaseChanged { phase: Phase::Done });
                return Ok(RunReport {
                    suite,
                    outcome: RunOutcome::TargetUnreachable,
                });
            }
        }

        // ── Executing ────────────────────────────────────────────────────
        self.emit(ProgressEvent::PhaseChanged {
            phase: Phase::Executing,
        });

        let ctx = StrategyContext {
            config: self.config,
            client: &client,
            k6: &self.k6,
            deployer,
        };

        let deadline = started + self.config.global_timeout();
        let mut outcome = RunOutcome::Completed;
        let mut results: Vec<TestResult> = Vec::new();
        let mut pending: Vec<TestType> = selected.clone();

        while !pending.is_empty() {
            if self.cancel.is_cancelled() {
                outcome = RunOutcome::Cancelled;
                break;
            }
            if Instant::now() >= deadline {
                outcome = RunOutcome::GlobalTimeout;
                break;
            }

            let batch = self.next_batch(&mut pending, options.parallel);
            let batch_results = self.execute_batch(&ctx, &batch, deadline).await;

            let mut stop = false;
            for result in batch_results {
                match result.status {
                    TestStatus::Error if result.errors.iter().any(|e| e.contains("cancelled")) => {
                        outcome = RunOutcome::Cancelled;
                        stop = true;
                    }
                    TestStatus::Error if result.errors.iter().any(|e| e.contains("timed out"))
                        && Instant::now() >= deadline =>
                    {
                        outcome = RunOutcome::GlobalTimeout;
                        stop = true;
                    }
                    TestStatus::Failed | TestStatus::Error if options.fail_fast => {
                        stop = true;
                    }
                    _ => {}
                }
                results.push(result);
            }

            if stop {
                break;
            }
        }

        // Whatever never ran is reported skipped, never silently dropped.
        for test_type in pending {
            if results.iter().any(|r| r.test_type == test_type) {
                continue;
            }
            let reason = match outcome {
                RunOutcome::GlobalTimeout => "global timeout exceeded",
                RunOutcome::Cancelled => "run cancelled",
                _ => "skipped by fail-fast",
            };
            results.push(TestResult::skipped(test_type, reason));
        }

        // ── Aggregating ──────────────────────────────────────────────────
        self.emit(ProgressEvent::PhaseChanged {
            phase: Phase::Aggregating,
        });

        // Results surface in canonical order regardless of completion order.
        results.sort_by_key(|r| {
            TestType::all()
                .iter()
                .position(|t| *t == r.test_type)
                .unwrap_or(usize::MAX)
        });
        for result in results {
            suite.push(result);
        }
        suite.duration = started.elapsed();

        // ── Tearing down ─────────────────────────────────────────────────
        self.teardown(deployer).await;
        self.emit(ProgressEvent::PhaseChanged { phase: Phase::Done });

        info!(
            total = suite.total_count(),
            passed = suite.count(TestStatus::Passed),
            failed = suite.count(TestStatus::Failed),
            status = %suite.aggregate_status(),
            "Run complete"
        );

        Ok(RunReport { suite, outcome })
    }

    /// Picks the next schedulable batch from the pending list.
    ///
    /// Sequential mode takes one type at a time. Parallel mode takes the
    /// leading run of non-exclusive types (capped by `max_parallel`), or a
    /// single exclusive type if one is next.
    fn next_batch(&self, pending: &mut Vec<TestType>, parallel: bool) -> Vec<TestType> {
        if !parallel || pending[0].exclusive() {
            return vec![pending.remove(0)];
        }

        let take = pending
            .iter()
            .take_while(|t| !t.exclusive())
            .count()
            .min(self.config.max_parallel.max(1));
        pending.drain(..take).collect()
    }

    /// Executes one batch, concurrently when it holds more than one type.
    async fn execute_batch(
        &self,
        ctx: &StrategyContext<'_>,
        batch: &[TestType],
        deadline: Instant,
    ) -> Vec<TestResult> {
        let futures = batch.iter().map(|test_type| self.run_one(ctx, *test_type, deadline));
        let mut results: Vec<TestResult> = futures::stream::iter(futures)
            .buffer_unordered(batch.len().max(1))
            .collect()
            .await;

        // Stable order within the batch too.
        results.sort_by_key(|r| {
            TestType::all()
                .iter()
                .position(|t| *t == r.test_type)
                .unwrap_or(usize::MAX)
        });
        results
    }

    /// Runs one test type under its own timeout, the global deadline, and
    /// the cancellation token.
    async fn run_one(
        &self,
        ctx: &StrategyContext<'_>,
        test_type: TestType,
        deadline: Instant,
    ) -> TestResult {
        self.emit(ProgressEvent::TypeStarted { test_type });
        let strategy = (self.strategy_factory)(test_type);
        let started = Instant::now();

        let type_budget = self.config.test_timeout(test_type);
        let remaining = deadline.saturating_duration_since(started);
        let budget = type_budget.min(remaining);

        let result = tokio::select! {
            () = self.cancel.cancelled() => TestResult::infra_error(
                test_type,
                started.elapsed(),
                "cancelled by signal",
            ),
            outcome = tokio::time::timeout(budget, strategy.run(ctx)) => match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => {
                    warn!(%test_type, "Strategy failed: {err}");
                    TestResult::infra_error(test_type, started.elapsed(), err.to_string())
                }
                Err(_) => TestResult::infra_error(
                    test_type,
                    started.elapsed(),
                    format!("timed out after {}s", budget.as_secs()),
                ),
            },
        };

        self.emit(ProgressEvent::TypeCompleted {
            test_type,
            status: result.status,
            duration: result.duration,
        });
        result
    }

    /// Best-effort teardown with its own bounded timeout. A teardown
    /// failure is logged but never changes the run's outcome.
    async fn teardown(&self, deployer: Option<&dyn PlatformDeployer>) {
        let Some(deployer) = deployer else { return };

        self.emit(ProgressEvent::PhaseChanged {
            phase: Phase::TearingDown,
        });
        info!(platform = %deployer.platform(), "Tearing down target");

        match tokio::time::timeout(self.config.deploy_timeout(), deployer.teardown()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("Teardown failed: {err}"),
            Err(_) => warn!("Teardown timed out"),
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.on_progress {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::MetricObservation;
    use crate::strategy::StrategyError;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncWriteExt;

    /// Serves plain HTTP 200 to every request on an ephemeral port and
    /// returns its base URL. Lives until the test's runtime shuts down.
    async fn serve_ok() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    use tokio::io::AsyncReadExt;
                    let _ = socket.read(&mut buf).await;
                    let _ = socket
                        .write_all(
                            b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                        )
                        .await;
                });
            }
        });

        format!("http://{addr}")
    }

    struct StubStrategy {
        test_type: TestType,
        status: TestStatus,
    }

    #[async_trait]
    impl TestStrategy for StubStrategy {
        fn test_type(&self) -> TestType {
            self.test_type
        }

        async fn run(&self, _ctx: &StrategyContext<'_>) -> Result<TestResult, StrategyError> {
            match self.status {
                TestStatus::Passed => Ok(TestResult::from_evaluation(
                    self.test_type,
                    Duration::from_millis(5),
                    vec![MetricObservation::new("stub_metric", 1.0, "count")],
                    vec![],
                    vec![],
                )),
                TestStatus::Failed => Ok(TestResult::from_evaluation(
                    self.test_type,
                    Duration::from_millis(5),
                    vec![],
                    vec![],
                    vec!["stub failure".to_string()],
                )),
                TestStatus::Error => Err(StrategyError::Other("stub infrastructure error".into())),
                TestStatus::Skipped => Ok(TestResult::skipped(self.test_type, "stub skip")),
            }
        }
    }

    fn all_pass_factory(test_type: TestType) -> Box<dyn TestStrategy> {
        Box::new(StubStrategy {
            test_type,
            status: TestStatus::Passed,
        })
    }

    fn sanity_fails_factory(test_type: TestType) -> Box<dyn TestStrategy> {
        Box::new(StubStrategy {
            test_type,
            status: if test_type == TestType::Sanity {
                TestStatus::Failed
            } else {
                TestStatus::Passed
            },
        })
    }

    fn hang_factory(test_type: TestType) -> Box<dyn TestStrategy> {
        struct Hang(TestType);

        #[async_trait]
        impl TestStrategy for Hang {
            fn test_type(&self) -> TestType {
                self.0
            }

            async fn run(
                &self,
                _ctx: &StrategyContext<'_>,
            ) -> Result<TestResult, StrategyError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("sleep outlives every test timeout")
            }
        }

        Box::new(Hang(test_type))
    }

    fn config_for(url: String) -> TestConfig {
        let mut config = TestConfig::default();
        config.target.url = Some(url);
        config
    }

    #[tokio::test]
    async fn test_unreachable_target_yields_suite_error_and_exit_3() {
        let mut config = TestConfig::default();
        // Port 1 refuses connections immediately, so the retry loop is fast.
        config.target.url = Some("http://127.0.0.1:1".to_string());

        let runner = Runner::new(&config).with_strategy_factory(all_pass_factory);
        let report = runner
            .run(None, &[TestType::Sanity], &RunOptions::default())
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::TargetUnreachable);
        assert_eq!(report.suite.total_count(), 0);
        assert_eq!(report.suite.aggregate_status(), TestStatus::Error);
        assert_eq!(report.outcome.exit_code(&report.suite), 3);
    }

    #[tokio::test]
    async fn test_all_pass_run() {
        let url = serve_ok().await;
        let config = config_for(url);

        let runner = Runner::new(&config).with_strategy_factory(all_pass_factory);
        let report = runner
            .run(
                None,
                &[TestType::Sanity, TestType::Security],
                &RunOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert!(report.suite.all_passed());
        assert_eq!(report.suite.total_count(), 2);
        assert_eq!(report.outcome.exit_code(&report.suite), 0);
    }

    #[tokio::test]
    async fn test_fail_fast_skips_remaining_types() {
        let url = serve_ok().await;
        let config = config_for(url);

        let runner = Runner::new(&config).with_strategy_factory(sanity_fails_factory);
        let options = RunOptions {
            fail_fast: true,
            ..RunOptions::default()
        };
        let report = runner
            .run(None, &[TestType::Sanity, TestType::Load], &options)
            .await
            .unwrap();

        assert_eq!(report.suite.results[0].test_type, TestType::Sanity);
        assert_eq!(report.suite.results[0].status, TestStatus::Failed);
        assert_eq!(report.suite.results[1].test_type, TestType::Load);
        assert_eq!(report.suite.results[1].status, TestStatus::Skipped);
        assert_eq!(report.outcome.exit_code(&report.suite), 1);
    }

    #[tokio::test]
    async fn test_without_fail_fast_everything_runs() {
        let url = serve_ok().await;
        let config = config_for(url);

        let runner = Runner::new(&config).with_strategy_factory(sanity_fails_factory);
        let report = runner
            .run(
                None,
                &[TestType::Sanity, TestType::Security],
                &RunOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(report.suite.results[0].status, TestStatus::Failed);
        assert_eq!(report.suite.results[1].status, TestStatus::Passed);
    }

    #[tokio::test]
    async fn test_parallel_results_in_canonical_order() {
        let url = serve_ok().await;
        let config = config_for(url);

        let runner = Runner::new(&config).with_strategy_factory(all_pass_factory);
        let options = RunOptions {
            parallel: true,
            ..RunOptions::default()
        };
        let selected = [
            TestType::Security,
            TestType::Sanity,
            TestType::Load,
            TestType::Integration,
        ];
        let report = runner.run(None, &selected, &options).await.unwrap();

        let order: Vec<TestType> = report.suite.results.iter().map(|r| r.test_type).collect();
        assert_eq!(
            order,
            vec![
                TestType::Sanity,
                TestType::Integration,
                TestType::Load,
                TestType::Security,
            ]
        );
    }

    #[tokio::test]
    async fn test_per_type_timeout_becomes_error_result() {
        let url = serve_ok().await;
        let mut config = config_for(url);
        config.tests.sanity.timeout = "1s".to_string();

        let runner = Runner::new(&config).with_strategy_factory(hang_factory);
        let report = runner
            .run(None, &[TestType::Sanity], &RunOptions::default())
            .await
            .unwrap();

        assert_eq!(report.suite.results[0].status, TestStatus::Error);
        assert!(report.suite.results[0].errors[0].contains("timed out"));
    }

    #[tokio::test]
    async fn test_global_timeout_skips_remaining() {
        let url = serve_ok().await;
        let mut config = config_for(url);
        config.global_timeout = "1s".to_string();

        let runner = Runner::new(&config).with_strategy_factory(hang_factory);
        let report = runner
            .run(
                None,
                &[TestType::Sanity, TestType::Security],
                &RunOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::GlobalTimeout);
        assert_eq!(report.outcome.exit_code(&report.suite), 4);
        let skipped = report
            .suite
            .results
            .iter()
            .find(|r| r.test_type == TestType::Security)
            .unwrap();
        assert_eq!(skipped.status, TestStatus::Skipped);
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_reports_cancelled() {
        let url = serve_ok().await;
        let config = config_for(url);

        let runner = Runner::new(&config).with_strategy_factory(all_pass_factory);
        runner.cancellation_token().cancel();
        let report = runner
            .run(None, &[TestType::Sanity], &RunOptions::default())
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_empty_selection_is_an_error() {
        let config = TestConfig::default();
        let runner = Runner::new(&config);
        let result = runner.run(None, &[], &RunOptions::default()).await;

        assert!(matches!(result, Err(RunnerError::NothingSelected)));
    }

    #[tokio::test]
    async fn test_progress_events_are_emitted() {
        let url = serve_ok().await;
        let config = config_for(url);

        let events = Arc::new(AtomicUsize::new(0));
        let counter = events.clone();
        let runner = Runner::new(&config)
            .with_strategy_factory(all_pass_factory)
            .on_progress(Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));

        runner
            .run(None, &[TestType::Sanity], &RunOptions::default())
            .await
            .unwrap();

        // Verifying, Executing, TypeStarted, TypeCompleted, Aggregating, Done.
        assert!(events.load(Ordering::SeqCst) >= 5);
    }

    #[test]
    fn test_next_batch_sequential_takes_one() {
        let config = TestConfig::default();
        let runner = Runner::new(&config);
        let mut pending = vec![TestType::Sanity, TestType::Integration];

        let batch = runner.next_batch(&mut pending, false);
        assert_eq!(batch, vec![TestType::Sanity]);
        assert_eq!(pending, vec![TestType::Integration]);
    }

    #[test]
    fn test_next_batch_parallel_groups_non_exclusive() {
        let config = TestConfig::default();
        let runner = Runner::new(&config);
        let mut pending = vec![
            TestType::Sanity,
            TestType::Integration,
            TestType::Load,
            TestType::Security,
        ];

        let batch = runner.next_batch(&mut pending, true);
        assert_eq!(batch, vec![TestType::Sanity, TestType::Integration]);

        // Load is exclusive and runs alone.
        let batch = runner.next_batch(&mut pending, true);
        assert_eq!(batch, vec![TestType::Load]);

        let batch = runner.next_batch(&mut pending, true);
        assert_eq!(batch, vec![TestType::Security]);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_next_batch_respects_max_parallel() {
        let mut config = TestConfig::default();
        config.max_parallel = 1;
        let runner = Runner::new(&config);
        let mut pending = vec![TestType::Sanity, TestType::Integration];

        let batch = runner.next_batch(&mut pending, true);
        assert_eq!(batch.len(), 1);
    }
}
