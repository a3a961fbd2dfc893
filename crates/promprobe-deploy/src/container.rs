//! Container deployer: one Prometheus container via the local runtime.

use crate::command::{CommandRunner, SystemCommandRunner};
use crate::health::probe_to_health;
use async_trait::async_trait;
use promprobe_client::PromClient;
use promprobe_core::{DeployError, DeploymentMode, Platform, PlatformDeployer, TestConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

const CONTAINER_NAME: &str = "promprobe-prometheus";
const CONTAINER_PORT: u16 = 9090;

/// Runs Prometheus as a named container, single-instance only.
pub struct ContainerDeployer {
    docker: PathBuf,
    image: String,
    client: PromClient,
    commands: Arc<dyn CommandRunner>,
}

impl ContainerDeployer {
    pub fn new(config: &TestConfig) -> Self {
        Self::with_runner(config, Arc::new(SystemCommandRunner))
    }

    pub fn with_runner(config: &TestConfig, commands: Arc<dyn CommandRunner>) -> Self {
        let version = config.target.version.trim_start_matches('v');
        Self {
            docker: config.tools.docker.clone(),
            image: format!("prom/prometheus:v{version}"),
            client: PromClient::new(
                format!("http://127.0.0.1:{CONTAINER_PORT}"),
                config.request_timeout(),
            ),
            commands,
        }
    }

    /// True if the named container exists and is running.
    async fn container_running(&self) -> bool {
        let output = self
            .commands
            .run(
                &self.docker,
                &[
                    "inspect",
                    "--format",
                    "{{.State.Running}}",
                    CONTAINER_NAME,
                ],
            )
            .await;

        matches!(output, Ok(out) if out.success && out.stdout.trim() == "true")
    }
}

#[async_trait]
impl PlatformDeployer for ContainerDeployer {
    fn platform(&self) -> Platform {
        Platform::Container
    }

    fn deployment_mode(&self) -> DeploymentMode {
        DeploymentMode::SingleInstance
    }

    fn endpoint_url(&self) -> String {
        self.client.base_url().to_string()
    }

    async fn deploy(&self) -> Result<(), DeployError> {
        if self.container_running().await {
            info!(container = CONTAINER_NAME, "Container already running, reusing it");
            return Ok(());
        }

        // A stopped leftover with the same name would make `docker run`
        // fail; clear it first.
        let _ = self
            .commands
            .run(&self.docker, &["rm", "-f", CONTAINER_NAME])
            .await;

        let port_mapping = format!("{CONTAINER_PORT}:9090");
        let output = self
            .commands
            .run(
                &self.docker,
                &[
                    "run",
                    "-d",
                    "--name",
                    CONTAINER_NAME,
                    "-p",
                    &port_mapping,
                    &self.image,
                ],
            )
            .await
            .map_err(|err| DeployError::Provisioning {
                platform: Platform::Container,
                cause: format!("failed to run {}: {err}", self.docker.display()),
            })?;

        if !output.success {
            return Err(DeployError::Provisioning {
                platform: Platform::Container,
                cause: format!("docker run failed: {}", output.stderr.trim()),
            });
        }

        debug!(container = CONTAINER_NAME, image = %self.image, "Container started");
        Ok(())
    }

    async fn teardown(&self) -> Result<(), DeployError> {
        // `rm -f` on a missing container exits nonzero; that is "nothing to
        // clean up" and counts as success.
        let output = self
            .commands
            .run(&self.docker, &["rm", "-f", CONTAINER_NAME])
            .await;

        match output {
            Ok(out) if out.success => info!(container = CONTAINER_NAME, "Container removed"),
            Ok(_) => debug!(container = CONTAINER_NAME, "No container to remove"),
            Err(err) => debug!("docker unavailable during teardown: {err}"),
        }
        Ok(())
    }

    async fn is_healthy(&self) -> Result<bool, DeployError> {
        probe_to_health(self.client.health().await)
    }

    async fn is_ready(&self) -> Result<bool, DeployError> {
        probe_to_health(self.client.ready().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use std::path::Path;
    use std::sync::Mutex;

    /// Scripted fake: returns canned outputs and records invocations.
    struct ScriptedRunner {
        outputs: Mutex<Vec<CommandOutput>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn new(outputs: Vec<CommandOutput>) -> Self {
            Self {
                outputs: Mutex::new(outputs),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, program: &Path, args: &[&str]) -> std::io::Result<CommandOutput> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {}", program.display(), args.join(" ")));

            let mut outputs = self.outputs.lock().unwrap();
            if outputs.is_empty() {
                Ok(CommandOutput::ok(""))
            } else {
                Ok(outputs.remove(0))
            }
        }
    }

    fn deployer_with(outputs: Vec<CommandOutput>) -> (ContainerDeployer, Arc<ScriptedRunner>) {
        let runner = Arc::new(ScriptedRunner::new(outputs));
        let config = TestConfig::default();
        let deployer = ContainerDeployer::with_runner(&config, runner.clone());
        (deployer, runner)
    }

    #[tokio::test]
    async fn test_deploy_skips_when_container_already_running() {
        let (deployer, runner) = deployer_with(vec![CommandOutput::ok("true\n")]);

        deployer.deploy().await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains("inspect"));
    }

    #[tokio::test]
    async fn test_deploy_runs_container_when_absent() {
        let (deployer, runner) = deployer_with(vec![
            CommandOutput::failed(1, "no such container"), // inspect
            CommandOutput::ok(""),                         // rm -f leftover
            CommandOutput::ok("abcdef123456"),             // run -d
        ]);

        deployer.deploy().await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[2].contains("run -d --name promprobe-prometheus"));
        assert!(calls[2].contains("prom/prometheus:v2.53.0"));
    }

    #[tokio::test]
    async fn test_deploy_failure_is_provisioning_error() {
        let (deployer, _runner) = deployer_with(vec![
            CommandOutput::failed(1, "no such container"),
            CommandOutput::ok(""),
            CommandOutput::failed(125, "port is already allocated"),
        ]);

        let err = deployer.deploy().await.unwrap_err();
        match err {
            DeployError::Provisioning { platform, cause } => {
                assert_eq!(platform, Platform::Container);
                assert!(cause.contains("port is already allocated"));
            }
            other => panic!("expected Provisioning, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_teardown_tolerates_missing_container() {
        let (deployer, _runner) =
            deployer_with(vec![CommandOutput::failed(1, "no such container")]);

        deployer.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_version_prefix_normalized_in_image_tag() {
        let mut config = TestConfig::default();
        config.target.version = "2.48.1".to_string();
        let deployer =
            ContainerDeployer::with_runner(&config, Arc::new(ScriptedRunner::new(vec![])));

        assert_eq!(deployer.image, "prom/prometheus:v2.48.1");
    }
}
