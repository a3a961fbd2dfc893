//! Managed-Kubernetes deployers.
//!
//! EKS, GKE, AKS, and OpenShift share one helm/kubectl driver and differ in
//! platform identity and default kube context. These are the only variants
//! that support multi-replica mode.

use crate::command::{CommandRunner, SystemCommandRunner};
use crate::health::probe_to_health;
use async_trait::async_trait;
use promprobe_client::PromClient;
use promprobe_core::{DeployError, DeploymentMode, Platform, PlatformDeployer, TestConfig};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const RELEASE_NAME: &str = "promprobe";
const CHART: &str = "prometheus-community/prometheus";
const SERVICE: &str = "promprobe-server";
/// Local side of the port-forward; distinct from 9090 so a Kubernetes run
/// never collides with a local-binary target on the same host.
const FORWARD_PORT: u16 = 19090;

/// Replica count used for multi-replica mode.
const MULTI_REPLICAS: u32 = 3;

/// Shared helm/kubectl driver behind the four managed variants.
pub struct KubernetesDriver {
    platform: Platform,
    mode: DeploymentMode,
    kubectl: PathBuf,
    helm: PathBuf,
    context: String,
    namespace: String,
    version: String,
    client: PromClient,
    /// The kubectl port-forward child, killed on teardown.
    port_forward: Mutex<Option<Child>>,
    commands: Arc<dyn CommandRunner>,
}

impl KubernetesDriver {
    pub fn new(platform: Platform, config: &TestConfig) -> Self {
        Self::with_runner(platform, config, Arc::new(SystemCommandRunner))
    }

    pub fn with_runner(
        platform: Platform,
        config: &TestConfig,
        commands: Arc<dyn CommandRunner>,
    ) -> Self {
        // The kube context can be pinned via credentials; otherwise the
        // platform name doubles as the conventional context alias.
        let context = config
            .credentials
            .get("kube_context")
            .cloned()
            .unwrap_or_else(|| platform.to_string());

        Self {
            platform,
            mode: config.deployment_mode,
            kubectl: config.tools.kubectl.clone(),
            helm: config.tools.helm.clone(),
            context,
            namespace: config.target.namespace.clone(),
            version: config.target.version.trim_start_matches('v').to_string(),
            client: PromClient::new(
                format!("http://127.0.0.1:{FORWARD_PORT}"),
                config.request_timeout(),
            ),
            port_forward: Mutex::new(None),
            commands,
        }
    }

    fn replicas(&self) -> u32 {
        match self.mode {
            DeploymentMode::SingleInstance => 1,
            DeploymentMode::MultiReplica => MULTI_REPLICAS,
        }
    }

    /// True if the helm release already exists in the namespace.
    async fn release_exists(&self) -> bool {
        let output = self
            .commands
            .run(
                &self.helm,
                &[
                    "status",
                    RELEASE_NAME,
                    "--kube-context",
                    &self.context,
                    "--namespace",
                    &self.namespace,
                ],
            )
            .await;

        matches!(output, Ok(out) if out.success)
    }

    async fn ensure_namespace(&self) -> Result<(), DeployError> {
        let output = self
            .commands
            .run(
                &self.kubectl,
                &[
                    "--context",
                    &self.context,
                    "create",
                    "namespace",
                    &self.namespace,
                ],
            )
            .await
            .map_err(|err| self.provisioning(format!("kubectl failed: {err}")))?;

        // AlreadyExists is fine; anything else is not.
        if !output.success && !output.stderr.contains("AlreadyExists") {
            return Err(self.provisioning(format!(
                "failed to create namespace {}: {}",
                self.namespace,
                output.stderr.trim()
            )));
        }
        Ok(())
    }

    async fn helm_install(&self) -> Result<(), DeployError> {
        let replicas = self.replicas().to_string();
        let tag = format!("server.image.tag=v{}", self.version);
        let replica_set = format!("server.replicaCount={replicas}");

        let output = self
            .commands
            .run(
                &self.helm,
                &[
                    "upgrade",
                    "--install",
                    RELEASE_NAME,
                    CHART,
                    "--kube-context",
                    &self.context,
                    "--namespace",
                    &self.namespace,
                    "--set",
                    &replica_set,
                    "--set",
                    &tag,
                    "--wait",
                ],
            )
            .await
            .map_err(|err| self.provisioning(format!("helm failed: {err}")))?;

        if !output.success {
            return Err(self.provisioning(format!(
                "helm upgrade --install failed: {}",
                output.stderr.trim()
            )));
        }
        Ok(())
    }

    /// Starts (or restarts) the background port-forward to the service.
    async fn ensure_port_forward(&self) -> Result<(), DeployError> {
        let mut guard = self.port_forward.lock().await;
        if let Some(child) = guard.as_mut()
            && child.try_wait().ok().flatten().is_none()
        {
            return Ok(());
        }

        let forward = format!("{FORWARD_PORT}:80");
        let service = format!("svc/{SERVICE}");
        let child = Command::new(&self.kubectl)
            .args([
                "--context",
                &self.context,
                "--namespace",
                &self.namespace,
                "port-forward",
                &service,
                &forward,
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| self.provisioning(format!("failed to start port-forward: {err}")))?;

        debug!(pid = ?child.id(), "Port-forward started");
        *guard = Some(child);
        Ok(())
    }

    fn provisioning(&self, cause: String) -> DeployError {
        DeployError::Provisioning {
            platform: self.platform,
            cause,
        }
    }
}

#[async_trait]
impl PlatformDeployer for KubernetesDriver {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn deployment_mode(&self) -> DeploymentMode {
        self.mode
    }

    fn endpoint_url(&self) -> String {
        self.client.base_url().to_string()
    }

    async fn deploy(&self) -> Result<(), DeployError> {
        if self.release_exists().await {
            info!(release = RELEASE_NAME, namespace = %self.namespace, "Release already deployed, reusing it");
            return self.ensure_port_forward().await;
        }

        info!(
            platform = %self.platform,
            namespace = %self.namespace,
            replicas = self.replicas(),
            "Installing Prometheus chart"
        );

        self.ensure_namespace().await?;
        self.helm_install().await?;
        self.ensure_port_forward().await
    }

    async fn teardown(&self) -> Result<(), DeployError> {
        if let Some(mut child) = self.port_forward.lock().await.take() {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }

        let output = self
            .commands
            .run(
                &self.helm,
                &[
                    "uninstall",
                    RELEASE_NAME,
                    "--kube-context",
                    &self.context,
                    "--namespace",
                    &self.namespace,
                ],
            )
            .await;

        match output {
            Ok(out) if out.success => info!(release = RELEASE_NAME, "Release uninstalled"),
            Ok(out) if out.stderr.contains("not found") => {
                debug!(release = RELEASE_NAME, "No release to uninstall");
            }
            Ok(out) => warn!("helm uninstall failed: {}", out.stderr.trim()),
            Err(err) => warn!("helm unavailable during teardown: {err}"),
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

macro_rules! managed_variant {
    ($name:ident, $platform:expr, $doc:literal) => {
        #[doc = $doc]
        pub struct $name(KubernetesDriver);

        impl $name {
            pub fn new(config: &TestConfig) -> Self {
                Self(KubernetesDriver::new($platform, config))
            }

            pub fn with_runner(config: &TestConfig, commands: Arc<dyn CommandRunner>) -> Self {
                Self(KubernetesDriver::with_runner($platform, config, commands))
            }
        }

        #[async_trait]
        impl PlatformDeployer for $name {
            fn platform(&self) -> Platform {
                self.0.platform()
            }

            fn deployment_mode(&self) -> DeploymentMode {
                self.0.deployment_mode()
            }

            fn endpoint_url(&self) -> String {
                self.0.endpoint_url()
            }

            async fn deploy(&self) -> Result<(), DeployError> {
                self.0.deploy().await
            }

            async fn teardown(&self) -> Result<(), DeployError> {
                self.0.teardown().await
            }

            async fn is_healthy(&self) -> Result<bool, DeployError> {
                self.0.is_healthy().await
            }

            async fn is_ready(&self) -> Result<bool, DeployError> {
                self.0.is_ready().await
            }
        }
    };
}

managed_variant!(EksDeployer, Platform::Eks, "Amazon EKS deployer.");
managed_variant!(GkeDeployer, Platform::Gke, "Google GKE deployer.");
managed_variant!(AksDeployer, Platform::Aks, "Azure AKS deployer.");
managed_variant!(
    OpenShiftDeployer,
    Platform::OpenShift,
    "Red Hat OpenShift deployer."
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use std::path::Path;
    use std::sync::Mutex as StdMutex;

    struct ScriptedRunner {
        outputs: StdMutex<Vec<CommandOutput>>,
        calls: StdMutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn new(outputs: Vec<CommandOutput>) -> Self {
            Self {
                outputs: StdMutex::new(outputs),
                calls: StdMutex::new(Vec::new()),
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

    fn config(mode: DeploymentMode) -> TestConfig {
        let mut config = TestConfig::default();
        config.platform = Platform::Eks;
        config.deployment_mode = mode;
        config
    }

    #[test]
    fn test_replica_count_follows_mode() {
        let runner = Arc::new(ScriptedRunner::new(vec![]));
        let single = KubernetesDriver::with_runner(
            Platform::Eks,
            &config(DeploymentMode::SingleInstance),
            runner.clone(),
        );
        assert_eq!(single.replicas(), 1);

        let multi = KubernetesDriver::with_runner(
            Platform::Gke,
            &config(DeploymentMode::MultiReplica),
            runner,
        );
        assert_eq!(multi.replicas(), MULTI_REPLICAS);
    }

    #[test]
    fn test_kube_context_from_credentials() {
        let runner = Arc::new(ScriptedRunner::new(vec![]));
        let mut cfg = config(DeploymentMode::SingleInstance);
        cfg.credentials
            .insert("kube_context".to_string(), "prod-cluster-1".to_string());

        let driver = KubernetesDriver::with_runner(Platform::Aks, &cfg, runner);
        assert_eq!(driver.context, "prod-cluster-1");
    }

    #[test]
    fn test_kube_context_defaults_to_platform_name() {
        let runner = Arc::new(ScriptedRunner::new(vec![]));
        let driver =
            KubernetesDriver::with_runner(Platform::Gke, &config(DeploymentMode::SingleInstance), runner);
        assert_eq!(driver.context, "gke");
    }

    #[tokio::test]
    async fn test_helm_install_failure_is_provisioning_error() {
        let runner = Arc::new(ScriptedRunner::new(vec![
            CommandOutput::failed(1, "release: not found"), // helm status
            CommandOutput::ok(""),                          // create namespace
            CommandOutput::failed(1, "chart not found"),    // helm upgrade
        ]));
        let driver = KubernetesDriver::with_runner(
            Platform::Eks,
            &config(DeploymentMode::SingleInstance),
            runner.clone(),
        );

        let err = driver.deploy().await.unwrap_err();
        match err {
            DeployError::Provisioning { platform, cause } => {
                assert_eq!(platform, Platform::Eks);
                assert!(cause.contains("chart not found"));
            }
            other => panic!("expected Provisioning, got {other}"),
        }

        let calls = runner.calls();
        assert!(calls[2].contains("upgrade --install promprobe"));
        assert!(calls[2].contains("server.replicaCount=1"));
    }

    #[tokio::test]
    async fn test_multi_replica_sets_replica_count() {
        let runner = Arc::new(ScriptedRunner::new(vec![
            CommandOutput::failed(1, "release: not found"),
            CommandOutput::ok(""),
            CommandOutput::failed(1, "stop before port-forward"),
        ]));
        let driver = KubernetesDriver::with_runner(
            Platform::Gke,
            &config(DeploymentMode::MultiReplica),
            runner.clone(),
        );

        let _ = driver.deploy().await;

        let helm_call = runner
            .calls()
            .into_iter()
            .find(|c| c.contains("upgrade --install"))
            .unwrap();
        assert!(helm_call.contains("server.replicaCount=3"));
    }

    #[tokio::test]
    async fn test_teardown_tolerates_missing_release() {
        let runner = Arc::new(ScriptedRunner::new(vec![CommandOutput::failed(
            1,
            "Error: uninstall: Release not loaded: promprobe: release: not found",
        )]));
        let driver = KubernetesDriver::with_runner(
            Platform::OpenShift,
            &config(DeploymentMode::SingleInstance),
            runner,
        );

        driver.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_namespace_already_exists_is_fine() {
        let runner = Arc::new(ScriptedRunner::new(vec![CommandOutput::failed(
            1,
            "Error from server (AlreadyExists): namespaces \"promprobe\" already exists",
        )]));
        let driver = KubernetesDriver::with_runner(
            Platform::Eks,
            &config(DeploymentMode::SingleInstance),
            runner,
        );

        driver.ensure_namespace().await.unwrap();
    }
}
