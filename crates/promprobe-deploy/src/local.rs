//! Local-binary deployer: a Prometheus process on this host.

use crate::health::probe_to_health;
use async_trait::async_trait;
use promprobe_client::PromClient;
use promprobe_core::{DeployError, DeploymentMode, Platform, PlatformDeployer, TestConfig};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const LOCAL_PORT: u16 = 9090;

/// Runs the Prometheus binary directly, single-instance only.
pub struct LocalBinaryDeployer {
    binary: PathBuf,
    client: PromClient,
    /// Held while the child runs; killed on teardown.
    child: Mutex<Option<Child>>,
    data_dir: Mutex<Option<tempfile::TempDir>>,
}

impl LocalBinaryDeployer {
    pub fn new(config: &TestConfig) -> Self {
        Self {
            binary: config.tools.prometheus.clone(),
            client: PromClient::new(
                format!("http://127.0.0.1:{LOCAL_PORT}"),
                config.request_timeout(),
            ),
            child: Mutex::new(None),
            data_dir: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PlatformDeployer for LocalBinaryDeployer {
    fn platform(&self) -> Platform {
        Platform::LocalBinary
    }

    fn deployment_mode(&self) -> DeploymentMode {
        DeploymentMode::SingleInstance
    }

    fn endpoint_url(&self) -> String {
        self.client.base_url().to_string()
    }

    async fn deploy(&self) -> Result<(), DeployError> {
        // Idempotent: a target already answering on the port is success,
        // whether we or someone else started it.
        if self.client.health().await.unwrap_or(false) {
            info!("Prometheus already running on port {LOCAL_PORT}, reusing it");
            return Ok(());
        }

        let data_dir = tempfile::tempdir().map_err(|err| DeployError::Provisioning {
            platform: Platform::LocalBinary,
            cause: format!("failed to create data directory: {err}"),
        })?;

        let child = Command::new(&self.binary)
            .arg(format!("--storage.tsdb.path={}", data_dir.path().display()))
            .arg(format!("--web.listen-address=127.0.0.1:{LOCAL_PORT}"))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| DeployError::Provisioning {
                platform: Platform::LocalBinary,
                cause: format!("failed to spawn {}: {err}", self.binary.display()),
            })?;

        debug!(pid = ?child.id(), "Prometheus binary started");
        *self.child.lock().await = Some(child);
        *self.data_dir.lock().await = Some(data_dir);
        Ok(())
    }

    async fn teardown(&self) -> Result<(), DeployError> {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            if let Err(err) = child.kill().await {
                warn!("Failed to kill Prometheus child: {err}");
            }
            let _ = child.wait().await;
            info!("Local Prometheus stopped");
        }
        // Nothing to clean up is success.
        self.data_dir.lock().await.take();
        Ok(())
    }

    async fn is_healthy(&self) -> Result<bool, DeployError> {
        probe_to_health(self.client.health().await)
    }

    async fn is_ready(&self) -> Result<bool, DeployError> {
        probe_to_health(self.client.ready().await)
    }
}
