//! # promprobe-deploy
//!
//! Platform deployers for the Promprobe harness.
//!
//! This crate provides:
//! - One [`PlatformDeployer`] implementation per deployment target: local
//!   binary, container, and the four managed-Kubernetes variants
//! - A factory that selects the implementation from the validated platform
//!   field
//! - A [`CommandRunner`] indirection so every variant is unit-testable
//!   without the real tools installed

mod command;
mod container;
mod health;
mod kubernetes;
mod local;

pub use command::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use container::ContainerDeployer;
pub use kubernetes::{
    AksDeployer, EksDeployer, GkeDeployer, KubernetesDriver, OpenShiftDeployer,
};
pub use local::LocalBinaryDeployer;

use promprobe_core::{DeployError, Platform, PlatformDeployer, TestConfig};

/// Builds the deployer matching the config's platform.
///
/// Multi-replica on a non-Kubernetes platform is rejected here as the
/// deploy-time backstop behind config validation.
pub fn deployer_for(config: &TestConfig) -> Result<Box<dyn PlatformDeployer>, DeployError> {
    if !config.platform.supports(config.deployment_mode) {
        return Err(DeployError::UnsupportedMode {
            platform: config.platform,
            mode: config.deployment_mode,
        });
    }

    Ok(match config.platform {
        Platform::LocalBinary => Box::new(LocalBinaryDeployer::new(config)),
        Platform::Container => Box::new(ContainerDeployer::new(config)),
        Platform::Eks => Box::new(EksDeployer::new(config)),
        Platform::Gke => Box::new(GkeDeployer::new(config)),
        Platform::Aks => Box::new(AksDeployer::new(config)),
        Platform::OpenShift => Box::new(OpenShiftDeployer::new(config)),
    })
}
