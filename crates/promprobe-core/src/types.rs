//! Test-type taxonomy and platform model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The test types the harness knows how to run, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Sanity,
    Integration,
    Load,
    Stress,
    Performance,
    Scalability,
    Endurance,
    Reliability,
    Chaos,
    Regression,
    Security,
}

impl TestType {
    /// All test types in canonical execution order.
    pub fn all() -> &'static [TestType] {
        &[
            TestType::Sanity,
            TestType::Integration,
            TestType::Load,
            TestType::Stress,
            TestType::Performance,
            TestType::Scalability,
            TestType::Endurance,
            TestType::Reliability,
            TestType::Chaos,
            TestType::Regression,
            TestType::Security,
        ]
    }

    /// Whether this type needs exclusive access to the target.
    ///
    /// Exclusive types saturate or perturb the target and are never scheduled
    /// concurrently with any other type; the rest only read from it and may
    /// fan out under `--parallel`.
    pub fn exclusive(&self) -> bool {
        matches!(
            self,
            TestType::Load
                | TestType::Stress
                | TestType::Performance
                | TestType::Scalability
                | TestType::Endurance
                | TestType::Chaos
        )
    }

    /// The identifier used in config files and `--type` flags.
    pub fn as_config_str(&self) -> &'static str {
        match self {
            TestType::Sanity => "sanity",
            TestType::Integration => "integration",
            TestType::Load => "load",
            TestType::Stress => "stress",
            TestType::Performance => "performance",
            TestType::Scalability => "scalability",
            TestType::Endurance => "endurance",
            TestType::Reliability => "reliability",
            TestType::Chaos => "chaos",
            TestType::Regression => "regression",
            TestType::Security => "security",
        }
    }

    /// Parses a config-file identifier.
    pub fn from_config_str(s: &str) -> Option<TestType> {
        let normalized = s.trim().to_lowercase();
        TestType::all()
            .iter()
            .find(|t| t.as_config_str() == normalized)
            .copied()
    }

    /// Sorts the given selection into canonical order, dropping duplicates.
    pub fn canonical_selection(selected: &[TestType]) -> Vec<TestType> {
        TestType::all()
            .iter()
            .filter(|t| selected.contains(t))
            .copied()
            .collect()
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_config_str())
    }
}

/// Deployment target for the system under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    /// A Prometheus binary launched directly on this host.
    LocalBinary,
    /// A single container via the local container runtime.
    Container,
    /// Amazon EKS.
    Eks,
    /// Google GKE.
    Gke,
    /// Azure AKS.
    Aks,
    /// Red Hat OpenShift.
    #[serde(rename = "openshift")]
    OpenShift,
}

impl Platform {
    pub fn all() -> &'static [Platform] {
        &[
            Platform::LocalBinary,
            Platform::Container,
            Platform::Eks,
            Platform::Gke,
            Platform::Aks,
            Platform::OpenShift,
        ]
    }

    /// True for the managed-Kubernetes variants.
    pub fn is_kubernetes(&self) -> bool {
        matches!(
            self,
            Platform::Eks | Platform::Gke | Platform::Aks | Platform::OpenShift
        )
    }

    /// Whether the given deployment mode is supported on this platform.
    ///
    /// Only Kubernetes platforms can run multi-replica topologies.
    pub fn supports(&self, mode: DeploymentMode) -> bool {
        match mode {
            DeploymentMode::SingleInstance => true,
            DeploymentMode::MultiReplica => self.is_kubernetes(),
        }
    }

    pub fn as_config_str(&self) -> &'static str {
        match self {
            Platform::LocalBinary => "local-binary",
            Platform::Container => "container",
            Platform::Eks => "eks",
            Platform::Gke => "gke",
            Platform::Aks => "aks",
            Platform::OpenShift => "openshift",
        }
    }

    pub fn from_config_str(s: &str) -> Option<Platform> {
        let normalized = s.trim().to_lowercase();
        Platform::all()
            .iter()
            .find(|p| p.as_config_str() == normalized)
            .copied()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_config_str())
    }
}

/// Target topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentMode {
    #[default]
    SingleInstance,
    MultiReplica,
}

impl DeploymentMode {
    pub fn as_config_str(&self) -> &'static str {
        match self {
            DeploymentMode::SingleInstance => "single-instance",
            DeploymentMode::MultiReplica => "multi-replica",
        }
    }

    pub fn from_config_str(s: &str) -> Option<DeploymentMode> {
        match s.trim().to_lowercase().as_str() {
            "single-instance" => Some(DeploymentMode::SingleInstance),
            "multi-replica" => Some(DeploymentMode::MultiReplica),
            _ => None,
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_config_str())
    }
}
