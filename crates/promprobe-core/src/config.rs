//! Configuration loading and validation.
//!
//! The loader parses a YAML document against a fixed schema, expands
//! `${VAR}` references from the process environment, applies CLI overrides,
//! and validates the result. The returned [`TestConfig`] is immutable for
//! the rest of the invocation and is passed by reference everywhere.
//!
//! Unknown top-level keys are a hard error (fail closed, to catch typos).
//! A missing or empty config file yields all defaults.

use crate::duration::parse_duration;
use crate::threshold::{ThresholdTable, default_table};
use crate::types::{DeploymentMode, Platform, TestType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// Errors produced while loading or validating configuration.
///
/// Always fatal to the run; surfaced before any deployment or network
/// activity.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A single field failed validation. The loader reports the worst
    /// offending field per error rather than silently coercing.
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },

    #[error("deployment mode '{mode}' is not supported on platform '{platform}'")]
    UnsupportedMode {
        platform: Platform,
        mode: DeploymentMode,
    },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Connection descriptor for the system under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TargetConfig {
    /// When set, the runner attaches to this URL and skips deploy/teardown.
    pub url: Option<String>,
    pub namespace: String,
    /// Expected target version, semantic-version shaped.
    pub version: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: None,
            namespace: "promprobe".to_string(),
            version: "v2.53.0".to_string(),
        }
    }
}

/// Paths to the external tools the harness drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ToolPaths {
    pub k6: PathBuf,
    pub kubectl: PathBuf,
    pub helm: PathBuf,
    pub docker: PathBuf,
    pub prometheus: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            k6: PathBuf::from("k6"),
            kubectl: PathBuf::from("kubectl"),
            helm: PathBuf::from("helm"),
            docker: PathBuf::from("docker"),
            prometheus: PathBuf::from("prometheus"),
        }
    }
}

/// One ramp stage of a stress scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    pub virtual_users: u32,
    pub duration: String,
}

macro_rules! default_fn {
    ($name:ident, $ty:ty, $value:expr) => {
        fn $name() -> $ty {
            $value
        }
    };
}

default_fn!(default_true, bool, true);
default_fn!(sanity_timeout, String, "60s".to_string());
default_fn!(integration_timeout, String, "120s".to_string());
default_fn!(load_timeout, String, "10m".to_string());
default_fn!(stress_timeout, String, "20m".to_string());
default_fn!(performance_timeout, String, "10m".to_string());
default_fn!(scalability_timeout, String, "30m".to_string());
default_fn!(endurance_timeout, String, "2h".to_string());
default_fn!(reliability_timeout, String, "15m".to_string());
default_fn!(chaos_timeout, String, "20m".to_string());
default_fn!(regression_timeout, String, "10m".to_string());
default_fn!(security_timeout, String, "5m".to_string());

fn sanity_endpoints() -> Vec<String> {
    vec![
        "/-/healthy".to_string(),
        "/-/ready".to_string(),
        "/api/v1/status/buildinfo".to_string(),
    ]
}

fn integration_queries() -> Vec<String> {
    vec![
        "up".to_string(),
        "prometheus_build_info".to_string(),
        "rate(prometheus_http_requests_total[1m])".to_string(),
    ]
}

fn performance_queries() -> Vec<String> {
    vec![
        "up".to_string(),
        "sum(rate(prometheus_http_requests_total[5m])) by (handler)".to_string(),
        "histogram_quantile(0.99, rate(prometheus_http_request_duration_seconds_bucket[5m]))"
            .to_string(),
    ]
}

fn security_endpoints() -> Vec<String> {
    vec![
        "/api/v1/admin/tsdb/snapshot".to_string(),
        "/api/v1/admin/tsdb/delete_series".to_string(),
        "/-/quit".to_string(),
        "/-/reload".to_string(),
    ]
}

fn scalability_series_counts() -> Vec<u64> {
    vec![1_000, 10_000, 100_000]
}

fn default_stages() -> Vec<StageConfig> {
    vec![
        StageConfig {
            virtual_users: 10,
            duration: "60s".to_string(),
        },
        StageConfig {
            virtual_users: 50,
            duration: "120s".to_string(),
        },
        StageConfig {
            virtual_users: 200,
            duration: "120s".to_string(),
        },
        StageConfig {
            virtual_users: 0,
            duration: "60s".to_string(),
        },
    ]
}

fn chaos_scenarios() -> Vec<String> {
    vec!["restart-target".to_string()]
}

/// Sanity: quick post-deployment reachability probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SanityTests {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "sanity_timeout")]
    pub timeout: String,
    #[serde(default = "sanity_endpoints")]
    pub endpoints: Vec<String>,
}

impl Default for SanityTests {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: sanity_timeout(),
            endpoints: sanity_endpoints(),
        }
    }
}

/// Integration: PromQL query round trips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct IntegrationTests {
    pub enabled: bool,
    #[serde(default = "integration_timeout")]
    pub timeout: String,
    #[serde(default = "integration_queries")]
    pub queries: Vec<String>,
}

impl Default for IntegrationTests {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: integration_timeout(),
            queries: integration_queries(),
        }
    }
}

/// Load: steady k6 traffic at a fixed virtual-user count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoadTests {
    pub enabled: bool,
    #[serde(default = "load_timeout")]
    pub timeout: String,
    pub virtual_users: u32,
    pub duration: String,
    pub rps: Option<u32>,
}

impl Default for LoadTests {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: load_timeout(),
            virtual_users: 50,
            duration: "5m".to_string(),
            rps: None,
        }
    }
}

/// Stress: ramped k6 traffic through configured stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StressTests {
    pub enabled: bool,
    #[serde(default = "stress_timeout")]
    pub timeout: String,
    #[serde(default = "default_stages")]
    pub stages: Vec<StageConfig>,
}

impl Default for StressTests {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: stress_timeout(),
            stages: default_stages(),
        }
    }
}

/// Performance: repeated query sampling with latency percentiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PerformanceTests {
    pub enabled: bool,
    #[serde(default = "performance_timeout")]
    pub timeout: String,
    #[serde(default = "performance_queries")]
    pub queries: Vec<String>,
    pub samples: u32,
}

impl Default for PerformanceTests {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: performance_timeout(),
            queries: performance_queries(),
            samples: 20,
        }
    }
}

/// Scalability: stepwise series-count growth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScalabilityTests {
    pub enabled: bool,
    #[serde(default = "scalability_timeout")]
    pub timeout: String,
    #[serde(default = "scalability_series_counts")]
    pub series_counts: Vec<u64>,
    pub step_duration: String,
}

impl Default for ScalabilityTests {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: scalability_timeout(),
            series_counts: scalability_series_counts(),
            step_duration: "2m".to_string(),
        }
    }
}

/// Endurance: low-intensity load over a long horizon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EnduranceTests {
    pub enabled: bool,
    #[serde(default = "endurance_timeout")]
    pub timeout: String,
    pub virtual_users: u32,
    pub duration: String,
}

impl Default for EnduranceTests {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: endurance_timeout(),
            virtual_users: 10,
            duration: "1h".to_string(),
        }
    }
}

/// Reliability: periodic probes with a failure budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ReliabilityTests {
    pub enabled: bool,
    #[serde(default = "reliability_timeout")]
    pub timeout: String,
    pub probe_interval: String,
    pub duration: String,
    /// Allowed failed probes before the test fails.
    pub failure_budget: u32,
}

impl Default for ReliabilityTests {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: reliability_timeout(),
            probe_interval: "5s".to_string(),
            duration: "10m".to_string(),
            failure_budget: 2,
        }
    }
}

/// Chaos: named disruption scenarios with recovery measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ChaosTests {
    pub enabled: bool,
    #[serde(default = "chaos_timeout")]
    pub timeout: String,
    #[serde(default = "chaos_scenarios")]
    pub scenarios: Vec<String>,
}

impl Default for ChaosTests {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: chaos_timeout(),
            scenarios: chaos_scenarios(),
        }
    }
}

/// Regression: query latencies compared against a saved baseline report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RegressionTests {
    pub enabled: bool,
    #[serde(default = "regression_timeout")]
    pub timeout: String,
    pub baseline_file: Option<PathBuf>,
    #[serde(default = "performance_queries")]
    pub queries: Vec<String>,
}

impl Default for RegressionTests {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: regression_timeout(),
            baseline_file: None,
            queries: performance_queries(),
        }
    }
}

/// Security: admin-surface probes that must be locked down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SecurityTests {
    pub enabled: bool,
    #[serde(default = "security_timeout")]
    pub timeout: String,
    #[serde(default = "security_endpoints")]
    pub endpoints: Vec<String>,
    /// When true, unauthenticated 2xx on an admin endpoint is a failure.
    pub expect_auth: bool,
}

impl Default for SecurityTests {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: security_timeout(),
            endpoints: security_endpoints(),
            expect_auth: true,
        }
    }
}

/// Per-type test configuration, one fixed shape per test type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TestsConfig {
    pub sanity: SanityTests,
    pub integration: IntegrationTests,
    pub load: LoadTests,
    pub stress: StressTests,
    pub performance: PerformanceTests,
    pub scalability: ScalabilityTests,
    pub endurance: EnduranceTests,
    pub reliability: ReliabilityTests,
    pub chaos: ChaosTests,
    pub regression: RegressionTests,
    pub security: SecurityTests,
}

impl TestsConfig {
    /// Whether the given type is enabled in this config.
    pub fn enabled(&self, test_type: TestType) -> bool {
        match test_type {
            TestType::Sanity => self.sanity.enabled,
            TestType::Integration => self.integration.enabled,
            TestType::Load => self.load.enabled,
            TestType::Stress => self.stress.enabled,
            TestType::Performance => self.performance.enabled,
            TestType::Scalability => self.scalability.enabled,
            TestType::Endurance => self.endurance.enabled,
            TestType::Reliability => self.reliability.enabled,
            TestType::Chaos => self.chaos.enabled,
            TestType::Regression => self.regression.enabled,
            TestType::Security => self.security.enabled,
        }
    }

    /// The configured timeout string for the given type.
    pub fn timeout_str(&self, test_type: TestType) -> &str {
        match test_type {
            TestType::Sanity => &self.sanity.timeout,
            TestType::Integration => &self.integration.timeout,
            TestType::Load => &self.load.timeout,
            TestType::Stress => &self.stress.timeout,
            TestType::Performance => &self.performance.timeout,
            TestType::Scalability => &self.scalability.timeout,
            TestType::Endurance => &self.endurance.timeout,
            TestType::Reliability => &self.reliability.timeout,
            TestType::Chaos => &self.chaos.timeout,
            TestType::Regression => &self.regression.timeout,
            TestType::Security => &self.security.timeout,
        }
    }

    /// Every enabled type in canonical order.
    pub fn enabled_types(&self) -> Vec<TestType> {
        TestType::all()
            .iter()
            .filter(|t| self.enabled(**t))
            .copied()
            .collect()
    }
}

/// CLI-supplied overrides, applied after file parsing and env expansion
/// with strictly higher precedence than file values.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub suite: Option<String>,
    pub platform: Option<Platform>,
    pub deployment_mode: Option<DeploymentMode>,
    pub prometheus_url: Option<String>,
    pub k6_vus: Option<u32>,
    pub k6_duration: Option<String>,
    pub global_timeout: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub thresholds_file: Option<PathBuf>,
}

/// Root configuration object.
///
/// Constructed once per invocation by [`TestConfig::load`]; immutable
/// thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TestConfig {
    pub suite: String,
    pub platform: Platform,
    pub deployment_mode: DeploymentMode,
    pub target: TargetConfig,
    pub tools: ToolPaths,
    /// Credential references; values may be `${VAR}` placeholders expanded
    /// at load time. Unresolved placeholders stay verbatim so optional
    /// credentials do not fail the load.
    pub credentials: BTreeMap<String, String>,
    pub request_timeout: String,
    pub deploy_timeout: String,
    pub global_timeout: String,
    /// Cap on the parallel worker pool.
    pub max_parallel: usize,
    pub output_dir: PathBuf,
    pub tests: TestsConfig,
    /// Inline threshold entries; merged over the built-in defaults, and
    /// overridden in turn by `thresholds_file`.
    pub thresholds: ThresholdTable,
    pub thresholds_file: Option<PathBuf>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            suite: "default".to_string(),
            platform: Platform::LocalBinary,
            deployment_mode: DeploymentMode::SingleInstance,
            target: TargetConfig::default(),
            tools: ToolPaths::default(),
            credentials: BTreeMap::new(),
            request_timeout: "10s".to_string(),
            deploy_timeout: "120s".to_string(),
            global_timeout: "30m".to_string(),
            max_parallel: 4,
            output_dir: PathBuf::from("reports"),
            tests: TestsConfig::default(),
            thresholds: ThresholdTable::new(),
            thresholds_file: None,
        }
    }
}

impl TestConfig {
    /// Loads configuration from an optional file path plus CLI overrides.
    ///
    /// A missing or empty file yields all defaults. The result is validated;
    /// any violation fails with the worst offending field.
    pub fn load(path: Option<&Path>, overrides: &CliOverrides) -> Result<TestConfig, ConfigError> {
        let text = match path {
            Some(path) if path.exists() => {
                std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            Some(path) => {
                debug!("config file {} not found, using defaults", path.display());
                String::new()
            }
            None => String::new(),
        };

        let mut config = Self::parse_yaml(&text)?;
        config.apply_overrides(overrides);
        config.validate()?;
        config.resolve_thresholds()?;
        Ok(config)
    }

    /// Parses a YAML document, expanding `${VAR}` placeholders from the
    /// process environment in every string value.
    pub fn parse_yaml(text: &str) -> Result<TestConfig, ConfigError> {
        Self::parse_yaml_with_env(text, &|name| std::env::var(name).ok())
    }

    /// Like [`Self::parse_yaml`] but with an injectable environment, so the
    /// expansion is testable without mutating process state.
    pub fn parse_yaml_with_env(
        text: &str,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<TestConfig, ConfigError> {
        if text.trim().is_empty() {
            return Ok(TestConfig::default());
        }

        let mut value: serde_yaml::Value = serde_yaml::from_str(text)?;
        expand_env(&mut value, env);
        Ok(serde_yaml::from_value(value)?)
    }

    /// Applies CLI overrides over the parsed file values.
    fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(suite) = &overrides.suite {
            self.suite = suite.clone();
        }
        if let Some(platform) = overrides.platform {
            self.platform = platform;
        }
        if let Some(mode) = overrides.deployment_mode {
            self.deployment_mode = mode;
        }
        if let Some(url) = &overrides.prometheus_url {
            self.target.url = Some(url.clone());
        }
        if let Some(vus) = overrides.k6_vus {
            self.tests.load.virtual_users = vus;
            self.tests.endurance.virtual_users = vus;
        }
        if let Some(duration) = &overrides.k6_duration {
            self.tests.load.duration = duration.clone();
        }
        if let Some(timeout) = &overrides.global_timeout {
            self.global_timeout = timeout.clone();
        }
        if let Some(dir) = &overrides.output_dir {
            self.output_dir = dir.clone();
        }
        if let Some(file) = &overrides.thresholds_file {
            self.thresholds_file = Some(file.clone());
        }
    }

    /// Validates the configuration, reporting the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.platform.supports(self.deployment_mode) {
            return Err(ConfigError::UnsupportedMode {
                platform: self.platform,
                mode: self.deployment_mode,
            });
        }

        if self.suite.trim().is_empty() {
            return Err(ConfigError::invalid("suite", "required"));
        }

        if self.max_parallel == 0 {
            return Err(ConfigError::invalid("max_parallel", "must be at least 1"));
        }

        if !version_pattern().is_match(&self.target.version) {
            return Err(ConfigError::invalid(
                "target.version",
                format!(
                    "'{}' does not match the semantic-version pattern",
                    self.target.version
                ),
            ));
        }

        if let Some(url) = &self.target.url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(ConfigError::invalid(
                "target.url",
                format!("'{url}' must be an http(s) URL"),
            ));
        }

        check_duration("request_timeout", &self.request_timeout)?;
        check_duration("deploy_timeout", &self.deploy_timeout)?;
        check_duration("global_timeout", &self.global_timeout)?;

        for test_type in TestType::all() {
            let field = format!("tests.{test_type}.timeout");
            check_duration(&field, self.tests.timeout_str(*test_type))?;
        }

        check_duration("tests.load.duration", &self.tests.load.duration)?;
        check_duration("tests.endurance.duration", &self.tests.endurance.duration)?;
        check_duration("tests.scalability.step_duration", &self.tests.scalability.step_duration)?;
        check_duration("tests.reliability.probe_interval", &self.tests.reliability.probe_interval)?;
        check_duration("tests.reliability.duration", &self.tests.reliability.duration)?;
        for (index, stage) in self.tests.stress.stages.iter().enumerate() {
            let field = format!("tests.stress.stages[{index}].duration");
            check_duration(&field, &stage.duration)?;
        }

        // Lists that gate an enabled feature must be non-empty.
        check_gated_list(
            "tests.sanity.endpoints",
            self.tests.sanity.enabled,
            self.tests.sanity.endpoints.len(),
        )?;
        check_gated_list(
            "tests.integration.queries",
            self.tests.integration.enabled,
            self.tests.integration.queries.len(),
        )?;
        check_gated_list(
            "tests.stress.stages",
            self.tests.stress.enabled,
            self.tests.stress.stages.len(),
        )?;
        check_gated_list(
            "tests.performance.queries",
            self.tests.performance.enabled,
            self.tests.performance.queries.len(),
        )?;
        check_gated_list(
            "tests.scalability.series_counts",
            self.tests.scalability.enabled,
            self.tests.scalability.series_counts.len(),
        )?;
        check_gated_list(
            "tests.chaos.scenarios",
            self.tests.chaos.enabled,
            self.tests.chaos.scenarios.len(),
        )?;
        check_gated_list(
            "tests.regression.queries",
            self.tests.regression.enabled,
            self.tests.regression.queries.len(),
        )?;
        check_gated_list(
            "tests.security.endpoints",
            self.tests.security.enabled,
            self.tests.security.endpoints.len(),
        )?;

        if self.tests.load.enabled && self.tests.load.virtual_users == 0 {
            return Err(ConfigError::invalid(
                "tests.load.virtual_users",
                "must be at least 1 when load tests are enabled",
            ));
        }

        if self.tests.scalability.enabled
            && !self.tests.scalability.series_counts.is_sorted()
        {
            return Err(ConfigError::invalid(
                "tests.scalability.series_counts",
                "must be ascending",
            ));
        }

        Ok(())
    }

    /// Merges built-in defaults, inline entries, and the thresholds file
    /// into the final table.
    fn resolve_thresholds(&mut self) -> Result<(), ConfigError> {
        let mut table = default_table();
        table.merge(std::mem::take(&mut self.thresholds));

        if let Some(path) = &self.thresholds_file {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let overlay: ThresholdTable = serde_yaml::from_str(&text)?;
            table.merge(overlay);
        }

        self.thresholds = table;
        Ok(())
    }

    /// True when a target URL was supplied and no provisioning happens.
    pub fn connect_only(&self) -> bool {
        self.target.url.is_some()
    }

    pub fn request_timeout(&self) -> Duration {
        parse_duration(&self.request_timeout).unwrap_or(Duration::from_secs(10))
    }

    pub fn deploy_timeout(&self) -> Duration {
        parse_duration(&self.deploy_timeout).unwrap_or(Duration::from_secs(120))
    }

    pub fn global_timeout(&self) -> Duration {
        parse_duration(&self.global_timeout).unwrap_or(Duration::from_secs(1800))
    }

    /// Timeout for one test type's execution.
    pub fn test_timeout(&self, test_type: TestType) -> Duration {
        parse_duration(self.tests.timeout_str(test_type)).unwrap_or(Duration::from_secs(600))
    }
}

fn check_duration(field: &str, value: &str) -> Result<(), ConfigError> {
    if parse_duration(value).is_none() {
        return Err(ConfigError::invalid(
            field,
            format!("'{value}' does not match the N[smhd] duration pattern"),
        ));
    }
    Ok(())
}

fn check_gated_list(field: &str, enabled: bool, len: usize) -> Result<(), ConfigError> {
    if enabled && len == 0 {
        return Err(ConfigError::invalid(
            field,
            "must be non-empty when the test type is enabled",
        ));
    }
    Ok(())
}

fn version_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex::Regex::new(r"^v?\d+\.\d+\.\d+(-[0-9A-Za-z.\-]+)?$").unwrap()
    })
}

fn placeholder_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap())
}

/// Expands `${VAR}` placeholders in every string value of the tree.
///
/// Unresolved placeholders are left verbatim.
fn expand_env(value: &mut serde_yaml::Value, env: &dyn Fn(&str) -> Option<String>) {
    match value {
        serde_yaml::Value::String(s) => {
            let expanded = placeholder_pattern().replace_all(s, |caps: &regex::Captures<'_>| {
                env(&caps[1]).unwrap_or_else(|| caps[0].to_string())
            });
            if let std::borrow::Cow::Owned(new) = expanded {
                *s = new;
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for item in seq {
                expand_env(item, env);
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                expand_env(item, env);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = TestConfig::parse_yaml_with_env("", &no_env).unwrap();
        assert_eq!(config, TestConfig::default());

        let config = TestConfig::parse_yaml_with_env("   \n", &no_env).unwrap();
        assert_eq!(config, TestConfig::default());
    }

    #[test]
    fn test_defaults_enable_only_sanity() {
        let config = TestConfig::default();
        assert_eq!(config.tests.enabled_types(), vec![TestType::Sanity]);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let yaml = r#"
suite: nightly
platform: eks
deployment_mode: multi-replica
tests:
  load:
    enabled: true
    virtual_users: 100
"#;
        let first = TestConfig::parse_yaml_with_env(yaml, &no_env).unwrap();
        let second = TestConfig::parse_yaml_with_env(yaml, &no_env).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_top_level_key_is_rejected() {
        let yaml = "suit: typo\n";
        let err = TestConfig::parse_yaml_with_env(yaml, &no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "got: {err}");
    }

    #[test]
    fn test_unknown_nested_key_is_rejected() {
        let yaml = "tests:\n  load:\n    virtual_user: 5\n";
        let err = TestConfig::parse_yaml_with_env(yaml, &no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_env_expansion_resolves_known_vars() {
        let yaml = "credentials:\n  api_token: ${PROBE_TOKEN}\n  org: acme-${PROBE_ORG}\n";
        let env = |name: &str| match name {
            "PROBE_TOKEN" => Some("s3cret".to_string()),
            _ => None,
        };

        let config = TestConfig::parse_yaml_with_env(yaml, &env).unwrap();

        assert_eq!(config.credentials["api_token"], "s3cret");
        // Unresolved placeholders stay verbatim to support optional credentials.
        assert_eq!(config.credentials["org"], "acme-${PROBE_ORG}");
    }

    #[test]
    fn test_multi_replica_requires_kubernetes() {
        let yaml = "platform: container\ndeployment_mode: multi-replica\n";
        let config = TestConfig::parse_yaml_with_env(yaml, &no_env).unwrap();
        let err = config.validate().unwrap_err();

        assert!(matches!(
            err,
            ConfigError::UnsupportedMode {
                platform: Platform::Container,
                mode: DeploymentMode::MultiReplica,
            }
        ));
    }

    #[test]
    fn test_multi_replica_allowed_on_kubernetes() {
        let yaml = "platform: gke\ndeployment_mode: multi-replica\n";
        let config = TestConfig::parse_yaml_with_env(yaml, &no_env).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_bad_duration_names_the_field() {
        let yaml = "tests:\n  load:\n    duration: fast\n";
        let config = TestConfig::parse_yaml_with_env(yaml, &no_env).unwrap();
        let err = config.validate().unwrap_err();

        match err {
            ConfigError::Invalid { field, .. } => assert_eq!(field, "tests.load.duration"),
            other => panic!("expected Invalid, got {other}"),
        }
    }

    #[test]
    fn test_bad_version_is_rejected() {
        let yaml = "target:\n  version: latest\n";
        let config = TestConfig::parse_yaml_with_env(yaml, &no_env).unwrap();
        let err = config.validate().unwrap_err();

        match err {
            ConfigError::Invalid { field, .. } => assert_eq!(field, "target.version"),
            other => panic!("expected Invalid, got {other}"),
        }
    }

    #[test]
    fn test_version_pattern_accepts_common_shapes() {
        for version in ["2.53.0", "v2.53.0", "v3.0.0-rc.1"] {
            let mut config = TestConfig::default();
            config.target.version = version.to_string();
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_enabled_empty_list_is_rejected() {
        let yaml = "tests:\n  integration:\n    enabled: true\n    queries: []\n";
        let config = TestConfig::parse_yaml_with_env(yaml, &no_env).unwrap();
        let err = config.validate().unwrap_err();

        match err {
            ConfigError::Invalid { field, reason } => {
                assert_eq!(field, "tests.integration.queries");
                assert!(reason.contains("non-empty"));
            }
            other => panic!("expected Invalid, got {other}"),
        }
    }

    #[test]
    fn test_disabled_empty_list_is_fine() {
        let yaml = "tests:\n  integration:\n    queries: []\n";
        let config = TestConfig::parse_yaml_with_env(yaml, &no_env).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_cli_overrides_win_over_file_values() {
        let yaml = "suite: from-file\nplatform: container\ntests:\n  load:\n    virtual_users: 5\n";
        let mut config = TestConfig::parse_yaml_with_env(yaml, &no_env).unwrap();

        let overrides = CliOverrides {
            suite: Some("from-cli".to_string()),
            platform: Some(Platform::Eks),
            deployment_mode: Some(DeploymentMode::MultiReplica),
            prometheus_url: Some("http://prom.example:9090".to_string()),
            k6_vus: Some(80),
            ..CliOverrides::default()
        };
        config.apply_overrides(&overrides);

        assert_eq!(config.suite, "from-cli");
        assert_eq!(config.platform, Platform::Eks);
        assert_eq!(config.deployment_mode, DeploymentMode::MultiReplica);
        assert_eq!(config.target.url.as_deref(), Some("http://prom.example:9090"));
        assert_eq!(config.tests.load.virtual_users, 80);
        assert!(config.connect_only());
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.yml");

        let config = TestConfig::load(Some(&path), &CliOverrides::default()).unwrap();

        assert_eq!(config.suite, "default");
        // Threshold defaults are resolved even without a file.
        assert!(!config.thresholds.is_empty());
    }

    #[test]
    fn test_load_reads_file_and_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("promprobe.yml");
        std::fs::write(&path, "suite: ci\ntests:\n  load:\n    enabled: true\n").unwrap();

        let first = TestConfig::load(Some(&path), &CliOverrides::default()).unwrap();
        let second = TestConfig::load(Some(&path), &CliOverrides::default()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.suite, "ci");
        assert!(first.tests.load.enabled);
    }

    #[test]
    fn test_load_rejects_unsupported_mode_before_anything_else() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("promprobe.yml");
        std::fs::write(&path, "platform: local-binary\ndeployment_mode: multi-replica\n")
            .unwrap();

        let err = TestConfig::load(Some(&path), &CliOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedMode { .. }));
    }

    #[test]
    fn test_thresholds_file_merges_over_inline_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let thresholds_path = dir.path().join("thresholds.yml");
        std::fs::write(
            &thresholds_path,
            "load:\n  http_req_duration_p95_ms:\n    value: 123\n    direction: upper-bound\n",
        )
        .unwrap();

        let config_path = dir.path().join("promprobe.yml");
        std::fs::write(
            &config_path,
            format!(
                "thresholds_file: {}\nthresholds:\n  load:\n    http_req_failed_rate:\n      value: 0.5\n      direction: upper-bound\n",
                thresholds_path.display()
            ),
        )
        .unwrap();

        let config = TestConfig::load(Some(&config_path), &CliOverrides::default()).unwrap();

        // File wins over defaults.
        assert_eq!(
            config
                .thresholds
                .get(TestType::Load, "http_req_duration_p95_ms")
                .unwrap()
                .value,
            123.0
        );
        // Inline wins over defaults too.
        assert_eq!(
            config
                .thresholds
                .get(TestType::Load, "http_req_failed_rate")
                .unwrap()
                .value,
            0.5
        );
        // Untouched defaults survive.
        assert!(config.thresholds.get(TestType::Sanity, "probe_latency_ms").is_some());
    }

    #[test]
    fn test_scalability_series_counts_must_ascend() {
        let yaml = "tests:\n  scalability:\n    enabled: true\n    series_counts: [1000, 100]\n";
        let config = TestConfig::parse_yaml_with_env(yaml, &no_env).unwrap();
        let err = config.validate().unwrap_err();

        match err {
            ConfigError::Invalid { field, .. } => {
                assert_eq!(field, "tests.scalability.series_counts");
            }
            other => panic!("expected Invalid, got {other}"),
        }
    }
}
