//! k6 load-generation driver.
//!
//! Generates a k6 scenario script, runs the external `k6` binary against the
//! target, and parses the exported summary into metric observations. The
//! script and summary live in scratch files that are cleaned up on drop.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Errors from driving the k6 subprocess.
#[derive(Debug, thiserror::Error)]
pub enum LoadgenError {
    /// The k6 binary could not be started.
    #[error("failed to spawn '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// k6 ran but exited nonzero.
    #[error("k6 exited with {code}: {stderr_tail}")]
    NonZeroExit { code: i32, stderr_tail: String },

    /// The exported summary was missing or unparsable.
    #[error("failed to read k6 summary: {0}")]
    Summary(String),

    /// IO error writing the scenario script.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One ramp stage for stress-style scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct K6Stage {
    pub virtual_users: u32,
    pub duration: Duration,
}

/// Options for one k6 invocation.
#[derive(Debug, Clone)]
pub struct K6Options {
    /// Path to the k6 binary.
    pub binary: PathBuf,
    /// Base URL of the target service.
    pub target_url: String,
    /// Steady virtual-user count. Ignored when `stages` is non-empty.
    pub virtual_users: u32,
    /// Steady duration. Ignored when `stages` is non-empty.
    pub duration: Duration,
    /// Ramp stages; when non-empty these replace vus/duration.
    pub stages: Vec<K6Stage>,
    /// Optional constant request-rate target (requests per second).
    pub rps: Option<u32>,
}

impl K6Options {
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            binary: PathBuf::from("k6"),
            target_url: target_url.into(),
            virtual_users: 10,
            duration: Duration::from_secs(30),
            stages: Vec::new(),
            rps: None,
        }
    }
}

/// A metric observation extracted from the k6 summary.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub name: String,
    pub value: f64,
    pub unit: String,
}

/// Parsed `--summary-export` document.
///
/// k6 writes each metric as a map of statistic name to value; trend metrics
/// carry `avg`/`p(95)`/..., rates carry `value`, counters carry `count`.
#[derive(Debug, Clone, Deserialize)]
pub struct K6Summary {
    #[serde(default)]
    pub metrics: BTreeMap<String, BTreeMap<String, f64>>,
}

impl K6Summary {
    /// Looks up a single statistic of a named metric.
    pub fn stat(&self, metric: &str, stat: &str) -> Option<f64> {
        self.metrics.get(metric).and_then(|stats| stats.get(stat)).copied()
    }

    /// Flattens the statistics the harness evaluates into observations.
    ///
    /// Missing statistics are simply absent from the output; the threshold
    /// evaluator reports unmatched metrics as skipped, so nothing is lost.
    pub fn observations(&self) -> Vec<Observation> {
        let mut out = Vec::new();
        let mut push = |name: &str, value: Option<f64>, unit: &str| {
            if let Some(value) = value {
                out.push(Observation {
                    name: name.to_string(),
                    value,
                    unit: unit.to_string(),
                });
            }
        };

        push(
            "http_req_duration_p95_ms",
            self.stat("http_req_duration", "p(95)"),
            "ms",
        );
        push(
            "http_req_duration_p99_ms",
            self.stat("http_req_duration", "p(99)"),
            "ms",
        );
        push(
            "http_req_duration_avg_ms",
            self.stat("http_req_duration", "avg"),
            "ms",
        );
        push(
            "http_req_failed_rate",
            self.stat("http_req_failed", "value"),
            "ratio",
        );
        push("iterations_count", self.stat("iterations", "count"), "count");
        push("vus_max", self.stat("vus_max", "value"), "count");

        out
    }
}

/// Runs k6 scenarios as subprocesses.
#[derive(Debug, Default)]
pub struct K6Runner;

impl K6Runner {
    pub fn new() -> Self {
        Self
    }

    /// Generates the scenario script for the given options.
    pub fn render_script(options: &K6Options) -> String {
        let load_shape = if options.stages.is_empty() {
            format!(
                "  vus: {},\n  duration: '{}s',",
                options.virtual_users,
                options.duration.as_secs()
            )
        } else {
            let stages = options
                .stages
                .iter()
                .map(|stage| {
                    format!(
                        "    {{ duration: '{}s', target: {} }},",
                        stage.duration.as_secs(),
                        stage.virtual_users
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            format!("  stages: [\n{stages}\n  ],")
        };

        let pacing = match options.rps {
            // k6 has first-class arrival-rate executors, but a sleep-paced
            // closed model is enough for the rates this harness drives.
            Some(rps) if rps > 0 => format!("sleep({:.3});", 1.0 / f64::from(rps)),
            _ => "sleep(0.1);".to_string(),
        };

        format!(
            r#"import http from 'k6/http';
import {{ check, sleep }} from 'k6';

export const options = {{
{load_shape}
  summaryTrendStats: ['avg', 'min', 'med', 'max', 'p(90)', 'p(95)', 'p(99)'],
}};

export default function () {{
  const res = http.get('{url}/api/v1/query?query=up');
  check(res, {{ 'status is 200': (r) => r.status === 200 }});
  {pacing}
}}
"#,
            url = options.target_url.trim_end_matches('/'),
        )
    }

    /// Runs one k6 scenario and returns the parsed summary.
    ///
    /// Stdout is streamed to debug logs line by line; stderr is captured for
    /// the error message on nonzero exit.
    pub async fn run(&self, options: &K6Options) -> Result<K6Summary, LoadgenError> {
        let workdir = tempfile::tempdir()?;
        let script_path = workdir.path().join("scenario.js");
        let summary_path = workdir.path().join("summary.json");
        std::fs::write(&script_path, Self::render_script(options))?;

        debug!(
            binary = %options.binary.display(),
            script = %script_path.display(),
            "Starting k6 scenario"
        );

        let mut command = Command::new(&options.binary);
        command
            .arg("run")
            .arg("--summary-export")
            .arg(&summary_path)
            .arg(&script_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| LoadgenError::Spawn {
            binary: options.binary.display().to_string(),
            source,
        })?;

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                debug!(target: "promprobe::k6", "{line}");
            }
        }

        let mut stderr_tail = String::new();
        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            while let Some(line) = lines.next_line().await? {
                debug!(target: "promprobe::k6", "[stderr] {line}");
                stderr_tail.push_str(&line);
                stderr_tail.push('\n');
                // Keep only the tail for error reporting.
                if stderr_tail.len() > 2048 {
                    let cut = stderr_tail.len() - 2048;
                    let mut boundary = cut;
                    while !stderr_tail.is_char_boundary(boundary) {
                        boundary += 1;
                    }
                    stderr_tail.drain(..boundary);
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            warn!(code = ?status.code(), "k6 exited nonzero");
            return Err(LoadgenError::NonZeroExit {
                code: status.code().unwrap_or(-1),
                stderr_tail: stderr_tail.trim().to_string(),
            });
        }

        let raw = std::fs::read_to_string(&summary_path)
            .map_err(|err| LoadgenError::Summary(format!("missing summary export: {err}")))?;
        serde_json::from_str(&raw).map_err(|err| LoadgenError::Summary(err.to_string()))
    }
}
