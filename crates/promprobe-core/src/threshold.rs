//! Threshold evaluation.
//!
//! This module is intentionally I/O-free: it compares observations against
//! a threshold table and produces verdicts. Observations without a matching
//! entry are reported as skipped, never silently dropped and never failed.

use crate::result::MetricObservation;
use crate::types::TestType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which side of the threshold passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// Observation must be `<=` the threshold (latencies, error rates).
    UpperBound,
    /// Observation must be `>=` the threshold (success rates, throughput).
    LowerBound,
}

/// One threshold: a numeric bound and its direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdEntry {
    pub value: f64,
    pub direction: Direction,
}

impl ThresholdEntry {
    pub fn upper(value: f64) -> Self {
        Self {
            value,
            direction: Direction::UpperBound,
        }
    }

    pub fn lower(value: f64) -> Self {
        Self {
            value,
            direction: Direction::LowerBound,
        }
    }

    /// True iff the observed value satisfies this bound.
    pub fn satisfied_by(&self, observed: f64) -> bool {
        match self.direction {
            Direction::UpperBound => observed <= self.value,
            Direction::LowerBound => observed >= self.value,
        }
    }
}

/// Mapping from (test type, metric name) to a threshold.
///
/// Read-only during a run; a file override merges over the built-in
/// defaults at load time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable {
    entries: BTreeMap<TestType, BTreeMap<String, ThresholdEntry>>,
}

impl ThresholdTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, test_type: TestType, metric: impl Into<String>, entry: ThresholdEntry) {
        self.entries
            .entry(test_type)
            .or_default()
            .insert(metric.into(), entry);
    }

    pub fn get(&self, test_type: TestType, metric: &str) -> Option<&ThresholdEntry> {
        self.entries.get(&test_type).and_then(|m| m.get(metric))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(BTreeMap::is_empty)
    }

    /// Number of entries across all test types.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Merges `other` over `self`; entries in `other` win.
    pub fn merge(&mut self, other: ThresholdTable) {
        for (test_type, metrics) in other.entries {
            self.entries.entry(test_type).or_default().extend(metrics);
        }
    }
}

/// Outcome of evaluating one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictOutcome {
    Passed,
    Failed,
    /// No threshold entry matched; the metric was not evaluated.
    Skipped,
}

/// Verdict for one metric observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricVerdict {
    pub metric: String,
    pub observed: f64,
    pub outcome: VerdictOutcome,
    /// Absent for skipped verdicts.
    pub threshold: Option<f64>,
    pub direction: Option<Direction>,
}

impl MetricVerdict {
    pub fn evaluated(
        metric: impl Into<String>,
        observed: f64,
        threshold: f64,
        direction: Direction,
        outcome: VerdictOutcome,
    ) -> Self {
        Self {
            metric: metric.into(),
            observed,
            outcome,
            threshold: Some(threshold),
            direction: Some(direction),
        }
    }

    pub fn skipped(metric: impl Into<String>, observed: f64) -> Self {
        Self {
            metric: metric.into(),
            observed,
            outcome: VerdictOutcome::Skipped,
            threshold: None,
            direction: None,
        }
    }

    /// One-line description, used as the error message for failed verdicts.
    pub fn describe(&self) -> String {
        match (self.outcome, self.threshold, self.direction) {
            (VerdictOutcome::Skipped, _, _) => {
                format!("{}: {} (no threshold, skipped)", self.metric, self.observed)
            }
            (outcome, Some(threshold), Some(direction)) => {
                let op = match direction {
                    Direction::UpperBound => "<=",
                    Direction::LowerBound => ">=",
                };
                format!(
                    "{}: observed {} {} expected {op} {threshold}",
                    self.metric,
                    self.observed,
                    match outcome {
                        VerdictOutcome::Passed => "satisfies",
                        _ => "violates",
                    },
                )
            }
            _ => format!("{}: {}", self.metric, self.observed),
        }
    }
}

/// Evaluates every observation against the table.
///
/// Pure and deterministic. All comparisons are attempted even after a
/// failure so the report covers every metric.
pub fn evaluate(
    test_type: TestType,
    observations: &[MetricObservation],
    table: &ThresholdTable,
) -> Vec<MetricVerdict> {
    observations
        .iter()
        .map(|obs| match table.get(test_type, &obs.name) {
            Some(entry) => {
                let outcome = if entry.satisfied_by(obs.value) {
                    VerdictOutcome::Passed
                } else {
                    VerdictOutcome::Failed
                };
                MetricVerdict::evaluated(&obs.name, obs.value, entry.value, entry.direction, outcome)
            }
            None => MetricVerdict::skipped(&obs.name, obs.value),
        })
        .collect()
}

/// Built-in threshold defaults.
///
/// Chosen from representative values in the upstream documentation; a
/// thresholds file merges over these.
pub fn default_table() -> ThresholdTable {
    let mut table = ThresholdTable::new();

    table.insert(TestType::Sanity, "probe_latency_ms", ThresholdEntry::upper(1000.0));
    table.insert(TestType::Sanity, "endpoint_failures", ThresholdEntry::upper(0.0));

    table.insert(TestType::Integration, "query_success_rate", ThresholdEntry::lower(1.0));
    table.insert(TestType::Integration, "query_latency_avg_ms", ThresholdEntry::upper(2000.0));

    table.insert(TestType::Load, "http_req_duration_p95_ms", ThresholdEntry::upper(500.0));
    table.insert(TestType::Load, "http_req_failed_rate", ThresholdEntry::upper(0.01));

    table.insert(TestType::Stress, "http_req_duration_p99_ms", ThresholdEntry::upper(2000.0));
    table.insert(TestType::Stress, "http_req_failed_rate", ThresholdEntry::upper(0.05));

    table.insert(TestType::Performance, "query_latency_p95_ms", ThresholdEntry::upper(1000.0));
    table.insert(TestType::Performance, "query_latency_p99_ms", ThresholdEntry::upper(2500.0));
    table.insert(TestType::Performance, "query_success_rate", ThresholdEntry::lower(0.99));

    table.insert(TestType::Scalability, "query_latency_p99_ms", ThresholdEntry::upper(5000.0));

    table.insert(TestType::Endurance, "http_req_duration_p95_ms", ThresholdEntry::upper(800.0));
    table.insert(TestType::Endurance, "http_req_failed_rate", ThresholdEntry::upper(0.02));

    table.insert(TestType::Reliability, "probe_success_rate", ThresholdEntry::lower(0.995));
    table.insert(TestType::Reliability, "max_outage_s", ThresholdEntry::upper(30.0));

    table.insert(TestType::Chaos, "recovery_s", ThresholdEntry::upper(120.0));

    table.insert(TestType::Regression, "latency_delta_pct", ThresholdEntry::upper(10.0));

    table.insert(TestType::Security, "unauthenticated_admin_endpoints", ThresholdEntry::upper(0.0));

    table
}
