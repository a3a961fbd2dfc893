//! # promprobe-client
//!
//! Network-facing collaborators for the Promprobe harness.
//!
//! This crate provides:
//! - A thin HTTP client for the Prometheus API surface (health, readiness,
//!   instant and range queries, status endpoints)
//! - A k6 subprocess driver that generates load scripts, runs them, and
//!   parses the exported summary into metric observations
//!
//! Neither component retries on its own. Failures are classified precisely
//! (timeout vs. unreachable vs. error response) so the caller can decide.

mod client;
mod loadgen;

pub use client::{
    ClientError, InstantSample, PromClient, QueryResult, RangeSample, ResultKind,
};
pub use loadgen::{K6Options, K6Runner, K6Stage, K6Summary, LoadgenError, Observation};
