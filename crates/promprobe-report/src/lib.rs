//! # promprobe-report
//!
//! Report rendering for the Promprobe harness.
//!
//! This crate provides:
//! - Four renderers over the same immutable suite result: structured JSON,
//!   tabular CSV, a markdown narrative, and a styled HTML document
//! - Deterministic, collision-avoiding file naming
//! - Report regeneration from a previously saved JSON report
//! - The terminal summary table printed at the end of every run

mod render;
mod terminal;

pub use terminal::{print_failures, print_summary};

use promprobe_core::SuiteResult;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// Errors from writing or loading reports.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse report {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("csv rendering failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("unknown report format '{0}'")]
    UnknownFormat(String),
}

/// Output formats, each rendered independently from the same result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportFormat {
    /// Machine-readable structured data; also the regeneration input.
    Json,
    /// Spreadsheet-friendly, one row per metric verdict.
    Csv,
    /// Human-readable narrative.
    Markdown,
    /// Styled document variant.
    Html,
}

impl ReportFormat {
    pub fn all() -> &'static [ReportFormat] {
        &[
            ReportFormat::Json,
            ReportFormat::Csv,
            ReportFormat::Markdown,
            ReportFormat::Html,
        ]
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
            ReportFormat::Markdown => "md",
            ReportFormat::Html => "html",
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "csv" => Ok(ReportFormat::Csv),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            "html" => Ok(ReportFormat::Html),
            other => Err(ReportError::UnknownFormat(other.to_string())),
        }
    }
}

/// Writes suite reports into an output directory.
pub struct ReportWriter {
    out_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    /// Renders the suite in every requested format.
    ///
    /// File names combine the suite name with the run's start timestamp, so
    /// successive runs never collide while re-rendering the same result is
    /// stable. Overwriting an existing report is allowed.
    pub fn write(
        &self,
        suite: &SuiteResult,
        formats: &[ReportFormat],
    ) -> Result<Vec<PathBuf>, ReportError> {
        std::fs::create_dir_all(&self.out_dir).map_err(|source| ReportError::Write {
            path: self.out_dir.clone(),
            source,
        })?;

        let stem = format!(
            "{}-{}",
            sanitize(&suite.suite),
            suite.started_at.format("%Y%m%dT%H%M%SZ")
        );

        let mut written = Vec::new();
        for format in formats {
            let path = self.out_dir.join(format!("{stem}.{}", format.extension()));
            let content = render(suite, *format)?;
            std::fs::write(&path, content).map_err(|source| ReportError::Write {
                path: path.clone(),
                source,
            })?;
            info!(path = %path.display(), "Report written");
            written.push(path);
        }

        Ok(written)
    }
}

/// Renders one format to a string.
pub fn render(suite: &SuiteResult, format: ReportFormat) -> Result<String, ReportError> {
    match format {
        ReportFormat::Json => render::to_json(suite),
        ReportFormat::Csv => render::to_csv(suite),
        ReportFormat::Markdown => Ok(render::to_markdown(suite)),
        ReportFormat::Html => Ok(render::to_html(suite)),
    }
}

/// Loads a previously written JSON report.
pub fn load(path: &Path) -> Result<SuiteResult, ReportError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ReportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ReportError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Keeps suite names filesystem-safe.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
