//! # Benchmark Error Types
//!
//! Purpose: One error enum for everything that can go wrong before and
//! around a run: argument validation, profile loading, and report output.
//! Storage-service failures are deliberately not here; those are counted,
//! not propagated (see `osb-client`).

use thiserror::Error;

/// Result type for configuration and output paths.
pub type BenchResult<T> = Result<T, BenchError>;

/// Errors surfaced outside the measurement hot path.
///
/// All of these are fatal to the run: the process reports them and exits
/// with status 1 rather than producing a partial or misleading report.
#[derive(Debug, Error)]
pub enum BenchError {
    /// Invalid or contradictory command-line arguments.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// An object size argument that did not parse (`-z` / `--mz`).
    #[error("invalid size argument '{0}'")]
    InvalidSize(String),
    /// Workload profile file problems beyond plain IO or YAML syntax.
    #[error("workload profile: {0}")]
    Profile(String),
    /// Filesystem failure while reading a profile or writing a report.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Report serialization failure (CSV/JSON/audit log).
    #[error("report output: {0}")]
    Output(String),
    /// Malformed workload profile YAML.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// An unrecoverable failure during a run, e.g. a bucket that cannot be
    /// created with the supplied credentials.
    #[error("fatal: {0}")]
    Fatal(String),
}
