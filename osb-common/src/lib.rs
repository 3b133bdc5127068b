//! Shared leaf types for the osb benchmark workspace: run configuration,
//! workload profiles, the deterministic payload source, and output records.

pub mod config;
pub mod error;
pub mod payload;
pub mod report;
pub mod workload;

pub use config::{bucket_names, object_key, parse_size, RunConfig};
pub use error::{BenchError, BenchResult};
pub use payload::{payload_seed, PayloadSource};
pub use report::{ObjectAudit, OutputRecord, StatusMap};
pub use workload::{S3Config, WorkloadConfig, WorkloadEntry, WorkloadProfile};
