//! # Run Configuration
//!
//! Purpose: Immutable-after-init description of a benchmark run, shared by
//! the controller and every worker. The CLI builds one of these, validates
//! it, and nothing mutates it afterwards; the only run state that changes
//! between phases (the inferred object count) lives in the controller.

use crate::error::{BenchError, BenchResult};
use crate::workload::WorkloadConfig;

/// Width of the zero-padded numeric suffix in generated bucket and object
/// names, e.g. `bench000000000042`.
pub const NAME_PAD_WIDTH: usize = 12;

/// Builds the object key for an operation index.
pub fn object_key(prefix: &str, index: i64) -> String {
    format!("{prefix}{index:0width$}", width = NAME_PAD_WIDTH)
}

/// Builds the generated bucket name list `<prefix>000000000000..`.
pub fn bucket_names(prefix: &str, count: i64) -> Vec<String> {
    (0..count)
        .map(|i| format!("{prefix}{i:0width$}", width = NAME_PAD_WIDTH))
        .collect()
}

/// Parses a byte size with an optional K/M/G/T postfix (`1M`, `512k`,
/// `1.5G`, `4096`). A trailing `B` is accepted (`16MB`).
pub fn parse_size(arg: &str) -> BenchResult<u64> {
    let trimmed = arg.trim();
    if trimmed.is_empty() {
        return Err(BenchError::InvalidSize(arg.to_string()));
    }

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| BenchError::InvalidSize(arg.to_string()))?;

    let multiplier: u64 = match suffix.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => 1 << 10,
        "M" | "MB" => 1 << 20,
        "G" | "GB" => 1 << 30,
        "T" | "TB" => 1 << 40,
        _ => return Err(BenchError::InvalidSize(arg.to_string())),
    };

    if value < 0.0 {
        return Err(BenchError::InvalidSize(arg.to_string()));
    }
    Ok((value * multiplier as f64) as u64)
}

/// The mode characters accepted by `-m`.
pub const VALID_MODES: &[char] = &['c', 'x', 'i', 'p', 'l', 'g', 'd'];

/// Everything a run needs to know, fixed before the first phase starts.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Static credentials for every endpoint.
    pub access_key: String,
    pub secret_key: String,
    /// One storage client is built per endpoint; workers rotate through
    /// them per operation.
    pub endpoints: Vec<String>,
    pub region: String,
    /// Resolved bucket name list (generated from a prefix or given
    /// explicitly via `--bl`).
    pub buckets: Vec<String>,
    /// Prefix for generated object keys.
    pub object_prefix: String,
    /// Optional storage-class header for PUT.
    pub storage_class: Option<String>,
    /// Mode string, e.g. `cxiplgdcx`.
    pub modes: String,
    /// Object count cap; -1 means unlimited (requires a duration cap).
    pub object_count: i64,
    /// First object index, for fanning a keyspace out over processes.
    pub first_object: i64,
    /// Phase duration cap in seconds; -1 means unlimited.
    pub duration_secs: i64,
    /// Worker count per phase.
    pub threads: usize,
    /// Repeats of the whole mode string.
    pub loops: usize,
    /// Object size; when `object_min_size` is nonzero, PUT sizes are drawn
    /// uniformly from `[min, max]`.
    pub object_max_size: u64,
    pub object_min_size: u64,
    /// Listing page size.
    pub max_keys: i64,
    /// Reporting window width in seconds (fractional); values below zero
    /// disable window splitting.
    pub interval_secs: f64,
    /// Per-operation timeout in milliseconds; 0 disables it.
    pub op_timeout_ms: u64,
    /// Index of the selected workload profile.
    pub profile_id: usize,
    /// Loaded (or synthesized) workload profiles.
    pub workload: WorkloadConfig,
}

impl RunConfig {
    /// Number of buckets the run distributes operations across.
    pub fn bucket_count(&self) -> i64 {
        self.buckets.len() as i64
    }

    /// Validates the cross-field constraints the CLI cannot express.
    pub fn validate(&self) -> BenchResult<()> {
        if self.threads == 0 {
            return Err(BenchError::InvalidConfig(
                "thread count must be at least 1".into(),
            ));
        }
        if self.buckets.is_empty() {
            return Err(BenchError::InvalidConfig(
                "at least one bucket is required".into(),
            ));
        }
        if self.object_count < 0 && self.duration_secs < 0 {
            return Err(BenchError::InvalidConfig(
                "the number of objects and the duration cannot both be unlimited".into(),
            ));
        }
        if self.first_object < 0 {
            return Err(BenchError::InvalidConfig(
                "the first object index cannot be negative".into(),
            ));
        }
        if self.access_key.is_empty() {
            return Err(BenchError::InvalidConfig(
                "missing access key (-a or AWS_ACCESS_KEY_ID)".into(),
            ));
        }
        if self.secret_key.is_empty() {
            return Err(BenchError::InvalidConfig(
                "missing secret key (-s or AWS_SECRET_ACCESS_KEY)".into(),
            ));
        }
        if self.endpoints.is_empty() || self.endpoints.iter().any(String::is_empty) {
            return Err(BenchError::InvalidConfig(
                "missing endpoint URL (-u or AWS_HOST)".into(),
            ));
        }
        if self.object_min_size > self.object_max_size {
            return Err(BenchError::InvalidConfig(
                "minimum object size exceeds object size".into(),
            ));
        }

        for mode in self.modes.chars() {
            if !VALID_MODES.contains(&mode) {
                return Err(BenchError::InvalidConfig(format!(
                    "invalid mode '{mode}' passed to -m"
                )));
            }
        }

        // GET and DELETE phases with an unknown object count would walk an
        // unbounded keyspace (DELETE honors no duration cap); only allow
        // them when an earlier PUT phase pins the count.
        if self.object_count < 0 {
            let mut put_seen = false;
            for mode in self.modes.chars() {
                match mode {
                    'p' => put_seen = true,
                    'g' | 'd' if !put_seen => {
                        return Err(BenchError::InvalidConfig(format!(
                            "mode '{mode}' requires an object count (-n) or a preceding 'p' phase"
                        )));
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::WorkloadConfig;

    fn base_config() -> RunConfig {
        RunConfig {
            access_key: "ak".into(),
            secret_key: "sk".into(),
            endpoints: vec!["http://127.0.0.1:9000".into()],
            region: "us-east-1".into(),
            buckets: bucket_names("bench", 2),
            object_prefix: String::new(),
            storage_class: None,
            modes: "ipgd".into(),
            object_count: 16,
            first_object: 0,
            duration_secs: 60,
            threads: 2,
            loops: 1,
            object_max_size: 1 << 20,
            object_min_size: 0,
            max_keys: 1000,
            interval_secs: 1.0,
            op_timeout_ms: 0,
            profile_id: 0,
            workload: WorkloadConfig::synthesized(0, 0),
        }
    }

    #[test]
    fn object_key_zero_pads_to_twelve_digits() {
        assert_eq!(object_key("obj", 7), "obj000000000007");
        assert_eq!(object_key("", 123_456_789_012), "123456789012");
    }

    #[test]
    fn bucket_names_are_dense_and_prefixed() {
        let names = bucket_names("bk", 3);
        assert_eq!(
            names,
            vec!["bk000000000000", "bk000000000001", "bk000000000002"]
        );
    }

    #[test]
    fn parse_size_accepts_postfixes() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("1M").unwrap(), 1 << 20);
        assert_eq!(parse_size("2G").unwrap(), 2 << 30);
        assert_eq!(parse_size("1.5K").unwrap(), 1536);
        assert_eq!(parse_size("16MB").unwrap(), 16 << 20);
        assert_eq!(parse_size("1m").unwrap(), 1 << 20);
    }

    #[test]
    fn parse_size_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("1X").is_err());
        assert!(parse_size("lots").is_err());
        assert!(parse_size("-1K").is_err());
    }

    #[test]
    fn validate_accepts_reasonable_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_double_unlimited() {
        let mut config = base_config();
        config.object_count = -1;
        config.duration_secs = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_mode() {
        let mut config = base_config();
        config.modes = "ipz".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_get_without_pinning_put() {
        let mut config = base_config();
        config.object_count = -1;
        config.modes = "ig".into();
        assert!(config.validate().is_err());
        config.modes = "id".into();
        assert!(config.validate().is_err());

        // A PUT ahead of the GET/DELETE pins the count at runtime.
        config.modes = "ipgd".into();
        assert!(config.validate().is_ok());
    }
}
