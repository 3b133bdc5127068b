//! # Workload Profiles
//!
//! Purpose: Optional YAML description of per-iteration GET parameters
//! (bucket override, ranged-read offset/size) and of the S3 endpoints to
//! spread operations across. Static after load; workers only ever look
//! entries up.
//!
//! ```yaml
//! s3config:
//!   - name: default
//!     endpoints: ["http://10.0.0.1:9000", "http://10.0.0.2:9000"]
//! profiles:
//!   - name: mixed
//!     entries:
//!       - count: 3
//!         size: 65536
//!         offset: 0
//!       - bucket: hot-bucket
//!         count: 1
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{BenchError, BenchResult};

/// One S3 target: a set of equivalent endpoints plus credentials. Empty
/// fields are back-filled from the CLI/environment after load.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct S3Config {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
}

/// Per-iteration parameters. `count` consecutive iterations use this entry
/// before the lookup moves on to the next one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkloadEntry {
    /// Overrides the index-derived bucket when non-empty.
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub count: i64,
    /// Ranged-read size in bytes; 0 reads the whole object.
    #[serde(default)]
    pub size: i64,
    /// Ranged-read offset in bytes.
    #[serde(default)]
    pub offset: i64,
}

/// An ordered sequence of entries, cycled over the iteration counter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkloadProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub entries: Vec<WorkloadEntry>,
    /// Sum of entry counts, fixed by `normalize`.
    #[serde(skip)]
    total: i64,
}

/// Profile file root. When no file is given, a singleton profile is
/// synthesized from the CLI range flags.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkloadConfig {
    #[serde(default)]
    pub s3config: Vec<S3Config>,
    #[serde(default)]
    pub profiles: Vec<WorkloadProfile>,
}

impl WorkloadConfig {
    /// Loads and normalizes a profile file.
    pub fn load(path: impl AsRef<Path>) -> BenchResult<Self> {
        let text = fs::read_to_string(path)?;
        let mut config: WorkloadConfig = serde_yaml::from_str(&text)?;
        config.normalize();
        Ok(config)
    }

    /// Builds the default config used when no profile file is supplied:
    /// one profile whose single entry carries the CLI range flags.
    pub fn synthesized(range_size: i64, range_offset: i64) -> Self {
        let mut config = WorkloadConfig::default();
        config.add_profile("", 1, range_size, range_offset);
        config
    }

    /// Appends a single-entry profile and re-normalizes.
    pub fn add_profile(&mut self, bucket: &str, count: i64, size: i64, offset: i64) {
        self.profiles.push(WorkloadProfile {
            name: String::new(),
            entries: vec![WorkloadEntry {
                bucket: bucket.to_string(),
                count,
                size,
                offset,
            }],
            total: 0,
        });
        self.normalize();
    }

    /// Appends an S3 target.
    pub fn add_s3_config(&mut self, name: &str, endpoints: Vec<String>, access_key: &str, secret_key: &str) {
        self.s3config.push(S3Config {
            name: name.to_string(),
            endpoints,
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
        });
    }

    /// Replaces degenerate profiles (no entries, or zero total count) with a
    /// single pass-through entry and fixes the cached totals.
    pub fn normalize(&mut self) {
        for profile in &mut self.profiles {
            let mut total: i64 = profile.entries.iter().map(|e| e.count).sum();
            if profile.entries.is_empty() || total < 1 {
                profile.entries = vec![WorkloadEntry {
                    bucket: String::new(),
                    count: 1,
                    size: 0,
                    offset: 0,
                }];
                total = 1;
            }
            profile.total = total;
        }
    }

    /// Resolves `-p <name>` to a profile index; an empty name selects the
    /// first profile.
    pub fn profile_index(&self, name: &str) -> BenchResult<usize> {
        if name.is_empty() {
            return Ok(0);
        }
        self.profiles
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| BenchError::Profile(format!("no workload profile named '{name}'")))
    }

    /// Returns the entry for iteration `iter` of a profile: the cumulative
    /// entry counts are walked until `iter mod total` is used up. Ties
    /// return the first matching entry.
    pub fn entry_for(&self, profile_id: usize, iter: i64) -> &WorkloadEntry {
        let profile = &self.profiles[profile_id];
        let mut remaining = iter.rem_euclid(profile.total);
        for entry in &profile.entries {
            remaining -= entry.count;
            if remaining <= 0 {
                return entry;
            }
        }
        &profile.entries[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_entry_config() -> WorkloadConfig {
        let mut config: WorkloadConfig = serde_yaml::from_str(
            r#"
profiles:
  - name: mixed
    entries:
      - count: 2
        size: 100
        offset: 10
      - bucket: special
        count: 2
"#,
        )
        .unwrap();
        config.normalize();
        config
    }

    #[test]
    fn entry_lookup_walks_cumulative_counts() {
        let config = two_entry_config();
        // total = 4. The walk subtracts counts until non-positive, so the
        // exact boundary (iter mod total == 2) still lands on the first
        // entry; only iteration 3 reaches the second.
        assert_eq!(config.entry_for(0, 0).size, 100);
        assert_eq!(config.entry_for(0, 1).size, 100);
        assert_eq!(config.entry_for(0, 2).size, 100);
        assert_eq!(config.entry_for(0, 3).bucket, "special");
        assert_eq!(config.entry_for(0, 4).size, 100);
        assert_eq!(config.entry_for(0, 7).bucket, "special");
    }

    #[test]
    fn degenerate_profile_is_normalized() {
        let mut config: WorkloadConfig = serde_yaml::from_str(
            r#"
profiles:
  - name: empty
"#,
        )
        .unwrap();
        config.normalize();
        let entry = config.entry_for(0, 41);
        assert_eq!(entry.count, 1);
        assert_eq!(entry.size, 0);
        assert!(entry.bucket.is_empty());
    }

    #[test]
    fn synthesized_profile_carries_range_flags() {
        let config = WorkloadConfig::synthesized(4096, 128);
        let entry = config.entry_for(0, 7);
        assert_eq!(entry.size, 4096);
        assert_eq!(entry.offset, 128);
    }

    #[test]
    fn profile_index_by_name() {
        let config = two_entry_config();
        assert_eq!(config.profile_index("").unwrap(), 0);
        assert_eq!(config.profile_index("mixed").unwrap(), 0);
        assert!(config.profile_index("missing").is_err());
    }

    #[test]
    fn s3config_parses_endpoint_list() {
        let config: WorkloadConfig = serde_yaml::from_str(
            r#"
s3config:
  - name: default
    endpoints: ["http://a:9000", "http://b:9000"]
profiles: []
"#,
        )
        .unwrap();
        assert_eq!(config.s3config[0].endpoints.len(), 2);
    }
}
