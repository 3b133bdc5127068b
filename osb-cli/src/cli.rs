//! # Command-Line Surface
//!
//! Purpose: Flag parsing and cross-flag validation, producing the
//! immutable `RunConfig` the engine consumes plus the output paths the
//! sinks write to. Credentials and endpoint default from the environment;
//! a workload profile file can override the endpoint set.

use std::path::PathBuf;

use clap::Parser;

use osb_common::{bucket_names, parse_size, BenchResult, RunConfig, WorkloadConfig};

const NOTES: &str = "\
NOTES:
  - Valid mode types for the -m mode string are:
    c: clear all existing objects from buckets (requires lookups)
    x: delete buckets
    i: initialize buckets
    p: put objects in buckets
    l: list objects in buckets
    g: get objects from buckets (randomly when the object count is known,
       sequentially otherwise)
    d: delete objects from buckets

    Modes are processed in order and can repeat: \"ippgd\" initializes the
    buckets, puts the objects twice, gets them, then deletes them. The -l
    flag repeats the whole mode string.

  - Many S3 services cap listing pages at 1000 keys regardless of the value
    passed via --mk; larger values are then silently ignored by the server.
";

/// S3 object-storage load generator.
#[derive(Debug, Parser)]
#[command(name = "osb", version, about = "Benchmark S3-compatible object storage", after_help = NOTES)]
pub struct Args {
    /// Access key
    #[arg(short = 'a', long, env = "AWS_ACCESS_KEY_ID", default_value = "", hide_env_values = true)]
    pub access_key: String,

    /// Secret key
    #[arg(short = 's', long, env = "AWS_SECRET_ACCESS_KEY", default_value = "", hide_env_values = true)]
    pub secret_key: String,

    /// Endpoint URL with scheme prefix
    #[arg(short = 'u', long = "url", env = "AWS_HOST", default_value = "")]
    pub url: String,

    /// Region for testing
    #[arg(short = 'r', long, default_value = "us-east-1")]
    pub region: String,

    /// Prefix for generated bucket names (<prefix>000000000000...)
    #[arg(long = "bp", default_value = "osb-bench")]
    pub bucket_prefix: String,

    /// Space-separated explicit bucket list, instead of generated names
    #[arg(long = "bl")]
    pub bucket_list: Option<String>,

    /// Prefix for object keys
    #[arg(long = "op", default_value = "")]
    pub object_prefix: String,

    /// Number of buckets to distribute operations across
    #[arg(short = 'b', long = "buckets", default_value_t = 1)]
    pub bucket_count: i64,

    /// Maximum number of objects (-1 for unlimited)
    #[arg(short = 'n', long = "objects", default_value_t = -1, allow_negative_numbers = true)]
    pub object_count: i64,

    /// Object index to start with
    #[arg(short = 'f', long = "first-object", default_value_t = 0)]
    pub first_object: i64,

    /// Maximum phase duration in seconds (-1 for unlimited)
    #[arg(short = 'd', long = "duration", default_value_t = 60, allow_negative_numbers = true)]
    pub duration: i64,

    /// Number of worker tasks
    #[arg(short = 't', long = "threads", default_value_t = 1)]
    pub threads: usize,

    /// Number of times to repeat the mode string
    #[arg(short = 'l', long = "loops", default_value_t = 1)]
    pub loops: usize,

    /// Run modes, in order (see NOTES)
    #[arg(short = 'm', long = "modes", default_value = "cxiplgdcx")]
    pub modes: String,

    /// Object size with optional K/M/G postfix
    #[arg(short = 'z', long = "size", default_value = "1M")]
    pub size: String,

    /// Minimum object size for uniform-random sizing
    #[arg(long = "mz")]
    pub min_size: Option<String>,

    /// Maximum keys per listing page
    #[arg(long = "mk", default_value_t = 1000)]
    pub max_keys: i64,

    /// Seconds between report intervals (fractional; -1 disables windows)
    #[arg(long = "ri", default_value_t = 1.0, allow_negative_numbers = true)]
    pub interval: f64,

    /// Per-operation timeout for PUT/GET in milliseconds (0 disables)
    #[arg(long = "tt", default_value_t = 0)]
    pub op_timeout: u64,

    /// Ranged GET: offset in bytes
    #[arg(long = "ro", default_value_t = 0)]
    pub range_offset: i64,

    /// Ranged GET: size in bytes
    #[arg(long = "rs", default_value_t = 0)]
    pub range_size: i64,

    /// Storage class for PUT
    #[arg(long = "cl")]
    pub storage_class: Option<String>,

    /// Write CSV output to this file
    #[arg(short = 'o', long = "csv")]
    pub csv_output: Option<PathBuf>,

    /// Write JSON output to this file
    #[arg(short = 'j', long = "json")]
    pub json_output: Option<PathBuf>,

    /// Write the per-object audit log (NDJSON) to this file
    #[arg(long = "oj")]
    pub audit_output: Option<PathBuf>,

    /// Workload profile file
    #[arg(long = "wp")]
    pub profile_file: Option<PathBuf>,

    /// Workload profile name (default: the first profile)
    #[arg(short = 'p', long = "profile", default_value = "")]
    pub profile_name: String,
}

/// Report/audit destinations separated from the engine's config.
#[derive(Debug, Clone, Default)]
pub struct OutputPaths {
    pub csv: Option<PathBuf>,
    pub json: Option<PathBuf>,
    pub audit: Option<PathBuf>,
}

impl Args {
    /// Resolves flags, environment, and profile file into a validated
    /// `RunConfig`.
    pub fn into_config(self) -> BenchResult<(RunConfig, OutputPaths)> {
        let object_max_size = parse_size(&self.size)?;
        let object_min_size = match &self.min_size {
            Some(arg) => parse_size(arg)?,
            None => 0,
        };

        let mut workload = match &self.profile_file {
            Some(path) => WorkloadConfig::load(path)?,
            None => WorkloadConfig::synthesized(self.range_size, self.range_offset),
        };
        // Back-fill profile-provided targets with CLI/environment values.
        if workload.s3config.is_empty() {
            workload.add_s3_config(
                "default",
                vec![self.url.clone()],
                &self.access_key,
                &self.secret_key,
            );
        } else {
            for target in &mut workload.s3config {
                if target.access_key.is_empty() {
                    target.access_key = self.access_key.clone();
                }
                if target.secret_key.is_empty() {
                    target.secret_key = self.secret_key.clone();
                }
                if target.endpoints.is_empty() {
                    target.endpoints = vec![self.url.clone()];
                }
            }
        }
        let profile_id = workload.profile_index(&self.profile_name)?;
        let target = workload.s3config[0].clone();

        let buckets = match &self.bucket_list {
            Some(list) => list.split_whitespace().map(str::to_string).collect(),
            None => bucket_names(&self.bucket_prefix, self.bucket_count),
        };

        let outputs = OutputPaths {
            csv: self.csv_output,
            json: self.json_output,
            audit: self.audit_output,
        };

        let config = RunConfig {
            access_key: target.access_key,
            secret_key: target.secret_key,
            endpoints: target.endpoints,
            region: self.region,
            buckets,
            object_prefix: self.object_prefix,
            storage_class: self.storage_class,
            modes: self.modes,
            object_count: self.object_count,
            first_object: self.first_object,
            duration_secs: self.duration,
            threads: self.threads,
            loops: self.loops,
            object_max_size,
            object_min_size,
            max_keys: self.max_keys,
            interval_secs: self.interval,
            op_timeout_ms: self.op_timeout,
            profile_id,
            workload,
        };
        config.validate()?;
        Ok((config, outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["osb", "-a", "ak", "-s", "sk", "-u", "http://127.0.0.1:9000"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).expect("arguments parse")
    }

    #[test]
    fn defaults_mirror_the_documented_surface() {
        let (config, outputs) = parse(&[]).into_config().unwrap();
        assert_eq!(config.modes, "cxiplgdcx");
        assert_eq!(config.buckets, vec!["osb-bench000000000000"]);
        assert_eq!(config.object_count, -1);
        assert_eq!(config.duration_secs, 60);
        assert_eq!(config.threads, 1);
        assert_eq!(config.object_max_size, 1 << 20);
        assert_eq!(config.object_min_size, 0);
        assert_eq!(config.max_keys, 1000);
        assert_eq!(config.interval_secs, 1.0);
        assert!(config.storage_class.is_none());
        assert!(outputs.csv.is_none() && outputs.json.is_none() && outputs.audit.is_none());
    }

    #[test]
    fn sizes_and_counts_parse() {
        let (config, _) = parse(&[
            "-z", "4K", "--mz", "1K", "-n", "500", "-b", "3", "-t", "8", "-m", "ipgd",
        ])
        .into_config()
        .unwrap();
        assert_eq!(config.object_max_size, 4096);
        assert_eq!(config.object_min_size, 1024);
        assert_eq!(config.object_count, 500);
        assert_eq!(config.buckets.len(), 3);
        assert_eq!(config.threads, 8);
    }

    #[test]
    fn explicit_bucket_list_overrides_the_prefix() {
        let (config, _) = parse(&["--bl", "alpha beta gamma", "-m", "l"])
            .into_config()
            .unwrap();
        assert_eq!(config.buckets, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn range_flags_build_the_singleton_profile() {
        let (config, _) = parse(&["--ro", "128", "--rs", "4096", "-m", "pg", "-n", "10"])
            .into_config()
            .unwrap();
        let entry = config.workload.entry_for(config.profile_id, 0);
        assert_eq!(entry.offset, 128);
        assert_eq!(entry.size, 4096);
    }

    #[test]
    fn invalid_mode_is_rejected() {
        assert!(parse(&["-m", "ipq"]).into_config().is_err());
    }

    #[test]
    fn unlimited_objects_and_duration_are_rejected() {
        assert!(parse(&["-n", "-1", "-d", "-1"]).into_config().is_err());
    }

    #[test]
    fn get_without_count_or_put_is_rejected() {
        assert!(parse(&["-m", "ig"]).into_config().is_err());
        assert!(parse(&["-m", "ipg"]).into_config().is_ok());
        assert!(parse(&["-m", "ig", "-n", "100"]).into_config().is_ok());
    }
}
