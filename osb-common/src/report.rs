//! # Output Records
//!
//! Purpose: The user-visible result types. One `OutputRecord` is produced
//! per reporting window plus one TOTAL per phase; one `ObjectAudit` is
//! produced per PUT for the optional NDJSON audit log.

use std::collections::HashMap;

use serde::Serialize;

/// Error-code histogram attached to each record: service error code → count.
pub type StatusMap = HashMap<String, u64>;

/// One aggregated reporting window (or the per-phase TOTAL).
///
/// Field names serialize in PascalCase to match the CSV column semantics.
#[derive(Debug, Clone, Serialize)]
pub struct OutputRecord {
    #[serde(rename = "Loop")]
    pub loop_id: usize,
    /// Window ordinal as a string, or `"TOTAL"`.
    #[serde(rename = "IntervalName")]
    pub interval_name: String,
    #[serde(rename = "Seconds")]
    pub seconds: f64,
    /// Phase tag: PUT, GET, DEL, LIST, BINIT, BDEL, BCLR.
    #[serde(rename = "Mode")]
    pub mode: String,
    #[serde(rename = "Ops")]
    pub ops: usize,
    #[serde(rename = "Mbps")]
    pub mbps: f64,
    #[serde(rename = "Iops")]
    pub iops: f64,
    #[serde(rename = "MinLat")]
    pub min_lat_ms: f64,
    #[serde(rename = "AvgLat")]
    pub avg_lat_ms: f64,
    #[serde(rename = "NinetyNineLat")]
    pub p99_lat_ms: f64,
    #[serde(rename = "MaxLat")]
    pub max_lat_ms: f64,
    #[serde(rename = "Slowdowns")]
    pub slowdowns: i64,
    #[serde(rename = "Statuses")]
    pub statuses: StatusMap,
}

impl OutputRecord {
    /// CSV column headers, in output order.
    pub fn csv_header() -> Vec<String> {
        [
            "Loop",
            "Interval",
            "Duration(s)",
            "Mode",
            "Ops",
            "MB/s",
            "IO/s",
            "MinLat(ms)",
            "AvgLat(ms)",
            "99%Lat(ms)",
            "MaxLat(ms)",
            "Slowdowns",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// One CSV row matching `csv_header`.
    pub fn csv_row(&self) -> Vec<String> {
        vec![
            self.loop_id.to_string(),
            self.interval_name.clone(),
            format!("{:.2}", self.seconds),
            self.mode.clone(),
            self.ops.to_string(),
            format!("{:.2}", self.mbps),
            format!("{:.2}", self.iops),
            format!("{:.2}", self.min_lat_ms),
            format!("{:.2}", self.avg_lat_ms),
            format!("{:.2}", self.p99_lat_ms),
            format!("{:.2}", self.max_lat_ms),
            self.slowdowns.to_string(),
        ]
    }

    /// Logs the record in the one-line operator-facing format.
    pub fn emit(&self) {
        tracing::info!(
            "Loop: {}, Int: {}, Dur(s): {:.1}, Mode: {}, Ops: {}, MB/s: {:.2}, IO/s: {:.0}, \
             Lat(ms): [ min: {:.1}, avg: {:.1}, 99%: {:.1}, max: {:.1} ], Slowdowns: {}, Statuses: {:?}",
            self.loop_id,
            self.interval_name,
            self.seconds,
            self.mode,
            self.ops,
            self.mbps,
            self.iops,
            self.min_lat_ms,
            self.avg_lat_ms,
            self.p99_lat_ms,
            self.max_lat_ms,
            self.slowdowns,
            self.statuses,
        );
    }
}

/// One line of the per-object audit log, published for every PUT attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectAudit {
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    /// Creation timestamp in Unix milliseconds; also the payload-seed input.
    #[serde(rename = "Created")]
    pub created_ms: u64,
    #[serde(rename = "Size")]
    pub size: i64,
    /// Wall-clock duration of the PUT in microseconds.
    #[serde(rename = "Duration")]
    pub duration_us: i64,
    #[serde(rename = "Error", skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> OutputRecord {
        OutputRecord {
            loop_id: 0,
            interval_name: "3".into(),
            seconds: 1.0,
            mode: "PUT".into(),
            ops: 10,
            mbps: 1.25,
            iops: 10.0,
            min_lat_ms: 0.5,
            avg_lat_ms: 1.0,
            p99_lat_ms: 2.0,
            max_lat_ms: 2.5,
            slowdowns: 0,
            statuses: StatusMap::new(),
        }
    }

    #[test]
    fn csv_row_matches_header_arity() {
        assert_eq!(record().csv_row().len(), OutputRecord::csv_header().len());
    }

    #[test]
    fn json_uses_pascal_case_names() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["Loop"], 0);
        assert_eq!(json["IntervalName"], "3");
        assert_eq!(json["Ops"], 10);
        assert_eq!(json["NinetyNineLat"], 2.0);
        assert!(json.get("Statuses").is_some());
    }

    #[test]
    fn audit_error_field_is_omitted_when_empty() {
        let audit = ObjectAudit {
            bucket: "b".into(),
            key: "k".into(),
            created_ms: 1,
            size: 2,
            duration_us: 3,
            error: String::new(),
        };
        let json = serde_json::to_string(&audit).unwrap();
        assert!(!json.contains("Error"));

        let failed = ObjectAudit {
            error: "NoSuchBucket".into(),
            ..audit
        };
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains("\"Error\":\"NoSuchBucket\""));
    }
}
