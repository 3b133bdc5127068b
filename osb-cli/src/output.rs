//! # Report Sinks
//!
//! Purpose: CSV and JSON writers for the collected records, and the audit
//! writer task that drains the bounded per-object channel into an NDJSON
//! file (or discards it when no path was given).

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use osb_common::{BenchError, BenchResult, ObjectAudit, OutputRecord};

/// Writes all records as CSV with the fixed column header.
pub fn write_csv(path: &Path, records: &[OutputRecord]) -> BenchResult<()> {
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer
        .write_record(OutputRecord::csv_header())
        .map_err(csv_err)?;
    for record in records {
        writer.write_record(record.csv_row()).map_err(csv_err)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes all records as one JSON array.
pub fn write_json(path: &Path, records: &[OutputRecord]) -> BenchResult<()> {
    let json = serde_json::to_string(records)
        .map_err(|err| BenchError::Output(err.to_string()))?;
    std::fs::write(path, json)?;
    Ok(())
}

fn csv_err(err: csv::Error) -> BenchError {
    BenchError::Output(err.to_string())
}

/// Spawns the single consumer of the audit channel. With a path it appends
/// one JSON line per record; without one it just drains the channel so PUT
/// workers never stall. Runs until every sender is dropped.
pub fn spawn_audit_writer(
    path: Option<PathBuf>,
    mut audits: mpsc::Receiver<ObjectAudit>,
) -> JoinHandle<BenchResult<()>> {
    tokio::spawn(async move {
        let Some(path) = path else {
            while audits.recv().await.is_some() {}
            return Ok(());
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        while let Some(audit) = audits.recv().await {
            serde_json::to_writer(&mut writer, &audit)
                .map_err(|err| BenchError::Output(err.to_string()))?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use osb_common::StatusMap;

    fn record(name: &str, ops: usize) -> OutputRecord {
        OutputRecord {
            loop_id: 0,
            interval_name: name.to_string(),
            seconds: 1.0,
            mode: "PUT".into(),
            ops,
            mbps: 1.0,
            iops: ops as f64,
            min_lat_ms: 0.1,
            avg_lat_ms: 0.2,
            p99_lat_ms: 0.3,
            max_lat_ms: 0.4,
            slowdowns: 0,
            statuses: StatusMap::new(),
        }
    }

    fn scratch_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("osb-output-{}-{name}", std::process::id()));
        path
    }

    #[test]
    fn csv_has_header_and_one_row_per_record() {
        let path = scratch_path("report.csv");
        write_csv(&path, &[record("0", 3), record("TOTAL", 3)]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Loop,Interval,Duration(s),Mode,Ops"));
        assert!(lines[2].contains("TOTAL"));
    }

    #[test]
    fn json_is_an_array_of_records() {
        let path = scratch_path("report.json");
        write_json(&path, &[record("0", 1), record("TOTAL", 1)]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        let array = parsed.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[1]["IntervalName"], "TOTAL");
        assert_eq!(array[1]["Mode"], "PUT");
    }

    #[tokio::test]
    async fn audit_writer_appends_one_line_per_record() {
        let path = scratch_path("audit.ndjson");
        std::fs::remove_file(&path).ok();

        let (tx, rx) = mpsc::channel(8);
        let writer = spawn_audit_writer(Some(path.clone()), rx);
        for i in 0..3 {
            tx.send(ObjectAudit {
                bucket: "b".into(),
                key: format!("k{i}"),
                created_ms: 1,
                size: 10,
                duration_us: 5,
                error: String::new(),
            })
            .await
            .unwrap();
        }
        drop(tx);
        writer.await.unwrap().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["Key"], "k0");
        assert!(first.get("Error").is_none());
    }

    #[tokio::test]
    async fn audit_writer_discards_without_a_path() {
        let (tx, rx) = mpsc::channel(2);
        let writer = spawn_audit_writer(None, rx);
        for _ in 0..50 {
            tx.send(ObjectAudit {
                bucket: "b".into(),
                key: "k".into(),
                created_ms: 1,
                size: 10,
                duration_us: 5,
                error: String::new(),
            })
            .await
            .unwrap();
        }
        drop(tx);
        writer.await.unwrap().unwrap();
    }
}
