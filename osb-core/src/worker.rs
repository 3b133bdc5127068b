//! # Worker Loops
//!
//! Purpose: The per-operation-kind loops that drive the storage backend.
//! All of them share the same outer shape: check the phase deadline, claim
//! work, time one storage call, advance the window reconciler, then account
//! the result as a sample or a slowdown. Failures are counted, never
//! retried; an index claimed from the dispenser is returned on failure so
//! the assigned range stays dense.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rand::rngs::SmallRng;
use rand::Rng;
use tracing::{error, warn};

use osb_client::{StorageError, StorageResult};
use osb_common::{object_key, payload_seed, ObjectAudit, PayloadSource, WorkloadEntry};

use crate::context::RunContext;
use crate::dispenser::Dispenser;
use crate::stats::PhaseStats;

/// A worker stops after this many consecutive failures (PUT/GET/DELETE).
const MAX_CONSECUTIVE_ERRORS: u32 = 2;

/// Everything one worker task needs for one phase.
pub(crate) struct Worker {
    pub ctx: Arc<RunContext>,
    pub stats: Arc<PhaseStats>,
    pub dispenser: Arc<Dispenser>,
    pub running: Arc<AtomicUsize>,
    pub fatal: Arc<Mutex<Option<String>>>,
    pub deadline: Option<Instant>,
    /// Object-count bound for this phase (possibly pinned by an earlier
    /// PUT); negative when unknown.
    pub object_count: i64,
    pub index: usize,
    pub rng: SmallRng,
}

impl Worker {
    fn deadline_reached(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() > deadline)
    }

    /// Applies the per-operation timeout, reporting expiry as a normal
    /// storage failure.
    async fn with_timeout<T>(
        &self,
        op: impl Future<Output = StorageResult<T>>,
    ) -> StorageResult<T> {
        match self.ctx.config.op_timeout_ms {
            0 => op.await,
            limit => match tokio::time::timeout(Duration::from_millis(limit), op).await {
                Ok(result) => result,
                Err(_) => Err(StorageError::deadline_exceeded()),
            },
        }
    }

    fn pick_object_size(&mut self) -> u64 {
        let min = self.ctx.config.object_min_size;
        let max = self.ctx.config.object_max_size;
        if min == 0 {
            max
        } else {
            self.rng.gen_range(min..=max)
        }
    }

    /// Counts a failure: histogram entry, slowdown, and optionally the
    /// dispensed index going back.
    fn count_failure(&self, err: &StorageError, undo: bool) {
        self.ctx.statuses.record(&err.code);
        self.stats.add_slowdown(self.index);
        if undo {
            self.dispenser.undo();
        }
    }

    fn set_fatal(&self, message: String) {
        let mut fatal = self.fatal.lock().expect("fatal mutex poisoned");
        fatal.get_or_insert(message);
    }

    fn fatal_triggered(&self) -> bool {
        self.fatal.lock().expect("fatal mutex poisoned").is_some()
    }

    /// Final act of every worker: freeze the stats slot and report the
    /// task as gone.
    fn finish(self) {
        self.stats.finish(self.index);
        self.running.fetch_sub(1, Ordering::AcqRel);
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// HTTP Range header for a workload entry, when it requests one.
fn range_header(entry: &WorkloadEntry) -> Option<String> {
    if entry.size > 0 {
        Some(format!("bytes={}-{}", entry.offset, entry.offset + entry.size))
    } else if entry.offset > 0 {
        Some(format!("bytes={}-", entry.offset))
    } else {
        None
    }
}

pub(crate) async fn run_put(mut w: Worker) {
    let mut iteration: i64 = -1;
    let mut consecutive = 0u32;
    loop {
        if w.deadline_reached() {
            break;
        }
        iteration += 1;

        let Some(index) = w.dispenser.take() else {
            break;
        };
        let size = w.pick_object_size();
        let bucket = w.ctx.bucket_for(index).to_string();
        let key = object_key(&w.ctx.config.object_prefix, index);
        let created_ms = unix_millis();
        let body = PayloadSource::new(payload_seed(&key, created_ms), size);

        let backend = w.ctx.backend_for(iteration);
        let start = Instant::now();
        let result = w
            .with_timeout(backend.put_object(
                &bucket,
                &key,
                body,
                w.ctx.config.storage_class.as_deref(),
            ))
            .await;
        let lat_ns = start.elapsed().as_nanos() as i64;
        w.stats.advance(w.index);

        let audit = ObjectAudit {
            bucket,
            key: key.clone(),
            created_ms,
            size: size as i64,
            duration_us: lat_ns / 1_000,
            error: result
                .as_ref()
                .err()
                .map(|err| err.to_string())
                .unwrap_or_default(),
        };
        // A closed audit sink is not the workers' problem.
        let _ = w.ctx.audit_tx.send(audit).await;

        match result {
            Ok(()) => {
                consecutive = 0;
                w.stats.add_op(w.index, size as i64, lat_ns);
            }
            Err(err) => {
                consecutive += 1;
                w.count_failure(&err, true);
                if !err.is_suppressed() {
                    warn!(key = %key, error = %err, "upload failed");
                }
            }
        }
        if consecutive > MAX_CONSECUTIVE_ERRORS {
            break;
        }
    }
    w.finish();
}

pub(crate) async fn run_get(mut w: Worker) {
    let mut iteration: i64 = -1;
    let mut consecutive = 0u32;
    loop {
        if w.deadline_reached() {
            break;
        }
        iteration += 1;

        // Random reads over a known keyspace; sequential via the dispenser
        // when the object count is unknown.
        let (index, took) = if w.object_count > 0 {
            (
                w.ctx.config.first_object + w.rng.gen_range(0..w.object_count),
                false,
            )
        } else if w.object_count == 0 {
            break;
        } else {
            match w.dispenser.take() {
                Some(index) => (index, true),
                None => break,
            }
        };

        let entry = w
            .ctx
            .config
            .workload
            .entry_for(w.ctx.config.profile_id, iteration);
        let bucket = if entry.bucket.is_empty() {
            w.ctx.bucket_for(index).to_string()
        } else {
            entry.bucket.clone()
        };
        let key = object_key(&w.ctx.config.object_prefix, index);
        let range = range_header(entry);

        let backend = w.ctx.backend_for(iteration);
        let start = Instant::now();
        let result = w
            .with_timeout(backend.get_object(&bucket, &key, range.as_deref()))
            .await;
        let lat_ns = start.elapsed().as_nanos() as i64;
        w.stats.advance(w.index);

        match result {
            Ok(outcome) => match outcome.content_length {
                Some(expected) if expected != outcome.bytes_read => {
                    consecutive += 1;
                    let err = StorageError::new(
                        "ContentLengthMismatch",
                        format!("read {} bytes, content length {}", outcome.bytes_read, expected),
                    );
                    w.count_failure(&err, took);
                    warn!(key = %key, error = %err, "download failed");
                }
                _ => {
                    consecutive = 0;
                    w.stats.add_op(w.index, outcome.bytes_read, lat_ns);
                }
            },
            Err(err) => {
                consecutive += 1;
                w.count_failure(&err, took);
                if !err.is_suppressed() {
                    warn!(key = %key, error = %err, "download failed");
                }
            }
        }
        if consecutive > MAX_CONSECUTIVE_ERRORS {
            break;
        }
    }
    w.finish();
}

pub(crate) async fn run_delete(w: Worker) {
    let mut iteration: i64 = -1;
    let mut consecutive = 0u32;
    loop {
        iteration += 1;
        let Some(index) = w.dispenser.take() else {
            break;
        };
        let bucket = w.ctx.bucket_for(index).to_string();
        let key = object_key(&w.ctx.config.object_prefix, index);

        let backend = w.ctx.backend_for(iteration);
        let start = Instant::now();
        let result = backend.delete_object(&bucket, &key).await;
        let lat_ns = start.elapsed().as_nanos() as i64;
        w.stats.advance(w.index);

        match result {
            Ok(()) => {
                consecutive = 0;
                // Nominal size: DELETE moves no payload but the report
                // tracks the reclaimed volume.
                w.stats
                    .add_op(w.index, w.ctx.config.object_max_size as i64, lat_ns);
            }
            Err(err) => {
                consecutive += 1;
                w.count_failure(&err, true);
                warn!(key = %key, error = %err, "delete failed");
            }
        }
        if consecutive > MAX_CONSECUTIVE_ERRORS {
            break;
        }
    }
    w.finish();
}

pub(crate) async fn run_bucket_list(mut w: Worker) {
    let bucket_count = w.ctx.config.bucket_count();
    let mut bucket_index = w.rng.gen_range(0..bucket_count);
    let mut marker = String::new();
    let mut iteration: i64 = -1;
    loop {
        if w.deadline_reached() {
            break;
        }
        iteration += 1;

        let bucket = w.ctx.config.buckets[bucket_index as usize].clone();
        let backend = w.ctx.backend_for(iteration);
        let start = Instant::now();
        let result = backend
            .list_objects(&bucket, &marker, w.ctx.config.max_keys)
            .await;
        let lat_ns = start.elapsed().as_nanos() as i64;
        w.stats.advance(w.index);

        match result {
            Ok(page) => {
                // Each page counts as one operation and moves no payload.
                w.stats.add_op(w.index, 0, lat_ns);
                match page.resume_marker() {
                    Some(next) => marker = next,
                    None => {
                        marker.clear();
                        bucket_index = w.rng.gen_range(0..bucket_count);
                    }
                }
            }
            Err(err) => {
                w.count_failure(&err, false);
                if !err.is_suppressed() {
                    warn!(bucket = %bucket, error = %err, "listing failed");
                }
                marker.clear();
                bucket_index = w.rng.gen_range(0..bucket_count);
            }
        }
    }
    w.finish();
}

pub(crate) async fn run_bucket_init(w: Worker) {
    loop {
        if w.fatal_triggered() {
            break;
        }
        let Some(index) = w.dispenser.take() else {
            break;
        };
        let bucket = w.ctx.config.buckets[index as usize].clone();

        let backend = w.ctx.backend_for(index);
        let start = Instant::now();
        let result = backend.create_bucket(&bucket).await;
        let lat_ns = start.elapsed().as_nanos() as i64;
        w.stats.advance(w.index);

        match result {
            Ok(()) => w.stats.add_op(w.index, 0, lat_ns),
            Err(err) => {
                w.ctx.statuses.record(&err.code);
                if err.is_bucket_already_there() {
                    w.stats.add_op(w.index, 0, lat_ns);
                } else {
                    error!(bucket = %bucket, error = %err,
                        "unable to create bucket (are the access and secret keys correct?)");
                    w.set_fatal(format!("unable to create bucket {bucket}: {err}"));
                    break;
                }
            }
        }
    }
    w.finish();
}

pub(crate) async fn run_bucket_delete(w: Worker) {
    loop {
        let Some(index) = w.dispenser.take() else {
            break;
        };
        let bucket = w.ctx.config.buckets[index as usize].clone();

        let backend = w.ctx.backend_for(index);
        let start = Instant::now();
        let result = backend.delete_bucket(&bucket).await;
        let lat_ns = start.elapsed().as_nanos() as i64;
        w.stats.advance(w.index);

        match result {
            Ok(()) => w.stats.add_op(w.index, 0, lat_ns),
            Err(err) => {
                w.ctx.statuses.record(&err.code);
                warn!(bucket = %bucket, error = %err, "bucket delete failed");
                break;
            }
        }
    }
    w.finish();
}

/// One object found by a bucket-clear pager.
pub(crate) struct PagedObject {
    pub bucket_index: i64,
    pub key: String,
    pub size: i64,
}

/// Walks one bucket's full listing and feeds every key to the delete
/// workers. Runs once per bucket; the channel closes when the last pager
/// drops its sender.
pub(crate) async fn run_pager(
    ctx: Arc<RunContext>,
    bucket_index: i64,
    pages: flume::Sender<PagedObject>,
) {
    let bucket = ctx.config.buckets[bucket_index as usize].clone();
    let backend = ctx.backend_for(bucket_index).clone();
    let mut marker = String::new();
    loop {
        match backend
            .list_objects(&bucket, &marker, ctx.config.max_keys)
            .await
        {
            Ok(page) => {
                let resume = page.resume_marker();
                for object in page.objects {
                    let paged = PagedObject {
                        bucket_index,
                        key: object.key,
                        size: object.size,
                    };
                    if pages.send_async(paged).await.is_err() {
                        return;
                    }
                }
                match resume {
                    Some(next) => marker = next,
                    None => break,
                }
            }
            Err(err) => {
                ctx.statuses.record(&err.code);
                warn!(bucket = %bucket, error = %err, "bucket-clear listing failed");
                break;
            }
        }
    }
}

/// Drains the pager channel, deleting one object per message and recording
/// its stored size as transferred bytes.
pub(crate) async fn run_bucket_clear(w: Worker, pages: flume::Receiver<PagedObject>) {
    let mut iteration: i64 = -1;
    while let Ok(object) = pages.recv_async().await {
        iteration += 1;
        let bucket = w.ctx.config.buckets[object.bucket_index as usize].clone();

        let backend = w.ctx.backend_for(iteration);
        let start = Instant::now();
        let result = backend.delete_object(&bucket, &object.key).await;
        let lat_ns = start.elapsed().as_nanos() as i64;
        w.stats.advance(w.index);

        match result {
            Ok(()) => w.stats.add_op(w.index, object.size, lat_ns),
            Err(err) => {
                w.count_failure(&err, false);
                warn!(key = %object.key, error = %err, "bucket-clear delete failed");
            }
        }
    }
    w.finish();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_header_formats() {
        let whole = WorkloadEntry::default();
        assert_eq!(range_header(&whole), None);

        let offset_only = WorkloadEntry {
            offset: 100,
            ..Default::default()
        };
        assert_eq!(range_header(&offset_only).as_deref(), Some("bytes=100-"));

        let sized = WorkloadEntry {
            offset: 100,
            size: 50,
            ..Default::default()
        };
        assert_eq!(range_header(&sized).as_deref(), Some("bytes=100-150"));
    }
}
