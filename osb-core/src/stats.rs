//! # Phase Statistics Fabric
//!
//! Purpose: Per-worker, per-window latency accounting with a lock-free
//! fan-in barrier that decides when a window may be aggregated.
//!
//! Each worker owns one slot and appends samples to the interval record for
//! its current window; crossing a window boundary appends fresh interval
//! records and registers an arrival for every window left behind. The
//! arrival that brings a window's count to the worker count is the only
//! place that window is aggregated, so workers never contend on a shared
//! buffer on the hot path. A worker that finishes also arrives at its final
//! window; once every worker has finished, every window that holds samples
//! is reportable and the controller collects the rows in order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Instant;

use dashmap::DashMap;

use osb_common::{OutputRecord, StatusMap};

/// Nanoseconds on a process-local monotonic clock.
pub fn monotonic_ns() -> i64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as i64
}

/// Run-wide error-code histogram.
///
/// This is the one shared mutable structure the workers touch outside their
/// own slot; the mutex is held for a single map increment, or for the
/// snapshot-and-clear the aggregator performs per record.
#[derive(Default)]
pub struct StatusHistogram {
    counts: Mutex<StatusMap>,
}

impl StatusHistogram {
    pub fn new() -> Self {
        StatusHistogram::default()
    }

    /// Counts one occurrence of a service error code.
    pub fn record(&self, code: &str) {
        let mut counts = self.counts.lock().expect("status mutex poisoned");
        *counts.entry(code.to_string()).or_insert(0) += 1;
    }

    /// Takes the current histogram, leaving it empty.
    pub fn drain(&self) -> StatusMap {
        let mut counts = self.counts.lock().expect("status mutex poisoned");
        std::mem::take(&mut *counts)
    }
}

/// Accumulated samples for one (worker, window) pair.
#[derive(Default)]
struct IntervalStats {
    bytes: i64,
    slowdowns: i64,
    lat_ns: Vec<i64>,
}

/// One worker's append-only window buffer. `cur_window == -1` is the
/// terminal sentinel: the buffer is frozen and appends are dropped.
struct WorkerStats {
    cur_window: i64,
    intervals: Vec<IntervalStats>,
}

impl WorkerStats {
    fn new() -> Self {
        WorkerStats {
            cur_window: 0,
            intervals: vec![IntervalStats::default()],
        }
    }
}

/// Shared statistics for one phase.
pub struct PhaseStats {
    loop_id: usize,
    mode_tag: &'static str,
    workers: usize,
    /// Window width; non-positive disables window splitting.
    interval_ns: i64,
    start_ns: i64,
    end_ns: AtomicI64,
    /// Slot `t` is written only by worker `t` while the phase runs; the
    /// mutex is uncontended until the aggregator reads closed windows.
    slots: Vec<Mutex<WorkerStats>>,
    /// window id → number of workers that have moved past it.
    arrivals: DashMap<i64, AtomicUsize>,
    finished: AtomicUsize,
    /// Windows aggregated so far, keyed by window id.
    results: Mutex<BTreeMap<i64, OutputRecord>>,
    statuses: Arc<StatusHistogram>,
}

impl PhaseStats {
    pub fn new(
        loop_id: usize,
        mode_tag: &'static str,
        workers: usize,
        interval_ns: i64,
        statuses: Arc<StatusHistogram>,
    ) -> Self {
        PhaseStats {
            loop_id,
            mode_tag,
            workers,
            interval_ns,
            start_ns: monotonic_ns(),
            end_ns: AtomicI64::new(0),
            slots: (0..workers).map(|_| Mutex::new(WorkerStats::new())).collect(),
            arrivals: DashMap::new(),
            finished: AtomicUsize::new(0),
            results: Mutex::new(BTreeMap::new()),
            statuses,
        }
    }

    fn lock_slot(&self, worker: usize) -> MutexGuard<'_, WorkerStats> {
        self.slots[worker].lock().expect("slot mutex poisoned")
    }

    /// Moves a worker's buffer forward to the window containing now,
    /// registering an arrival for every window crossed. Returns the new
    /// current window, or -1 when the buffer is already frozen.
    pub fn advance(&self, worker: usize) -> i64 {
        let (old, new) = {
            let mut slot = self.lock_slot(worker);
            let old = slot.cur_window;
            if old < 0 {
                return -1;
            }
            if self.interval_ns > 0 {
                let now = monotonic_ns();
                while self.start_ns + self.interval_ns * (slot.cur_window + 1) < now {
                    slot.cur_window += 1;
                    slot.intervals.push(IntervalStats::default());
                }
            }
            (old, slot.cur_window)
        };
        for window in old..new {
            self.arrive(window);
        }
        new
    }

    /// Records a successful operation into the worker's current window.
    pub fn add_op(&self, worker: usize, bytes: i64, lat_ns: i64) {
        let mut slot = self.lock_slot(worker);
        if slot.cur_window < 0 {
            return;
        }
        let cur = slot.cur_window as usize;
        let interval = &mut slot.intervals[cur];
        interval.bytes += bytes;
        interval.lat_ns.push(lat_ns);
    }

    /// Counts a failed operation against the worker's current window.
    pub fn add_slowdown(&self, worker: usize) {
        let mut slot = self.lock_slot(worker);
        if slot.cur_window < 0 {
            return;
        }
        let cur = slot.cur_window as usize;
        slot.intervals[cur].slowdowns += 1;
    }

    /// Freezes a worker's buffer and counts it as arrived at its final
    /// window. The last worker to finish stamps the phase end time.
    pub fn finish(&self, worker: usize) {
        self.advance(worker);
        let final_window = {
            let mut slot = self.lock_slot(worker);
            let window = slot.cur_window;
            slot.cur_window = -1;
            window
        };
        if final_window >= 0 && self.interval_ns > 0 {
            self.arrive(final_window);
        }
        if self.finished.fetch_add(1, Ordering::AcqRel) + 1 == self.workers {
            self.end_ns.store(monotonic_ns(), Ordering::Release);
        }
    }

    /// Registers one arrival at `window`; the arrival that completes the
    /// fan-in aggregates the window and publishes its record.
    fn arrive(&self, window: i64) {
        let count = {
            let counter = self.arrivals.entry(window).or_default();
            counter.fetch_add(1, Ordering::AcqRel) + 1
        };
        if count == self.workers {
            let record = self.aggregate_window(window);
            record.emit();
            self.results
                .lock()
                .expect("results mutex poisoned")
                .insert(window, record);
        }
    }

    /// Merges one window across all worker slots. Slots frozen before the
    /// window existed simply contribute nothing.
    fn aggregate_window(&self, window: i64) -> OutputRecord {
        let mut bytes = 0i64;
        let mut slowdowns = 0i64;
        let mut lat_ns = Vec::new();
        for slot in &self.slots {
            let slot = slot.lock().expect("slot mutex poisoned");
            if let Some(interval) = slot.intervals.get(window as usize) {
                bytes += interval.bytes;
                slowdowns += interval.slowdowns;
                lat_ns.extend_from_slice(&interval.lat_ns);
            }
        }
        self.make_record(window.to_string(), bytes, slowdowns, lat_ns, self.interval_ns)
    }

    /// The per-phase aggregate across every window.
    pub fn total_record(&self) -> OutputRecord {
        let mut bytes = 0i64;
        let mut slowdowns = 0i64;
        let mut lat_ns = Vec::new();
        for slot in &self.slots {
            let slot = slot.lock().expect("slot mutex poisoned");
            for interval in &slot.intervals {
                bytes += interval.bytes;
                slowdowns += interval.slowdowns;
                lat_ns.extend_from_slice(&interval.lat_ns);
            }
        }
        let span_ns = self.end_ns.load(Ordering::Acquire) - self.start_ns;
        self.make_record("TOTAL".to_string(), bytes, slowdowns, lat_ns, span_ns)
    }

    /// Returns the per-window records in order. Windows the fan-in barrier
    /// never completed (trailing windows of uneven finishes) are aggregated
    /// here, exactly once. Callers invoke this only after every worker has
    /// finished.
    pub fn collect_results(&self) -> Vec<OutputRecord> {
        let mut records = Vec::new();
        if self.interval_ns <= 0 {
            return records;
        }
        let max_windows = self
            .slots
            .iter()
            .map(|slot| slot.lock().expect("slot mutex poisoned").intervals.len())
            .max()
            .unwrap_or(0);
        for window in 0..max_windows as i64 {
            let aggregated = self
                .results
                .lock()
                .expect("results mutex poisoned")
                .remove(&window);
            records.push(aggregated.unwrap_or_else(|| self.aggregate_window(window)));
        }
        records
    }

    /// Derives the output metrics for one sorted-latency population.
    fn make_record(
        &self,
        interval_name: String,
        bytes: i64,
        slowdowns: i64,
        mut lat_ns: Vec<i64>,
        span_ns: i64,
    ) -> OutputRecord {
        lat_ns.sort_unstable();
        let ops = lat_ns.len();

        let mut min_lat_ms = 0.0;
        let mut avg_lat_ms = 0.0;
        let mut p99_lat_ms = 0.0;
        let mut max_lat_ms = 0.0;
        if ops > 0 {
            min_lat_ms = lat_ns[0] as f64 / 1e6;
            max_lat_ms = lat_ns[ops - 1] as f64 / 1e6;
            let total: i64 = lat_ns.iter().sum();
            avg_lat_ms = total as f64 / ops as f64 / 1e6;
            let p99_index = ((0.99 * ops as f64).round() as usize).max(1) - 1;
            p99_lat_ms = lat_ns[p99_index] as f64 / 1e6;
        }

        let seconds = span_ns as f64 / 1e9;
        let (mbps, iops) = if seconds > 0.0 {
            (
                bytes as f64 / seconds / (1u64 << 20) as f64,
                ops as f64 / seconds,
            )
        } else {
            (0.0, 0.0)
        };

        OutputRecord {
            loop_id: self.loop_id,
            interval_name,
            seconds,
            mode: self.mode_tag.to_string(),
            ops,
            mbps,
            iops,
            min_lat_ms,
            avg_lat_ms,
            p99_lat_ms,
            max_lat_ms,
            slowdowns,
            statuses: self.statuses.drain(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const MS: i64 = 1_000_000;

    fn stats(workers: usize, interval_ns: i64) -> PhaseStats {
        PhaseStats::new(0, "PUT", workers, interval_ns, Arc::new(StatusHistogram::new()))
    }

    #[test]
    fn total_merges_all_workers() {
        let stats = stats(2, -1);
        stats.add_op(0, 100, 5 * MS);
        stats.add_op(0, 100, 1 * MS);
        stats.add_op(1, 300, 3 * MS);
        stats.add_slowdown(1);
        stats.finish(0);
        stats.finish(1);

        let total = stats.total_record();
        assert_eq!(total.interval_name, "TOTAL");
        assert_eq!(total.ops, 3);
        assert_eq!(total.slowdowns, 1);
        assert_eq!(total.min_lat_ms, 1.0);
        assert_eq!(total.max_lat_ms, 5.0);
        assert_eq!(total.avg_lat_ms, 3.0);
        assert!(total.seconds > 0.0);
        assert!(total.iops > 0.0);
    }

    #[test]
    fn latency_ordering_holds_on_aggregates() {
        let stats = stats(1, -1);
        for lat in [7, 2, 9, 4, 1, 8, 3] {
            stats.add_op(0, 10, lat * MS);
        }
        stats.finish(0);
        let total = stats.total_record();
        assert!(total.min_lat_ms <= total.avg_lat_ms);
        assert!(total.avg_lat_ms <= total.p99_lat_ms);
        assert!(total.p99_lat_ms <= total.max_lat_ms);
    }

    #[test]
    fn p99_picks_the_right_rank() {
        let stats = stats(1, -1);
        for lat in 1..=100i64 {
            stats.add_op(0, 0, lat * MS);
        }
        stats.finish(0);
        // round(0.99 * 100) - 1 = index 98 → the 99th smallest sample.
        assert_eq!(stats.total_record().p99_lat_ms, 99.0);
    }

    #[test]
    fn frozen_buffer_drops_appends() {
        let stats = stats(1, -1);
        stats.add_op(0, 1, MS);
        stats.finish(0);
        stats.add_op(0, 1, MS);
        stats.add_slowdown(0);
        let total = stats.total_record();
        assert_eq!(total.ops, 1);
        assert_eq!(total.slowdowns, 0);
    }

    #[test]
    fn empty_phase_reports_zeros() {
        let stats = stats(2, -1);
        stats.finish(0);
        stats.finish(1);
        let total = stats.total_record();
        assert_eq!(total.ops, 0);
        assert_eq!(total.min_lat_ms, 0.0);
        assert_eq!(total.avg_lat_ms, 0.0);
        assert_eq!(total.p99_lat_ms, 0.0);
        assert_eq!(total.max_lat_ms, 0.0);
        assert_eq!(total.mbps, 0.0);
    }

    #[test]
    fn windows_split_on_wall_clock() {
        let stats = stats(1, 40 * MS);
        stats.add_op(0, 10, MS);
        std::thread::sleep(Duration::from_millis(100));
        let window = stats.advance(0);
        assert!(window >= 2, "expected at least two boundary crossings");
        stats.add_op(0, 20, MS);
        stats.finish(0);

        let rows = stats.collect_results();
        assert_eq!(rows.len() as i64, window + 1);
        assert_eq!(rows[0].ops, 1);
        assert_eq!(rows[0].interval_name, "0");
        // Middle windows are empty but still reported as zero rows.
        assert_eq!(rows[1].ops, 0);
        let last = rows.last().unwrap();
        assert_eq!(last.ops, 1);

        let total = stats.total_record();
        let window_ops: usize = rows.iter().map(|r| r.ops).sum();
        assert_eq!(total.ops, window_ops);
    }

    #[test]
    fn interval_splitting_disabled_yields_no_rows() {
        let stats = stats(1, -1);
        stats.add_op(0, 10, MS);
        stats.finish(0);
        assert!(stats.collect_results().is_empty());
        assert_eq!(stats.total_record().ops, 1);
    }

    #[test]
    fn last_arrival_aggregates_the_window() {
        let stats = stats(2, 30 * MS);
        stats.add_op(0, 1, MS);
        stats.add_op(1, 2, MS);
        std::thread::sleep(Duration::from_millis(70));
        stats.advance(0);
        // Only one worker has crossed; window 0 must not be published yet.
        assert!(stats
            .results
            .lock()
            .unwrap()
            .is_empty());
        stats.advance(1);
        let results = stats.results.lock().unwrap();
        let first = results.get(&0).expect("window 0 aggregated");
        assert_eq!(first.ops, 2);
        assert_eq!(first.interval_name, "0");
    }

    #[test]
    fn statuses_are_drained_into_records() {
        let histogram = Arc::new(StatusHistogram::new());
        let stats = PhaseStats::new(0, "GET", 1, -1, histogram.clone());
        histogram.record("NoSuchKey");
        histogram.record("NoSuchKey");
        stats.add_slowdown(0);
        stats.add_slowdown(0);
        stats.finish(0);

        let total = stats.total_record();
        assert_eq!(total.slowdowns, 2);
        assert_eq!(total.statuses.get("NoSuchKey"), Some(&2));
        // Drained: a second snapshot starts from zero.
        assert!(histogram.drain().is_empty());
    }
}
