//! # Run Controller
//!
//! Purpose: Turn the mode string into a sequence of phases. Every phase
//! gets a fresh statistics fabric and dispenser, spawns one worker task per
//! thread, and is polled to quiescence before its records are collected.
//! Object-count state threads between phases: an unbounded PUT pins the
//! count it reached so later GET/DELETE phases see a definite keyspace.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing::info;

use osb_common::{BenchError, BenchResult, OutputRecord};

use crate::context::RunContext;
use crate::dispenser::Dispenser;
use crate::stats::PhaseStats;
use crate::worker::{
    run_bucket_clear, run_bucket_delete, run_bucket_init, run_bucket_list, run_delete, run_get,
    run_pager, run_put, Worker,
};

/// The seven phase kinds, one per mode character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    BucketClear,
    BucketDelete,
    BucketInit,
    Put,
    List,
    Get,
    Delete,
}

impl OpKind {
    pub fn from_mode_char(mode: char) -> Option<Self> {
        match mode {
            'c' => Some(OpKind::BucketClear),
            'x' => Some(OpKind::BucketDelete),
            'i' => Some(OpKind::BucketInit),
            'p' => Some(OpKind::Put),
            'l' => Some(OpKind::List),
            'g' => Some(OpKind::Get),
            'd' => Some(OpKind::Delete),
            _ => None,
        }
    }

    /// Mode tag carried on every output record.
    pub fn tag(&self) -> &'static str {
        match self {
            OpKind::BucketClear => "BCLR",
            OpKind::BucketDelete => "BDEL",
            OpKind::BucketInit => "BINIT",
            OpKind::Put => "PUT",
            OpKind::List => "LIST",
            OpKind::Get => "GET",
            OpKind::Delete => "DEL",
        }
    }

    fn banner(&self) -> &'static str {
        match self {
            OpKind::BucketClear => "BUCKET CLEAR",
            OpKind::BucketDelete => "BUCKET DELETE",
            OpKind::BucketInit => "BUCKET INIT",
            OpKind::Put => "OBJECT PUT",
            OpKind::List => "BUCKET LIST",
            OpKind::Get => "OBJECT GET",
            OpKind::Delete => "OBJECT DELETE",
        }
    }

    /// Whether the phase honors the duration cap.
    fn duration_capped(&self) -> bool {
        matches!(self, OpKind::Put | OpKind::Get | OpKind::List)
    }
}

pub struct RunController {
    ctx: Arc<RunContext>,
    /// Current object-count bound; starts from the CLI value and may be
    /// pinned by an unbounded PUT phase.
    object_count: i64,
    object_count_inferred: bool,
}

impl RunController {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        let object_count = ctx.config.object_count;
        RunController {
            ctx,
            object_count,
            object_count_inferred: false,
        }
    }

    /// The object-count bound as of now (pinned or configured).
    pub fn object_count(&self) -> i64 {
        self.object_count
    }

    /// Runs every loop of the full mode string and returns all records.
    pub async fn run(&mut self) -> BenchResult<Vec<OutputRecord>> {
        let mut records = Vec::new();
        let loops = self.ctx.config.loops;
        let modes: Vec<char> = self.ctx.config.modes.chars().collect();
        for loop_id in 0..loops {
            for mode in &modes {
                let kind = OpKind::from_mode_char(*mode).ok_or_else(|| {
                    BenchError::InvalidConfig(format!("invalid mode '{mode}' passed to -m"))
                })?;
                records.extend(self.run_phase(loop_id, kind).await?);
            }
        }
        Ok(records)
    }

    /// Runs one phase to quiescence and returns its window records plus
    /// the TOTAL.
    pub async fn run_phase(
        &mut self,
        loop_id: usize,
        kind: OpKind,
    ) -> BenchResult<Vec<OutputRecord>> {
        // A repeated PUT un-pins a previously inferred count and measures a
        // fresh unbounded upload.
        if kind == OpKind::Put && self.object_count_inferred {
            self.object_count = -1;
            self.object_count_inferred = false;
        }

        info!("Running Loop {} {} TEST", loop_id, kind.banner());

        let threads = self.ctx.config.threads;
        let interval_ns = if self.ctx.config.interval_secs < 0.0 {
            -1
        } else {
            (self.ctx.config.interval_secs * 1e9) as i64
        };
        let stats = Arc::new(PhaseStats::new(
            loop_id,
            kind.tag(),
            threads,
            interval_ns,
            self.ctx.statuses.clone(),
        ));

        let deadline = (kind.duration_capped() && self.ctx.config.duration_secs >= 0).then(|| {
            Instant::now() + Duration::from_secs(self.ctx.config.duration_secs as u64)
        });
        let cap = match kind {
            OpKind::Put | OpKind::Get | OpKind::Delete => self.object_count,
            OpKind::BucketInit | OpKind::BucketDelete => self.ctx.config.bucket_count(),
            OpKind::List | OpKind::BucketClear => -1,
        };
        let dispenser = Arc::new(Dispenser::new(self.ctx.config.first_object, cap));
        let running = Arc::new(AtomicUsize::new(threads));
        let fatal: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        if kind == OpKind::BucketClear {
            let (pages_tx, pages_rx) = flume::bounded(threads * 2);
            for bucket_index in 0..self.ctx.config.bucket_count() {
                tokio::spawn(run_pager(self.ctx.clone(), bucket_index, pages_tx.clone()));
            }
            // The channel closes once the last pager drops its sender.
            drop(pages_tx);
            for index in 0..threads {
                let worker = self.worker(index, &stats, &dispenser, &running, &fatal, deadline);
                tokio::spawn(run_bucket_clear(worker, pages_rx.clone()));
            }
        } else {
            for index in 0..threads {
                let worker = self.worker(index, &stats, &dispenser, &running, &fatal, deadline);
                match kind {
                    OpKind::Put => tokio::spawn(run_put(worker)),
                    OpKind::Get => tokio::spawn(run_get(worker)),
                    OpKind::Delete => tokio::spawn(run_delete(worker)),
                    OpKind::List => tokio::spawn(run_bucket_list(worker)),
                    OpKind::BucketInit => tokio::spawn(run_bucket_init(worker)),
                    OpKind::BucketDelete => tokio::spawn(run_bucket_delete(worker)),
                    OpKind::BucketClear => unreachable!("handled above"),
                };
            }
        }

        // The controller has nothing else to do until the workers are gone.
        while running.load(Ordering::Acquire) > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        if let Some(message) = fatal.lock().expect("fatal mutex poisoned").take() {
            return Err(BenchError::Fatal(message));
        }

        // An unbounded PUT pins the keyspace it created for later phases.
        if kind == OpKind::Put && self.object_count < 0 {
            self.object_count = dispenser.current() + 1;
            self.object_count_inferred = true;
            info!("Inferred object count: {}", self.object_count);
        }

        let mut records = stats.collect_results();
        let total = stats.total_record();
        total.emit();
        records.push(total);
        Ok(records)
    }

    fn worker(
        &self,
        index: usize,
        stats: &Arc<PhaseStats>,
        dispenser: &Arc<Dispenser>,
        running: &Arc<AtomicUsize>,
        fatal: &Arc<Mutex<Option<String>>>,
        deadline: Option<Instant>,
    ) -> Worker {
        Worker {
            ctx: self.ctx.clone(),
            stats: stats.clone(),
            dispenser: dispenser.clone(),
            running: running.clone(),
            fatal: fatal.clone(),
            deadline,
            object_count: self.object_count,
            index,
            rng: SmallRng::from_entropy(),
        }
    }
}
