//! # Run Context
//!
//! Purpose: Everything a worker needs that outlives a single phase: the
//! immutable run configuration, the per-endpoint backend set, the shared
//! error-code histogram, and the audit-log channel. One context is built
//! per run and handed around in an `Arc`; nothing in it is mutated after
//! construction except the histogram behind its own mutex.

use std::sync::Arc;

use tokio::sync::mpsc;

use osb_client::StorageBackend;
use osb_common::{ObjectAudit, RunConfig};

use crate::stats::StatusHistogram;

pub struct RunContext {
    pub config: RunConfig,
    /// One backend per endpoint; workers rotate through them per operation.
    pub backends: Vec<Arc<dyn StorageBackend>>,
    pub statuses: Arc<StatusHistogram>,
    /// Bounded audit channel; a full channel applies backpressure to PUT
    /// workers, which is acceptable for an off-critical-path log.
    pub audit_tx: mpsc::Sender<ObjectAudit>,
}

impl RunContext {
    pub fn new(
        config: RunConfig,
        backends: Vec<Arc<dyn StorageBackend>>,
        audit_tx: mpsc::Sender<ObjectAudit>,
    ) -> Self {
        RunContext {
            config,
            backends,
            statuses: Arc::new(StatusHistogram::new()),
            audit_tx,
        }
    }

    /// Round-robin backend selection by iteration counter.
    pub fn backend_for(&self, iteration: i64) -> &Arc<dyn StorageBackend> {
        let which = iteration.rem_euclid(self.backends.len() as i64) as usize;
        &self.backends[which]
    }

    /// The bucket an operation index maps to.
    pub fn bucket_for(&self, index: i64) -> &str {
        let which = index.rem_euclid(self.config.bucket_count()) as usize;
        &self.config.buckets[which]
    }
}
