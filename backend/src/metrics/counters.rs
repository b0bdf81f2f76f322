use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    pub ports_accepted: Arc<AtomicU64>,
    pub ports_rejected: Arc<AtomicU64>,
    pub origins_rejected: Arc<AtomicU64>,

    pub batches_started: Arc<AtomicU64>,
    pub batches_rejected: Arc<AtomicU64>,
    pub batches_abandoned: Arc<AtomicU64>,

    // per-item outcomes
    pub items_ok: Arc<AtomicU64>,
    pub items_failed: Arc<AtomicU64>,

    pub downloads_completed: Arc<AtomicU64>,
    pub downloads_failed: Arc<AtomicU64>,
    pub chunks_sent: Arc<AtomicU64>,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn log_snapshot(&self) {
        let get = |c: &Arc<AtomicU64>| c.load(Ordering::Relaxed);
        info!(
            component = "metrics",
            ports_accepted = get(&self.ports_accepted),
            ports_rejected = get(&self.ports_rejected),
            origins_rejected = get(&self.origins_rejected),
            batches_started = get(&self.batches_started),
            batches_rejected = get(&self.batches_rejected),
            batches_abandoned = get(&self.batches_abandoned),
            items_ok = get(&self.items_ok),
            items_failed = get(&self.items_failed),
            downloads_completed = get(&self.downloads_completed),
            downloads_failed = get(&self.downloads_failed),
            chunks_sent = get(&self.chunks_sent),
            "counters"
        );
    }
}
