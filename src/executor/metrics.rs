use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::types::{ExecutorError, StartTs};

/// Sink for executor events, including every failure the lanes swallow.
///
/// `submit` never reports commit outcomes to its caller, so this trait is the
/// only place where failed edges, commits and durability waits become visible.
/// Implementations must be cheap; they are called from lane threads.
pub trait ExecutorMetrics: Send + Sync {
    /// A submission was enqueued as `sub_batches` lane sub-batches totalling `bytes`.
    fn submission_accepted(&self, sub_batches: usize, bytes: i64);

    /// A submission arrived after shutdown and was discarded.
    fn submission_dropped(&self, edges: usize, bytes: i64);

    /// A caller was held by the ramp meter for longer than the slow-admission threshold.
    fn admission_delayed(&self, held: Duration);

    /// An edge application reported a transient conflict and is being retried.
    fn edge_retried(&self, lane: usize);

    /// An edge was applied to its overlay.
    fn edge_applied(&self, lane: usize);

    /// An edge failed permanently and was skipped.
    fn edge_failed(&self, lane: usize, start_ts: StartTs, err: &ExecutorError);

    /// A sub-batch commit failed.
    fn commit_failed(&self, lane: usize, start_ts: StartTs, err: &ExecutorError);

    /// The durability wait after a commit failed.
    fn durability_failed(&self, lane: usize, err: &ExecutorError);

    /// A sub-batch finished processing and released `bytes` from the outstanding counter.
    fn sub_batch_done(&self, lane: usize, bytes: i64);
}

/// Discards every event.
#[derive(Default)]
pub struct NoopMetrics;

impl ExecutorMetrics for NoopMetrics {
    fn submission_accepted(&self, _sub_batches: usize, _bytes: i64) {}
    fn submission_dropped(&self, _edges: usize, _bytes: i64) {}
    fn admission_delayed(&self, _held: Duration) {}
    fn edge_retried(&self, _lane: usize) {}
    fn edge_applied(&self, _lane: usize) {}
    fn edge_failed(&self, _lane: usize, _start_ts: StartTs, _err: &ExecutorError) {}
    fn commit_failed(&self, _lane: usize, _start_ts: StartTs, _err: &ExecutorError) {}
    fn durability_failed(&self, _lane: usize, _err: &ExecutorError) {}
    fn sub_batch_done(&self, _lane: usize, _bytes: i64) {}
}

/// Atomic counters for every executor event.
#[derive(Default)]
pub struct CounterMetrics {
    /// Submissions accepted.
    pub submissions_accepted: AtomicU64,
    /// Lane sub-batches enqueued.
    pub sub_batches_enqueued: AtomicU64,
    /// Bytes accepted.
    pub bytes_accepted: AtomicU64,
    /// Submissions discarded after shutdown.
    pub submissions_dropped: AtomicU64,
    /// Edges discarded after shutdown.
    pub edges_dropped: AtomicU64,
    /// Slow admissions.
    pub admissions_delayed: AtomicU64,
    /// Total microseconds spent in slow admissions.
    pub admission_delay_us: AtomicU64,
    /// Transient conflicts retried.
    pub edges_retried: AtomicU64,
    /// Edges applied.
    pub edges_applied: AtomicU64,
    /// Edges skipped after a fatal error.
    pub edges_failed: AtomicU64,
    /// Commits that failed.
    pub commits_failed: AtomicU64,
    /// Durability waits that failed.
    pub durability_failures: AtomicU64,
    /// Sub-batches fully processed.
    pub sub_batches_done: AtomicU64,
    /// Bytes released after processing.
    pub bytes_released: AtomicU64,
}

/// Point-in-time copy of [`CounterMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Submissions accepted.
    pub submissions_accepted: u64,
    /// Lane sub-batches enqueued.
    pub sub_batches_enqueued: u64,
    /// Bytes accepted.
    pub bytes_accepted: u64,
    /// Submissions discarded after shutdown.
    pub submissions_dropped: u64,
    /// Edges discarded after shutdown.
    pub edges_dropped: u64,
    /// Slow admissions.
    pub admissions_delayed: u64,
    /// Total microseconds spent in slow admissions.
    pub admission_delay_us: u64,
    /// Transient conflicts retried.
    pub edges_retried: u64,
    /// Edges applied.
    pub edges_applied: u64,
    /// Edges skipped after a fatal error.
    pub edges_failed: u64,
    /// Commits that failed.
    pub commits_failed: u64,
    /// Durability waits that failed.
    pub durability_failures: u64,
    /// Sub-batches fully processed.
    pub sub_batches_done: u64,
    /// Bytes released after processing.
    pub bytes_released: u64,
}

impl CounterMetrics {
    /// Reads every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            submissions_accepted: load(&self.submissions_accepted),
            sub_batches_enqueued: load(&self.sub_batches_enqueued),
            bytes_accepted: load(&self.bytes_accepted),
            submissions_dropped: load(&self.submissions_dropped),
            edges_dropped: load(&self.edges_dropped),
            admissions_delayed: load(&self.admissions_delayed),
            admission_delay_us: load(&self.admission_delay_us),
            edges_retried: load(&self.edges_retried),
            edges_applied: load(&self.edges_applied),
            edges_failed: load(&self.edges_failed),
            commits_failed: load(&self.commits_failed),
            durability_failures: load(&self.durability_failures),
            sub_batches_done: load(&self.sub_batches_done),
            bytes_released: load(&self.bytes_released),
        }
    }
}

impl ExecutorMetrics for CounterMetrics {
    fn submission_accepted(&self, sub_batches: usize, bytes: i64) {
        self.submissions_accepted.fetch_add(1, Ordering::Relaxed);
        self.sub_batches_enqueued.fetch_add(sub_batches as u64, Ordering::Relaxed);
        self.bytes_accepted.fetch_add(bytes.max(0) as u64, Ordering::Relaxed);
    }

    fn submission_dropped(&self, edges: usize, _bytes: i64) {
        self.submissions_dropped.fetch_add(1, Ordering::Relaxed);
        self.edges_dropped.fetch_add(edges as u64, Ordering::Relaxed);
    }

    fn admission_delayed(&self, held: Duration) {
        self.admissions_delayed.fetch_add(1, Ordering::Relaxed);
        self.admission_delay_us
            .fetch_add(held.as_micros().min(u64::MAX as u128) as u64, Ordering::Relaxed);
    }

    fn edge_retried(&self, _lane: usize) {
        self.edges_retried.fetch_add(1, Ordering::Relaxed);
    }

    fn edge_applied(&self, _lane: usize) {
        self.edges_applied.fetch_add(1, Ordering::Relaxed);
    }

    fn edge_failed(&self, _lane: usize, _start_ts: StartTs, _err: &ExecutorError) {
        self.edges_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn commit_failed(&self, _lane: usize, _start_ts: StartTs, _err: &ExecutorError) {
        self.commits_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn durability_failed(&self, _lane: usize, _err: &ExecutorError) {
        self.durability_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn sub_batch_done(&self, _lane: usize, bytes: i64) {
        self.sub_batches_done.fetch_add(1, Ordering::Relaxed);
        self.bytes_released.fetch_add(bytes.max(0) as u64, Ordering::Relaxed);
    }
}

/// Returns the default metrics sink, a [`NoopMetrics`].
pub fn default_metrics() -> Arc<dyn ExecutorMetrics> {
    Arc::new(NoopMetrics)
}
