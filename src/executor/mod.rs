//! Sharded write pipeline applying edge mutations through lane workers.
//!
//! An [`Executor`] owns a fixed set of lanes. Every submitted edge is routed by
//! its (attribute, entity) pair to exactly one lane, so mutations of the same
//! key are always applied in submission order. Each lane applies its
//! sub-batches to a fresh storage overlay, commits it, waits for durability and
//! then releases the sub-batch bytes from the outstanding counter that the
//! ramp meter uses to slow submitters down.

mod lane;
mod metrics;
mod options;
mod router;

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::primitives::concurrency::RampMeter;
use crate::storage::MutationStore;
use crate::types::{DirectedEdge, MutationContext, Result, StartTs};

use lane::{Lane, LaneWorker, SubMutation};
use router::group_by_lane;

pub use lane::LaneState;
pub use metrics::{default_metrics, CounterMetrics, ExecutorMetrics, MetricsSnapshot, NoopMetrics};
pub use options::{
    ExecutorOptions, RetryPolicy, DEFAULT_LANE_COUNT, DEFAULT_MAILBOX_CAPACITY,
    DEFAULT_MAX_PENDING_BYTES,
};
pub use router::lane_of;

const EXECUTOR_ADD_EDGES: &str = "executor.add_edges";

/// What happened to a submission.
///
/// This only describes acceptance. Whether the edges were eventually committed
/// is never reported back to the submitter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Submission {
    /// Enqueued on `sub_batches` lanes, adding `bytes` to the outstanding counter.
    Accepted {
        /// Number of lanes that received a sub-batch.
        sub_batches: usize,
        /// Bytes added to the outstanding counter.
        bytes: i64,
    },
    /// Discarded because shutdown had been signalled.
    Dropped,
    /// Nothing to submit.
    Empty,
}

/// Sending ends of every lane mailbox; emptied when shutdown closes the mailboxes.
struct LaneSet {
    senders: Vec<Sender<SubMutation>>,
    closed: bool,
}

/// Sharded, backpressure-aware mutation executor.
///
/// Construct with [`Executor::start`], share behind an [`Arc`] and call
/// [`Executor::submit`] from any number of threads.
///
/// Submission is fire-and-forget. Edge failures, commit failures and
/// durability failures are logged and reported to the configured
/// [`ExecutorMetrics`] sink but never to the submitter, and submissions made
/// after shutdown has been signalled are discarded. Callers that need
/// guaranteed persistence must rely on a layer above the executor, such as
/// write-ahead log replay.
pub struct Executor<S: MutationStore> {
    store: Arc<S>,
    lanes: Vec<Arc<Lane>>,
    mailboxes: RwLock<LaneSet>,
    shutdown_signal: AtomicBool,
    pending: Arc<AtomicI64>,
    ramp: RampMeter,
    metrics: Arc<dyn ExecutorMetrics>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    opts: ExecutorOptions,
}

impl<S: MutationStore> Executor<S> {
    /// Allocates every lane and spawns its worker before returning.
    pub fn start(store: Arc<S>, opts: ExecutorOptions) -> Result<Self> {
        opts.validate()?;
        let metrics = opts.metrics.clone().unwrap_or_else(default_metrics);
        let pending = Arc::new(AtomicI64::new(0));
        let (lanes, senders): (Vec<Arc<Lane>>, Vec<_>) = (0..opts.lane_count)
            .map(|_| {
                let (lane, sender) = Lane::new(opts.mailbox_capacity);
                (Arc::new(lane), sender)
            })
            .unzip();
        let mut workers = Vec::with_capacity(lanes.len());
        for (index, lane) in lanes.iter().enumerate() {
            let worker = LaneWorker {
                index,
                lane: Arc::clone(lane),
                store: Arc::clone(&store),
                pending: Arc::clone(&pending),
                metrics: Arc::clone(&metrics),
                retry: opts.retry,
            };
            match worker.spawn() {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    error!(lane = index, error = %err, "executor.start.spawn_failed");
                    drop(senders);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(err.into());
                }
            }
        }
        info!(
            lanes = opts.lane_count,
            mailbox_capacity = opts.mailbox_capacity,
            max_pending_bytes = opts.max_pending_bytes,
            "executor.start"
        );
        Ok(Self {
            store,
            lanes,
            mailboxes: RwLock::new(LaneSet {
                senders,
                closed: false,
            }),
            shutdown_signal: AtomicBool::new(false),
            pending,
            ramp: RampMeter::new(opts.max_pending_bytes, opts.ramp),
            metrics,
            workers: Mutex::new(workers),
            opts,
        })
    }

    /// Routes `edges` to their lanes and enqueues them.
    ///
    /// May block in the ramp meter while too many bytes are outstanding, and
    /// while a target lane's mailbox is full. Edges sharing a lane keep their
    /// relative order. If shutdown has been signalled the whole submission is
    /// discarded and nothing is enqueued.
    pub fn submit(
        &self,
        ctx: &MutationContext,
        start_ts: StartTs,
        edges: Vec<DirectedEdge>,
    ) -> Submission {
        if edges.is_empty() {
            return Submission::Empty;
        }
        let held = self.ramp.admit(&self.pending, EXECUTOR_ADD_EDGES);
        if held >= self.ramp.slow_admission() {
            self.metrics.admission_delayed(held);
        }

        let edge_count = edges.len();
        let groups = group_by_lane(edges, self.opts.lane_count);
        let bytes: i64 = groups.iter().map(|group| group.bytes).sum();

        // Shared side only excludes the shutdown transition, not other submitters.
        let mailboxes = self.mailboxes.read();
        if mailboxes.closed || self.shutdown_signal.load(Ordering::Acquire) {
            drop(mailboxes);
            warn!(
                start_ts = start_ts.0,
                edges = edge_count,
                bytes,
                "executor.submit.dropped"
            );
            self.metrics.submission_dropped(edge_count, bytes);
            return Submission::Dropped;
        }
        // Senders are only dropped under the exclusive lock, so every send below succeeds.
        self.pending.fetch_add(bytes, Ordering::Relaxed);
        let sub_batches = groups.len();
        for group in groups {
            let payload = SubMutation {
                ctx: ctx.clone(),
                start_ts,
                edges: group.edges,
                bytes: group.bytes,
            };
            if let Err(rejected) = mailboxes.senders[group.lane].send(payload) {
                self.pending.fetch_sub(rejected.0.bytes, Ordering::Relaxed);
                error!(lane = group.lane, "executor.submit.mailbox_closed");
            }
        }
        drop(mailboxes);

        self.metrics.submission_accepted(sub_batches, bytes);
        debug!(
            start_ts = start_ts.0,
            edges = edge_count,
            sub_batches,
            bytes,
            request_id = ctx.request_id(),
            "executor.submit.accepted"
        );
        Submission::Accepted { sub_batches, bytes }
    }

    /// Stops accepting work, drains every lane and waits for all workers to exit.
    ///
    /// Sub-batches accepted before the call are all processed. Safe to call
    /// concurrently with [`Executor::submit`] and more than once; every caller
    /// returns only after the lanes have drained.
    pub fn shutdown(&self) {
        self.shutdown_signal.store(true, Ordering::Release);
        {
            let mut mailboxes = self.mailboxes.write();
            if !mailboxes.closed {
                mailboxes.closed = true;
                for lane in &self.lanes {
                    lane.advance(LaneState::Draining);
                }
                // Dropping the senders closes the mailboxes; workers drain what is queued.
                mailboxes.senders.clear();
                info!(lanes = self.lanes.len(), "executor.shutdown.signalled");
            }
        }
        let mut workers = self.workers.lock();
        if workers.is_empty() {
            return;
        }
        for (index, handle) in workers.drain(..).enumerate() {
            if handle.join().is_err() {
                error!(lane = index, "executor.shutdown.worker_panicked");
            }
        }
        info!(
            outstanding_bytes = self.pending.load(Ordering::Relaxed),
            "executor.shutdown.complete"
        );
    }

    /// Whether shutdown has been signalled.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown_signal.load(Ordering::Acquire)
    }

    /// Bytes accepted but not yet processed by their lane.
    pub fn outstanding_bytes(&self) -> i64 {
        self.pending.load(Ordering::Relaxed)
    }

    /// Number of lanes.
    pub fn lane_count(&self) -> usize {
        self.opts.lane_count
    }

    /// Current state of every lane, indexed by lane.
    pub fn lane_states(&self) -> Vec<LaneState> {
        self.lanes.iter().map(|lane| lane.state()).collect()
    }

    /// Sub-batches waiting in lane mailboxes.
    pub fn queued_sub_batches(&self) -> usize {
        self.lanes.iter().map(|lane| lane.queued()).sum()
    }

    /// Options the executor was started with.
    pub fn options(&self) -> &ExecutorOptions {
        &self.opts
    }

    /// Storage collaborator the lanes write to.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl<S: MutationStore> Drop for Executor<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
