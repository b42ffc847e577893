use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, warn};

use super::metrics::ExecutorMetrics;
use super::options::RetryPolicy;
use crate::storage::{ApplyError, MutationStore};
use crate::types::{DirectedEdge, ExecutorError, MutationContext, StartTs};

/// Edges of one submission routed to a single lane.
pub(crate) struct SubMutation {
    pub ctx: MutationContext,
    pub start_ts: StartTs,
    pub edges: Vec<DirectedEdge>,
    pub bytes: i64,
}

/// Lifecycle of a lane worker.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LaneState {
    /// Consuming its mailbox.
    Running = 0,
    /// Mailbox closed; finishing queued sub-batches.
    Draining = 1,
    /// Mailbox empty and closed; the worker thread has exited.
    Stopped = 2,
}

impl LaneState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LaneState::Running,
            1 => LaneState::Draining,
            _ => LaneState::Stopped,
        }
    }
}

/// Receiving end and observable state of one lane.
///
/// The mailbox closes once every sender returned by [`Lane::new`] is dropped.
pub(crate) struct Lane {
    receiver: Receiver<SubMutation>,
    state: AtomicU8,
}

impl Lane {
    pub fn new(capacity: usize) -> (Self, Sender<SubMutation>) {
        let (sender, receiver) = bounded(capacity.max(1));
        let lane = Self {
            receiver,
            state: AtomicU8::new(LaneState::Running as u8),
        };
        (lane, sender)
    }

    pub fn state(&self) -> LaneState {
        LaneState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves the lane forward; never moves it back to an earlier state.
    pub fn advance(&self, next: LaneState) {
        self.state.fetch_max(next as u8, Ordering::AcqRel);
    }

    /// Sub-batches waiting to be processed.
    pub fn queued(&self) -> usize {
        self.receiver.len()
    }
}

/// Single-threaded consumer for one lane.
pub(crate) struct LaneWorker<S: MutationStore> {
    pub index: usize,
    pub lane: Arc<Lane>,
    pub store: Arc<S>,
    pub pending: Arc<AtomicI64>,
    pub metrics: Arc<dyn ExecutorMetrics>,
    pub retry: RetryPolicy,
}

impl<S: MutationStore> LaneWorker<S> {
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("executor-lane-{}", self.index))
            .spawn(move || self.run())
    }

    fn run(self) {
        let mut writer = self.store.new_writer();
        debug!(lane = self.index, "executor.lane.start");
        for payload in self.lane.receiver.iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.process(&mut writer, &payload)
            }));
            if let Err(panic) = outcome {
                let err = ExecutorError::Storage(format!(
                    "lane panicked while committing: {}",
                    panic_message(&*panic)
                ));
                error!(
                    lane = self.index,
                    start_ts = payload.start_ts.0,
                    error = %err,
                    "executor.lane.panic"
                );
                self.notify(|metrics| metrics.commit_failed(self.index, payload.start_ts, &err));
            }
            self.pending.fetch_sub(payload.bytes, Ordering::Relaxed);
            self.notify(|metrics| metrics.sub_batch_done(self.index, payload.bytes));
        }
        self.lane.advance(LaneState::Stopped);
        debug!(lane = self.index, "executor.lane.exit");
    }

    /// Reports to the metrics sink; a panicking sink is logged and ignored.
    fn notify(&self, event: impl FnOnce(&dyn ExecutorMetrics)) {
        let metrics = &*self.metrics;
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| event(metrics))) {
            error!(
                lane = self.index,
                panic = panic_message(&*panic),
                "executor.lane.metrics_panic"
            );
        }
    }

    fn process(&self, writer: &mut S::Writer, payload: &SubMutation) {
        debug!(
            lane = self.index,
            start_ts = payload.start_ts.0,
            edges = payload.edges.len(),
            bytes = payload.bytes,
            request_id = payload.ctx.request_id(),
            "executor.lane.sub_batch"
        );
        let mut overlay = self.store.begin_overlay(payload.start_ts);
        for edge in &payload.edges {
            self.apply_with_retry(&payload.ctx, payload.start_ts, edge, &mut overlay);
        }
        self.store.finalize(&mut overlay);
        if let Err(err) = self.store.commit(writer, overlay, payload.start_ts) {
            error!(
                lane = self.index,
                start_ts = payload.start_ts.0,
                error = %err,
                "executor.lane.commit_failed"
            );
            self.metrics.commit_failed(self.index, payload.start_ts, &err);
        }
        if let Err(err) = self.store.wait(writer) {
            error!(lane = self.index, error = %err, "executor.lane.durability_failed");
            self.metrics.durability_failed(self.index, &err);
        }
    }

    fn apply_with_retry(
        &self,
        ctx: &MutationContext,
        start_ts: StartTs,
        edge: &DirectedEdge,
        overlay: &mut S::Overlay,
    ) {
        loop {
            match self.store.apply_edge(ctx, edge, overlay) {
                Ok(()) => {
                    self.metrics.edge_applied(self.index);
                    return;
                }
                Err(ApplyError::Retry) => {
                    self.metrics.edge_retried(self.index);
                    if self.retry.abort_on_cancel && ctx.is_cancelled() {
                        let err = ExecutorError::Cancelled;
                        warn!(
                            lane = self.index,
                            start_ts = start_ts.0,
                            entity = edge.entity.0,
                            attr = %edge.attr,
                            "executor.lane.retry_cancelled"
                        );
                        self.metrics.edge_failed(self.index, start_ts, &err);
                        return;
                    }
                }
                Err(ApplyError::Fatal(err)) => {
                    error!(
                        lane = self.index,
                        start_ts = start_ts.0,
                        entity = edge.entity.0,
                        attr = %edge.attr,
                        error = %err,
                        "executor.lane.edge_failed"
                    );
                    self.metrics.edge_failed(self.index, start_ts, &err);
                    return;
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
