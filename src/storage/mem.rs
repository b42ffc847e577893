use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use super::{ApplyError, MutationStore};
use crate::types::{
    DirectedEdge, EdgeOp, EntityId, ExecutorError, MutationContext, Result, StartTs,
};

type Key = (String, EntityId);

/// One committed version of an (attribute, entity) pair.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Version {
    /// Transaction that wrote the version.
    pub start_ts: StartTs,
    /// Whether the version sets or deletes the value.
    pub op: EdgeOp,
    /// Scalar payload.
    pub value: Bytes,
    /// Referenced entity for link edges.
    pub value_id: u64,
}

/// Staged deltas for one sub-batch.
#[derive(Debug)]
pub struct MemOverlay {
    start_ts: StartTs,
    deltas: Vec<(Key, Version)>,
    finalized: bool,
}

impl MemOverlay {
    /// Timestamp the overlay is bound to.
    pub fn start_ts(&self) -> StartTs {
        self.start_ts
    }

    /// Number of staged deltas.
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    /// Whether nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

/// Per-lane writer tracking commits not yet acknowledged as durable.
#[derive(Debug)]
pub struct MemWriter {
    id: u64,
    pending: u64,
}

impl MemWriter {
    /// Writer identifier, unique per store.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// In-memory reference implementation of [`MutationStore`].
///
/// Each (attribute, entity) key keeps its full version list in commit order,
/// which makes per-key ordering directly observable. Transient conflicts and
/// commit or durability failures can be injected to exercise lane error paths.
#[derive(Default)]
pub struct MemStore {
    data: RwLock<FxHashMap<Key, Vec<Version>>>,
    conflicts_remaining: AtomicUsize,
    conflict_every: AtomicUsize,
    commit_failures: AtomicUsize,
    wait_failures: AtomicUsize,
    applies: AtomicU64,
    retries: AtomicU64,
    commits: AtomicU64,
    durable_acks: AtomicU64,
    writers: AtomicU64,
}

impl MemStore {
    /// Creates an empty store without fault injection.
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` apply calls report [`ApplyError::Retry`].
    pub fn with_conflicts(self, count: usize) -> Self {
        self.inject_conflicts(count);
        self
    }

    /// Every `every`-th apply call reports [`ApplyError::Retry`]; zero disables.
    ///
    /// Values below two are raised to two so a retried edge always makes progress.
    pub fn with_conflict_every(self, every: usize) -> Self {
        let every = if every == 0 { 0 } else { every.max(2) };
        self.conflict_every.store(every, Ordering::Relaxed);
        self
    }

    /// Adds `count` pending conflicts at runtime.
    pub fn inject_conflicts(&self, count: usize) {
        self.conflicts_remaining.fetch_add(count, Ordering::Relaxed);
    }

    /// The next `count` commits fail with a storage error.
    pub fn fail_next_commits(&self, count: usize) {
        self.commit_failures.fetch_add(count, Ordering::Relaxed);
    }

    /// The next `count` durability waits fail with a storage error.
    pub fn fail_next_waits(&self, count: usize) {
        self.wait_failures.fetch_add(count, Ordering::Relaxed);
    }

    /// Latest visible value, `None` if never written or deleted.
    pub fn get(&self, attr: &str, entity: EntityId) -> Option<Bytes> {
        let data = self.data.read();
        let version = data.get(&(attr.to_owned(), entity))?.last()?;
        match version.op {
            EdgeOp::Set => Some(version.value.clone()),
            EdgeOp::Del => None,
        }
    }

    /// All committed versions of a key in commit order.
    pub fn versions(&self, attr: &str, entity: EntityId) -> Vec<Version> {
        self.data
            .read()
            .get(&(attr.to_owned(), entity))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of distinct keys with at least one version.
    pub fn key_count(&self) -> usize {
        self.data.read().len()
    }

    /// Apply attempts, including retried ones.
    pub fn apply_attempts(&self) -> u64 {
        self.applies.load(Ordering::Relaxed)
    }

    /// Apply attempts answered with [`ApplyError::Retry`].
    pub fn retries_signalled(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Successfully committed overlays.
    pub fn committed_overlays(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Commits acknowledged as durable.
    pub fn durable_acks(&self) -> u64 {
        self.durable_acks.load(Ordering::Relaxed)
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }

    fn should_conflict(&self, attempt: u64) -> bool {
        if Self::take_one(&self.conflicts_remaining) {
            return true;
        }
        let every = self.conflict_every.load(Ordering::Relaxed) as u64;
        every != 0 && attempt % every == 0
    }
}

impl MutationStore for MemStore {
    type Overlay = MemOverlay;
    type Writer = MemWriter;

    fn new_writer(&self) -> MemWriter {
        MemWriter {
            id: self.writers.fetch_add(1, Ordering::Relaxed),
            pending: 0,
        }
    }

    fn begin_overlay(&self, start_ts: StartTs) -> MemOverlay {
        MemOverlay {
            start_ts,
            deltas: Vec::new(),
            finalized: false,
        }
    }

    fn apply_edge(
        &self,
        ctx: &MutationContext,
        edge: &DirectedEdge,
        overlay: &mut MemOverlay,
    ) -> std::result::Result<(), ApplyError> {
        let attempt = self.applies.fetch_add(1, Ordering::Relaxed) + 1;
        if edge.attr.is_empty() {
            return Err(ExecutorError::Invalid("edge attribute is empty").into());
        }
        if ctx.is_cancelled() {
            return Err(ExecutorError::Cancelled.into());
        }
        if self.should_conflict(attempt) {
            self.retries.fetch_add(1, Ordering::Relaxed);
            return Err(ApplyError::Retry);
        }
        overlay.deltas.push((
            (edge.attr.clone(), edge.entity),
            Version {
                start_ts: overlay.start_ts,
                op: edge.op,
                value: edge.value.clone(),
                value_id: edge.value_id,
            },
        ));
        Ok(())
    }

    fn finalize(&self, overlay: &mut MemOverlay) {
        let mut seen = FxHashSet::default();
        let mut collapsed = Vec::with_capacity(overlay.deltas.len());
        for (key, version) in overlay.deltas.drain(..).rev() {
            if seen.insert(key.clone()) {
                collapsed.push((key, version));
            }
        }
        collapsed.reverse();
        overlay.deltas = collapsed;
        overlay.finalized = true;
    }

    fn commit(&self, writer: &mut MemWriter, overlay: MemOverlay, start_ts: StartTs) -> Result<()> {
        if !overlay.finalized {
            return Err(ExecutorError::Invalid("overlay committed before finalize"));
        }
        if overlay.start_ts != start_ts {
            return Err(ExecutorError::InvalidOwned(format!(
                "overlay bound to ts {} committed at ts {}",
                overlay.start_ts, start_ts
            )));
        }
        if Self::take_one(&self.commit_failures) {
            return Err(ExecutorError::Storage("injected commit failure".into()));
        }
        let deltas = overlay.deltas.len();
        {
            let mut data = self.data.write();
            for (key, version) in overlay.deltas {
                data.entry(key).or_default().push(version);
            }
        }
        writer.pending += 1;
        self.commits.fetch_add(1, Ordering::Relaxed);
        trace!(writer = writer.id, start_ts = start_ts.0, deltas, "mem_store.commit");
        Ok(())
    }

    fn wait(&self, writer: &mut MemWriter) -> Result<()> {
        if Self::take_one(&self.wait_failures) {
            return Err(ExecutorError::Storage("injected durability failure".into()));
        }
        self.durable_acks.fetch_add(writer.pending, Ordering::Relaxed);
        writer.pending = 0;
        Ok(())
    }
}
