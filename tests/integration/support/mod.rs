#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use sombra_executor::{
    ApplyError, DirectedEdge, EntityId, ExecutorError, MutationContext, MutationStore, Result,
    StartTs,
};

/// One edge as observed by `apply_edge`, in call order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Applied {
    pub start_ts: StartTs,
    pub entity: EntityId,
    pub attr: String,
    pub value: Bytes,
}

#[derive(Default)]
pub struct LedgerOverlay {
    start_ts: StartTs,
    edges: Vec<Applied>,
}

/// Store that records every apply and commit and can inject faults by attribute.
#[derive(Default)]
pub struct LedgerStore {
    commit_delay: Duration,
    fatal_attr: Option<String>,
    panic_attr: Option<String>,
    stuck_attr: Option<String>,
    retries_before_success: AtomicUsize,
    applies: Mutex<Vec<Applied>>,
    commits: Mutex<Vec<(StartTs, Vec<Applied>)>>,
    waits: AtomicUsize,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit_delay(mut self, delay: Duration) -> Self {
        self.commit_delay = delay;
        self
    }

    pub fn fatal_on(mut self, attr: &str) -> Self {
        self.fatal_attr = Some(attr.to_owned());
        self
    }

    pub fn panic_on(mut self, attr: &str) -> Self {
        self.panic_attr = Some(attr.to_owned());
        self
    }

    /// Edges with this attribute report `Retry` on every attempt.
    pub fn stuck_on(mut self, attr: &str) -> Self {
        self.stuck_attr = Some(attr.to_owned());
        self
    }

    pub fn retries_before_success(self, count: usize) -> Self {
        self.retries_before_success.store(count, Ordering::Relaxed);
        self
    }

    pub fn applies(&self) -> Vec<Applied> {
        self.applies.lock().clone()
    }

    pub fn commits(&self) -> Vec<(StartTs, Vec<Applied>)> {
        self.commits.lock().clone()
    }

    pub fn committed_timestamps(&self) -> Vec<StartTs> {
        self.commits.lock().iter().map(|(ts, _)| *ts).collect()
    }

    pub fn committed_edges(&self) -> usize {
        self.commits.lock().iter().map(|(_, edges)| edges.len()).sum()
    }

    pub fn waits(&self) -> usize {
        self.waits.load(Ordering::Relaxed)
    }

    /// Values applied for one key, in apply order.
    pub fn values_for(&self, entity: u64, attr: &str) -> Vec<Bytes> {
        self.applies
            .lock()
            .iter()
            .filter(|a| a.entity == EntityId(entity) && a.attr == attr)
            .map(|a| a.value.clone())
            .collect()
    }
}

impl MutationStore for LedgerStore {
    type Overlay = LedgerOverlay;
    type Writer = ();

    fn new_writer(&self) {}

    fn begin_overlay(&self, start_ts: StartTs) -> LedgerOverlay {
        LedgerOverlay {
            start_ts,
            edges: Vec::new(),
        }
    }

    fn apply_edge(
        &self,
        _ctx: &MutationContext,
        edge: &DirectedEdge,
        overlay: &mut LedgerOverlay,
    ) -> std::result::Result<(), ApplyError> {
        if self.stuck_attr.as_deref() == Some(edge.attr.as_str()) {
            return Err(ApplyError::Retry);
        }
        if self.panic_attr.as_deref() == Some(edge.attr.as_str()) {
            panic!("injected panic for {}", edge.attr);
        }
        if self.fatal_attr.as_deref() == Some(edge.attr.as_str()) {
            return Err(ExecutorError::Storage(format!("rejected {}", edge.attr)).into());
        }
        if self
            .retries_before_success
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ApplyError::Retry);
        }
        let applied = Applied {
            start_ts: overlay.start_ts,
            entity: edge.entity,
            attr: edge.attr.clone(),
            value: edge.value.clone(),
        };
        self.applies.lock().push(applied.clone());
        overlay.edges.push(applied);
        Ok(())
    }

    fn finalize(&self, _overlay: &mut LedgerOverlay) {}

    fn commit(&self, _writer: &mut (), overlay: LedgerOverlay, start_ts: StartTs) -> Result<()> {
        if !self.commit_delay.is_zero() {
            thread::sleep(self.commit_delay);
        }
        self.commits.lock().push((start_ts, overlay.edges));
        Ok(())
    }

    fn wait(&self, _writer: &mut ()) -> Result<()> {
        self.waits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Edge whose `size()` is exactly `size` bytes (minimum 26).
pub fn sized_edge(entity: u64, attr: &str, size: usize) -> DirectedEdge {
    let overhead = attr.len() + 8 + 8 + 1;
    let value = vec![0xAB; size.saturating_sub(overhead)];
    DirectedEdge::set(entity, attr, value)
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
