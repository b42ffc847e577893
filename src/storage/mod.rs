//! Storage collaborator interface consumed by the executor lanes.
//!
//! The executor does not know how an edge maps onto keys and values. It only
//! drives the transaction lifecycle below: one writer per lane, one overlay per
//! sub-batch, per-edge application with a retry signal, a single commit, and a
//! durability wait.

mod mem;

use crate::types::{DirectedEdge, ExecutorError, MutationContext, Result, StartTs};

pub use mem::{MemOverlay, MemStore, MemWriter, Version};

/// Outcome of a failed [`MutationStore::apply_edge`] call.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// Transient contention; the lane retries the same edge immediately.
    #[error("retry")]
    Retry,
    /// Any other failure; the lane logs it and moves on to the next edge.
    #[error(transparent)]
    Fatal(#[from] ExecutorError),
}

/// Transactional write sink driven by the lane workers.
///
/// Every method is called from a lane thread. Calls for one lane are strictly
/// sequential; different lanes call concurrently.
pub trait MutationStore: Send + Sync + 'static {
    /// In-memory staging area for one sub-batch.
    type Overlay: Send;
    /// Per-lane handle used to push commits to durable storage.
    type Writer: Send;

    /// Creates the writer owned by one lane for its whole lifetime.
    fn new_writer(&self) -> Self::Writer;

    /// Starts a fresh overlay bound to `start_ts`.
    fn begin_overlay(&self, start_ts: StartTs) -> Self::Overlay;

    /// Applies one edge to the overlay.
    fn apply_edge(
        &self,
        ctx: &MutationContext,
        edge: &DirectedEdge,
        overlay: &mut Self::Overlay,
    ) -> std::result::Result<(), ApplyError>;

    /// Prepares accumulated changes for commit.
    fn finalize(&self, overlay: &mut Self::Overlay);

    /// Writes the overlay through `writer` tagged with `start_ts`.
    fn commit(&self, writer: &mut Self::Writer, overlay: Self::Overlay, start_ts: StartTs)
        -> Result<()>;

    /// Blocks until everything committed through `writer` is durable.
    fn wait(&self, writer: &mut Self::Writer) -> Result<()>;
}
