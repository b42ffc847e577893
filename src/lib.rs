//! Sharded mutation executor for the Sombra graph database.
//!
//! Batches of directed-edge mutations are split across a fixed set of lanes by
//! (attribute, entity), applied to per-sub-batch storage overlays and
//! committed by one worker thread per lane, while a ramp meter bounds the bytes
//! accepted but not yet committed.

#![warn(missing_docs)]

pub mod executor;
pub mod primitives;
pub mod storage;
pub mod types;

pub use executor::{
    CounterMetrics, Executor, ExecutorMetrics, ExecutorOptions, LaneState, MetricsSnapshot,
    NoopMetrics, RetryPolicy, Submission,
};
pub use storage::{ApplyError, MemStore, MutationStore};
pub use types::{
    CancelHandle, DirectedEdge, EdgeOp, EntityId, ExecutorError, MutationContext, Result, StartTs,
};
