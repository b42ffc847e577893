use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Cancellable causality context attached to a mutation batch.
///
/// Cloning is cheap; all clones observe the same cancellation state. Lane
/// workers hand the context to the storage collaborator so that per-edge work
/// can stop early, but a commit already in progress always runs to completion.
#[derive(Clone, Debug)]
pub struct MutationContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
    request_id: u64,
}

/// Handle that cancels every clone of the [`MutationContext`] it was created with.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl MutationContext {
    /// Context that is never cancelled.
    pub fn background() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
            request_id: 0,
        }
    }

    /// Context paired with a handle that can cancel it.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let ctx = Self::background();
        let handle = CancelHandle {
            cancelled: Arc::clone(&ctx.cancelled),
        };
        (ctx, handle)
    }

    /// Returns a copy of the context that also expires at `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Tags the context with a caller-supplied request id used in log fields.
    pub fn with_request_id(mut self, request_id: u64) -> Self {
        self.request_id = request_id;
        self
    }

    /// Request id carried for tracing.
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Whether the context was cancelled or its deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }
}

impl Default for MutationContext {
    fn default() -> Self {
        Self::background()
    }
}

impl CancelHandle {
    /// Cancels the associated context.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}
