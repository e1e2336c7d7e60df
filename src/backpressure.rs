//! Acknowledgment backpressure.
//!
//! The controller must not proceed to a dependent step (e.g. starting the
//! hardware clock) before the device has been programmed. Commands that
//! require a "task done" reply therefore occupy a single pending
//! acknowledgment slot; the frame-reading loop waits for the executor's
//! completion signal before replying and reading the next frame.
//!
//! # Usage
//!
//! The dispatcher acquires an [`AckGuard`] from the [`AckSlot`] before
//! enqueueing, then waits on the [`PendingAck`] returned by the executor
//! queue. The guard frees the slot on drop, including on error paths.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::error::{BridgeError, Result};

/// Completion signal for one acknowledgment-requiring command.
///
/// Resolves once the executor has finished this command. Since the queue is
/// FIFO with a single consumer, that implies every earlier command finished
/// too.
#[derive(Debug)]
pub struct PendingAck {
    seq: u64,
    rx: oneshot::Receiver<Result<()>>,
}

impl PendingAck {
    pub(crate) fn new(seq: u64, rx: oneshot::Receiver<Result<()>>) -> Self {
        Self { seq, rx }
    }

    /// Queue sequence number of the command this ack belongs to.
    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Wait until the executor has drained up to and including this command.
    ///
    /// Returns the executor's outcome for the command, or `ExecutorGone` if
    /// the executor stopped without answering.
    pub async fn wait(self) -> Result<()> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(BridgeError::ExecutorGone),
        }
    }
}

/// The single pending-acknowledgment slot of a connection.
///
/// Cheap to clone; clones share state so the owner of the bridge can observe
/// whether the loop is currently waiting on the executor.
#[derive(Debug, Clone, Default)]
pub struct AckSlot {
    pending: Arc<AtomicBool>,
    completed: Arc<AtomicU64>,
}

impl AckSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an acknowledgment is outstanding.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Number of acknowledgments completed so far.
    #[inline]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Occupy the slot.
    ///
    /// Returns `Err(AckPending)` if another acknowledgment is outstanding.
    pub fn try_acquire(&self) -> Result<AckGuard> {
        self.pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| BridgeError::AckPending)?;
        Ok(AckGuard {
            slot: self.clone(),
            released: false,
        })
    }
}

/// Guard that frees the acknowledgment slot on drop.
#[derive(Debug)]
pub struct AckGuard {
    slot: AckSlot,
    released: bool,
}

impl AckGuard {
    /// Free the slot after the reply was sent.
    pub fn complete(mut self) {
        self.slot.completed.fetch_add(1, Ordering::AcqRel);
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.slot.pending.store(false, Ordering::Release);
            self.released = true;
        }
    }
}

impl Drop for AckGuard {
    fn drop(&mut self) {
        self.release();
    }
}
