//! Command dispatch and the "task done" handshake.
//!
//! Manual programs are handed to the executor and the loop moves on.
//! Transitions occupy the single acknowledgment slot: the loop enqueues the
//! command, waits until the executor has drained up to it, writes the
//! 2-byte reply and only then reads the next frame.

use tokio::io::AsyncWrite;

use crate::backpressure::AckSlot;
use crate::command::Command;
use crate::error::{BridgeError, Result};
use crate::executor::ExecutorHandle;
use crate::protocol::Reply;

/// Routes decoded commands to the executor queue.
#[derive(Debug)]
pub struct Dispatcher {
    executor: ExecutorHandle,
    ack_slot: AckSlot,
}

impl Dispatcher {
    /// Create a dispatcher feeding `executor`.
    pub fn new(executor: ExecutorHandle, ack_slot: AckSlot) -> Self {
        Self { executor, ack_slot }
    }

    /// Shared view of the acknowledgment slot.
    pub fn ack_slot(&self) -> &AckSlot {
        &self.ack_slot
    }

    /// Dispatch one command, replying on `writer` when it requires an ack.
    ///
    /// Executor failures are logged and still answered with "task done" once
    /// drained. Queue and socket errors are returned to the caller.
    pub async fn dispatch<W>(&mut self, command: Command, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let kind = command.kind();
        let (guard, ack) = match command {
            Command::Manual(values) => return self.executor.enqueue_manual(values).await,
            Command::TransitionToBuffered(program) => {
                let guard = self.ack_slot.try_acquire()?;
                tracing::debug!(fresh = program.is_fresh(), "arming buffered run");
                let ack = self
                    .executor
                    .enqueue_transition_to_buffered(program)
                    .await?;
                (guard, ack)
            }
            Command::TransitionToManual { more_reps, abort } => {
                let guard = self.ack_slot.try_acquire()?;
                let ack = self
                    .executor
                    .enqueue_transition_to_manual(more_reps, abort)
                    .await?;
                (guard, ack)
            }
        };
        let seq = ack.seq();

        tracing::debug!(seq, kind, "waiting for executor drain");
        match ack.wait().await {
            Ok(()) => {}
            Err(BridgeError::Executor(msg)) => {
                tracing::warn!(seq, kind, "command failed, replying anyway: {}", msg);
            }
            Err(e) => return Err(e),
        }

        Reply::TaskDone.write_to(writer).await?;
        guard.complete();
        tracing::debug!(seq, kind, "task done sent");
        Ok(())
    }
}
