//! Executor interface and the queue that feeds it.
//!
//! The executor (the code that actually programs a device) is supplied by the
//! caller through the [`Executor`] trait. It runs on its own blocking thread
//! and consumes commands in strict FIFO order:
//!
//! ```text
//! frame loop ─► ExecutorHandle ─► mpsc (bounded) ─► executor thread
//!      ▲                                                  │
//!      └──────────── oneshot completion ◄─────────────────┘
//! ```
//!
//! Manual commands are fire-and-forget. Transitions carry a completion
//! sender; the frame loop waits on the matching [`PendingAck`].

mod simulated;

pub use simulated::{DeviceKind, ProgrammedBuffer, SimulatedDevice};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::backpressure::PendingAck;
use crate::command::{BufferedProgram, Command, ManualValues};
use crate::error::{BridgeError, Result};

/// Default capacity of the executor queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Something that can physically carry out commands.
///
/// `execute` runs on a dedicated blocking thread and may take as long as the
/// hardware needs. Errors are reported back to the frame loop (and logged)
/// but never stop the queue.
pub trait Executor: Send + 'static {
    /// Carry out one command.
    fn execute(&mut self, command: Command) -> Result<()>;

    /// Release hardware resources once the queue has been closed.
    fn shutdown(&mut self) {}
}

/// A command travelling through the queue.
#[derive(Debug)]
struct QueuedCommand {
    seq: u64,
    command: Command,
    done: Option<oneshot::Sender<Result<()>>>,
}

/// Producer side of the executor queue.
///
/// Only the frame-reading loop enqueues, so this handle is deliberately not
/// `Clone`.
#[derive(Debug)]
pub struct ExecutorHandle {
    tx: mpsc::Sender<QueuedCommand>,
    next_seq: u64,
}

impl ExecutorHandle {
    /// Enqueue a manual program and return immediately.
    pub async fn enqueue_manual(&mut self, values: ManualValues) -> Result<()> {
        self.push(Command::Manual(values), None).await
    }

    /// Enqueue a buffered transition; the returned ack resolves on drain.
    pub async fn enqueue_transition_to_buffered(
        &mut self,
        program: BufferedProgram,
    ) -> Result<PendingAck> {
        self.enqueue_with_ack(Command::TransitionToBuffered(program))
            .await
    }

    /// Enqueue a transition to manual; the returned ack resolves on drain.
    pub async fn enqueue_transition_to_manual(
        &mut self,
        more_reps: bool,
        abort: bool,
    ) -> Result<PendingAck> {
        self.enqueue_with_ack(Command::TransitionToManual { more_reps, abort })
            .await
    }

    async fn enqueue_with_ack(&mut self, command: Command) -> Result<PendingAck> {
        let (done_tx, done_rx) = oneshot::channel();
        let seq = self.next_seq;
        self.push(command, Some(done_tx)).await?;
        Ok(PendingAck::new(seq, done_rx))
    }

    /// Number of commands enqueued so far.
    pub fn enqueued(&self) -> u64 {
        self.next_seq
    }

    async fn push(
        &mut self,
        command: Command,
        done: Option<oneshot::Sender<Result<()>>>,
    ) -> Result<()> {
        let seq = self.next_seq;
        tracing::debug!(seq, kind = command.kind(), ack = command.requires_ack(), "enqueue");
        self.tx
            .send(QueuedCommand { seq, command, done })
            .await
            .map_err(|_| BridgeError::ExecutorGone)?;
        self.next_seq += 1;
        Ok(())
    }
}

/// Spawn the executor on a blocking thread.
///
/// The thread exits once every [`ExecutorHandle`] is dropped and the queue
/// is drained; the join handle yields the executor back after `shutdown`.
pub fn spawn_executor<E: Executor>(
    mut executor: E,
    capacity: usize,
) -> (ExecutorHandle, JoinHandle<E>) {
    let (tx, mut rx) = mpsc::channel::<QueuedCommand>(capacity.max(1));

    let task = tokio::task::spawn_blocking(move || {
        while let Some(item) = rx.blocking_recv() {
            let kind = item.command.kind();
            let outcome = executor.execute(item.command);
            match &outcome {
                Ok(()) => tracing::debug!(seq = item.seq, kind, "executed"),
                Err(e) => tracing::warn!(seq = item.seq, kind, "executor failed: {}", e),
            }
            if let Some(done) = item.done {
                let _ = done.send(outcome);
            }
        }
        executor.shutdown();
        executor
    });

    (ExecutorHandle { tx, next_seq: 0 }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records commands and optionally sleeps to simulate slow hardware.
    struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
        delay: Duration,
        fail_replay: bool,
    }

    impl Executor for Recorder {
        fn execute(&mut self, command: Command) -> Result<()> {
            std::thread::sleep(self.delay);
            let entry = match &command {
                Command::Manual(values) => format!("manual:{}", values.len()),
                Command::TransitionToBuffered(p) => format!("buffered:{}", p.is_fresh()),
                Command::TransitionToManual { abort, .. } => format!("to_manual:{}", abort),
            };
            self.log.lock().unwrap().push(entry);
            if self.fail_replay && command == Command::TransitionToBuffered(BufferedProgram::Replay)
            {
                return Err(BridgeError::Executor("cannot rerun task".into()));
            }
            Ok(())
        }
    }

    fn recorder(delay: Duration, fail_replay: bool) -> (Recorder, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (
            Recorder {
                log: log.clone(),
                delay,
                fail_replay,
            },
            log,
        )
    }

    #[tokio::test]
    async fn test_fifo_and_drain() {
        let (exec, log) = recorder(Duration::from_millis(5), false);
        let (mut handle, task) = spawn_executor(exec, 4);

        let mut values = ManualValues::new();
        values.insert("ao0".into(), 1.0);
        handle.enqueue_manual(values.clone()).await.unwrap();
        handle.enqueue_manual(values).await.unwrap();
        let ack = handle
            .enqueue_transition_to_manual(false, true)
            .await
            .unwrap();
        assert_eq!(ack.seq(), 2);

        ack.wait().await.unwrap();
        // drain covers everything enqueued before the ack
        assert_eq!(
            *log.lock().unwrap(),
            vec!["manual:1", "manual:1", "to_manual:true"]
        );

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_is_reported_through_ack() {
        let (exec, _log) = recorder(Duration::ZERO, true);
        let (mut handle, _task) = spawn_executor(exec, 4);

        let ack = handle
            .enqueue_transition_to_buffered(BufferedProgram::Replay)
            .await
            .unwrap();
        assert!(matches!(ack.wait().await, Err(BridgeError::Executor(_))));

        // queue keeps running after a failure
        let ack = handle
            .enqueue_transition_to_manual(true, false)
            .await
            .unwrap();
        assert!(ack.wait().await.is_ok());
        assert_eq!(handle.enqueued(), 2);
    }

    #[tokio::test]
    async fn test_executor_returned_on_shutdown() {
        let (exec, _log) = recorder(Duration::ZERO, false);
        let (handle, task) = spawn_executor(exec, 1);
        drop(handle);
        let exec = task.await.unwrap();
        assert!(exec.log.lock().unwrap().is_empty());
    }
}
