//! Bridge builder and frame loop.
//!
//! The [`BridgeBuilder`] provides a fluent API for configuring the bridge.
//! The [`Bridge`] manages the lifecycle:
//! 1. Connect to the controller
//! 2. Spawn the executor thread and the frame loop (once)
//! 3. Read frames and dispatch commands
//! 4. On socket loss, reconnect to the same address while allowed
//!
//! # Example
//!
//! ```ignore
//! use daq_bridge::{BridgeBuilder, DeviceKind, SimulatedDevice};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut bridge = BridgeBuilder::new()
//!         .identity("Dev1")
//!         .reconnect(true)
//!         .build(SimulatedDevice::new("Dev1", DeviceKind::Analog6713))?;
//!
//!     bridge.connect("192.168.1.114:1028").await?;
//!     let device = bridge.wait_for_shutdown().await?;
//!     println!("{} commands executed", device.history().len());
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backpressure::AckSlot;
use crate::codec::{BufferedHeader, CommandCodec};
use crate::command::{BufferedProgram, Command};
use crate::config::{BridgeConfig, ReconnectBackoff};
use crate::connection::{Connection, ConnectionState};
use crate::dispatcher::Dispatcher;
use crate::error::{BridgeError, Result};
use crate::executor::{spawn_executor, Executor};
use crate::protocol::{receive_bulk, FrameReader, Header, MessageType, Reply};
use crate::transport;

/// Builder for configuring and creating a bridge.
pub struct BridgeBuilder {
    config: BridgeConfig,
}

impl BridgeBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: BridgeConfig::default(),
        }
    }

    /// Replace all settings, e.g. with a loaded config file.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Name sent in reply to identity requests.
    ///
    /// Default: "Dev1"
    pub fn identity(mut self, name: impl Into<String>) -> Self {
        self.config.identity = name.into();
        self
    }

    /// Socket read timeout. Expiry is retried, never an error.
    ///
    /// Default: 5 seconds
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.read_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    /// Whether to reconnect after losing the socket.
    ///
    /// Default: true
    pub fn reconnect(mut self, enabled: bool) -> Self {
        self.config.reconnect = enabled;
        self
    }

    /// Delay between reconnect attempts.
    ///
    /// Default: none (immediate retry)
    pub fn reconnect_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.config.reconnect_backoff = ReconnectBackoff::new(initial, max);
        self
    }

    /// Capacity of the executor queue.
    ///
    /// Default: 64
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Largest accepted frame payload in bytes.
    ///
    /// Default: 16 MiB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Elements read per bulk chunk.
    ///
    /// Default: 1024
    pub fn bulk_chunk_elements(mut self, elements: usize) -> Self {
        self.config.bulk_chunk_elements = elements;
        self
    }

    /// Validate the settings and create the bridge around `executor`.
    ///
    /// Nothing is connected or spawned until [`Bridge::connect`].
    pub fn build<E: Executor>(self, executor: E) -> Result<Bridge<E>> {
        self.config.validate()?;
        Ok(Bridge::new(self.config, executor))
    }
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle that closes the bridge from another task.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    connection: Arc<Connection>,
}

impl CloseHandle {
    /// Same as [`Bridge::close`].
    pub fn close(&self) {
        close_connection(&self.connection);
    }
}

fn close_connection(connection: &Connection) {
    if connection.close() {
        tracing::info!("closing connection");
    }
}

/// A bridge to one remote controller.
pub struct Bridge<E: Executor> {
    config: Arc<BridgeConfig>,
    connection: Arc<Connection>,
    ack_slot: AckSlot,
    /// Held until the frame loop takes it over.
    executor: Option<E>,
    task: Option<JoinHandle<Result<E>>>,
}

impl<E: Executor> Bridge<E> {
    fn new(config: BridgeConfig, executor: E) -> Self {
        let connection = Arc::new(Connection::new(config.reconnect));
        Self {
            config: Arc::new(config),
            connection,
            ack_slot: AckSlot::new(),
            executor: Some(executor),
            task: None,
        }
    }

    /// Active settings.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Connect to `address` (`host:port`) and start the frame loop.
    ///
    /// On failure the bridge stays `Disconnected` and the call may be
    /// retried. Once the loop runs it handles reconnects itself, so further
    /// calls fail with `InvalidState`.
    pub async fn connect(&mut self, address: impl Into<String>) -> Result<()> {
        let address = address.into();
        if self.task.is_some() {
            return Err(BridgeError::InvalidState(
                "frame loop already started".to_string(),
            ));
        }
        self.connection.transition(ConnectionState::Connecting)?;

        let stream = match transport::connect(&address).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(%address, "connect failed: {}", e);
                // close() may have moved us to Closing meanwhile
                let _ = self.connection.transition(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        self.connection.transition(ConnectionState::Connected)?;
        tracing::info!(%address, "connected");

        let executor = self.executor.take().ok_or_else(|| {
            BridgeError::InvalidState("executor already handed over".to_string())
        })?;
        let (handle, executor_task) = spawn_executor(executor, self.config.queue_capacity);
        let frame_loop = FrameLoop {
            address,
            config: self.config.clone(),
            connection: self.connection.clone(),
            dispatcher: Dispatcher::new(handle, self.ack_slot.clone()),
        };
        self.task = Some(tokio::spawn(frame_loop.run(stream, executor_task)));
        Ok(())
    }

    /// Disable reconnect and stop the frame loop.
    ///
    /// Takes effect at the next frame boundary; an outstanding
    /// acknowledgment wait or a partially read frame completes first.
    pub fn close(&self) {
        close_connection(&self.connection);
    }

    /// Handle for closing from another task.
    pub fn closer(&self) -> CloseHandle {
        CloseHandle {
            connection: self.connection.clone(),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Receiver following the connection state.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    /// Whether reconnects are still allowed.
    pub fn reconnect_allowed(&self) -> bool {
        self.connection.reconnect_allowed()
    }

    /// Whether the frame loop is waiting for the executor to drain.
    pub fn is_ack_pending(&self) -> bool {
        self.ack_slot.is_pending()
    }

    /// Number of "task done" replies sent.
    pub fn acks_completed(&self) -> u64 {
        self.ack_slot.completed()
    }

    /// Number of socket sessions the frame loop has served.
    pub fn sessions(&self) -> u64 {
        self.connection.sessions()
    }

    /// Whether the frame loop is running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    /// Wait until the frame loop ends, then return the executor.
    ///
    /// If the bridge never connected, returns immediately.
    pub async fn wait_for_shutdown(mut self) -> Result<E> {
        match self.task.take() {
            Some(task) => task.await.map_err(|e| {
                BridgeError::InvalidState(format!("frame loop task failed: {}", e))
            })?,
            None => self.executor.take().ok_or_else(|| {
                BridgeError::InvalidState("executor already handed over".to_string())
            }),
        }
    }

    /// Close and wait for the frame loop to end.
    pub async fn shutdown(self) -> Result<E> {
        self.close();
        self.wait_for_shutdown().await
    }
}

/// State owned by the frame-reading task.
struct FrameLoop {
    address: String,
    config: Arc<BridgeConfig>,
    connection: Arc<Connection>,
    dispatcher: Dispatcher,
}

impl FrameLoop {
    /// Drive sessions until closed, then stop the executor and return it.
    async fn run<E: Executor>(
        mut self,
        first: TcpStream,
        executor_task: JoinHandle<E>,
    ) -> Result<E> {
        if let Err(e) = self.drive(first).await {
            tracing::error!("frame loop stopped: {}", e);
        }
        close_connection(&self.connection);

        // dropping the dispatcher closes the queue; the executor drains it
        drop(self.dispatcher);
        executor_task.await.map_err(|_| BridgeError::ExecutorGone)
    }

    /// Session and reconnect loop. `Ok` means a clean stop.
    async fn drive(&mut self, first: TcpStream) -> Result<()> {
        let mut shutdown = self.connection.shutdown_signal();
        let mut next = Some(first);
        let mut attempt: u32 = 0;

        loop {
            if let Some(stream) = next.take() {
                let session = self.connection.begin_session();
                match self.run_session(stream, session, &mut shutdown).await {
                    Ok(()) => return Ok(()),
                    Err(BridgeError::MalformedFrame(msg)) => {
                        tracing::warn!(session, "malformed frame, dropping connection: {}", msg);
                    }
                    Err(e) if e.is_transient() => {
                        tracing::info!(session, "connection lost: {}", e);
                    }
                    Err(e) => return Err(e),
                }
                if self
                    .connection
                    .transition(ConnectionState::Disconnected)
                    .is_err()
                {
                    return Ok(());
                }
            }

            if !self.connection.reconnect_allowed() {
                tracing::info!("reconnect disabled, not reconnecting");
                return Ok(());
            }

            let delay = self.config.reconnect_backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    biased;
                    _ = shutdown.wait_for(|closed| *closed) => return Ok(()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            if self
                .connection
                .transition(ConnectionState::Connecting)
                .is_err()
            {
                return Ok(());
            }
            tracing::info!(address = %self.address, attempt, "reconnecting");

            let connected = tokio::select! {
                biased;
                _ = shutdown.wait_for(|closed| *closed) => return Ok(()),
                result = transport::connect(&self.address) => result,
            };
            match connected {
                Ok(stream) => {
                    if self
                        .connection
                        .transition(ConnectionState::Connected)
                        .is_err()
                    {
                        return Ok(());
                    }
                    tracing::info!(address = %self.address, "reconnected");
                    attempt = 0;
                    next = Some(stream);
                }
                Err(e) => {
                    tracing::warn!(address = %self.address, "reconnect failed: {}", e);
                    if self
                        .connection
                        .transition(ConnectionState::Disconnected)
                        .is_err()
                    {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Read and handle frames on one socket until it fails or close is requested.
    async fn run_session(
        &mut self,
        stream: TcpStream,
        session: u64,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half)
            .with_read_timeout(self.config.read_timeout())
            .with_max_payload(self.config.max_payload_size);

        loop {
            let header = tokio::select! {
                biased;
                _ = shutdown.wait_for(|closed| *closed) => {
                    tracing::info!(session, "socket closed on request");
                    return Ok(());
                }
                header = reader.read_header() => header?,
            };
            self.handle_frame(header, &mut reader, &mut write_half)
                .await?;
        }
    }

    /// Consume one frame's payload and act on it.
    ///
    /// A command reaches the executor only after its payload, including any
    /// bulk array, has been read and decoded completely.
    async fn handle_frame<R, W>(
        &mut self,
        header: Header,
        reader: &mut FrameReader<R>,
        writer: &mut W,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let length = header.payload_length as usize;
        match header.message_type() {
            MessageType::Log => {
                let frame = reader.read_body(header).await?;
                tracing::info!("controller: {}", frame.text());
            }
            MessageType::Ping => {
                reader.discard(length).await?;
            }
            MessageType::Manual => {
                let frame = reader.read_body(header).await?;
                let values = CommandCodec::decode_manual(frame.payload())?;
                self.dispatcher
                    .dispatch(Command::Manual(values), writer)
                    .await?;
            }
            MessageType::Buffered(sample_type) => {
                let frame = reader.read_body(header).await?;
                let program = match CommandCodec::decode_buffered_header(frame.payload(), sample_type)? {
                    BufferedHeader::Replay => BufferedProgram::Replay,
                    BufferedHeader::Fresh {
                        clock_terminal,
                        channels,
                    } => {
                        let data = receive_bulk(
                            reader,
                            sample_type,
                            self.config.bulk_chunk_elements,
                            self.config.bulk_limit(),
                        )
                        .await?;
                        BufferedProgram::Fresh {
                            clock_terminal,
                            channels,
                            data,
                        }
                    }
                };
                self.dispatcher
                    .dispatch(Command::TransitionToBuffered(program), writer)
                    .await?;
            }
            MessageType::ToManual => {
                let frame = reader.read_body(header).await?;
                let (more_reps, abort) = CommandCodec::decode_to_manual(frame.payload())?;
                self.dispatcher
                    .dispatch(Command::TransitionToManual { more_reps, abort }, writer)
                    .await?;
            }
            MessageType::Identify => {
                reader.discard(length).await?;
                Reply::Identity(self.config.identity.clone())
                    .write_to(writer)
                    .await?;
                tracing::debug!(identity = %self.config.identity, "identity sent");
            }
            MessageType::Reject => {
                reader.discard(length).await?;
                self.connection.disallow_reconnect();
                tracing::warn!("controller rejected this client, reconnect disabled");
            }
            MessageType::Unknown(tag) => {
                tracing::warn!(length, tag, "unrecognized message type");
                reader.discard(length).await?;
            }
        }
        Ok(())
    }
}
