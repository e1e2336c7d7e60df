//! Error types for daq-bridge.

use thiserror::Error;

/// Main error type for all bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Peer closed the connection (zero-byte read).
    #[error("Connection closed")]
    ConnectionClosed,

    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be decoded; frame boundaries are no longer trusted.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Connection ended before the declared bulk array was received.
    #[error("Incomplete bulk transfer: received {received} of {expected} bytes")]
    IncompleteBulkTransfer {
        /// Bytes announced by the shape header.
        expected: usize,
        /// Bytes received before the failure.
        received: usize,
    },

    /// The executor reported a failure for a command.
    #[error("Executor error: {0}")]
    Executor(String),

    /// The executor queue is closed.
    #[error("Executor is no longer running")]
    ExecutorGone,

    /// An acknowledgment is already outstanding.
    #[error("Acknowledgment already pending")]
    AckPending,

    /// Operation not allowed in the current connection state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// Whether the frame-reading loop should drop the socket and reconnect.
    ///
    /// Everything else terminates the loop.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BridgeError::ConnectionClosed
                | BridgeError::Io(_)
                | BridgeError::MalformedFrame(_)
                | BridgeError::IncompleteBulkTransfer { .. }
        )
    }
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;
