//! Bridge configuration.
//!
//! Durations are stored as milliseconds so the struct maps one-to-one onto
//! the JSON config file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::executor::DEFAULT_QUEUE_CAPACITY;
use crate::protocol::{DEFAULT_CHUNK_ELEMENTS, DEFAULT_MAX_PAYLOAD_SIZE};

/// Default identity reported to the controller.
pub const DEFAULT_IDENTITY: &str = "Dev1";

/// Default socket read timeout.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;

/// Multiplier applied to `max_payload_size` to bound a bulk array.
pub const BULK_LIMIT_FACTOR: usize = 64;

/// Delay between reconnect attempts: `initial` doubled per failed attempt,
/// capped at `max`. All zero means retry immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectBackoff {
    /// Delay before the first attempt, in milliseconds.
    pub initial_ms: u64,
    /// Upper bound, in milliseconds.
    pub max_ms: u64,
}

impl ReconnectBackoff {
    /// Backoff starting at `initial` and capped at `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial_ms: initial.as_millis() as u64,
            max_ms: max.as_millis() as u64,
        }
    }

    /// Delay before attempt number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(63)).unwrap_or(u64::MAX);
        let ms = self.initial_ms.saturating_mul(factor).min(self.max_ms);
        Duration::from_millis(ms)
    }
}

/// Bridge settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Name sent in reply to an identity request.
    pub identity: String,
    /// Socket read timeout; expiry is retried. `None` disables it.
    pub read_timeout_ms: Option<u64>,
    /// Reconnect after losing the socket.
    pub reconnect: bool,
    /// Delay between reconnect attempts.
    pub reconnect_backoff: ReconnectBackoff,
    /// Capacity of the executor queue.
    pub queue_capacity: usize,
    /// Largest accepted frame payload.
    pub max_payload_size: u32,
    /// Elements per bulk read.
    pub bulk_chunk_elements: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            identity: DEFAULT_IDENTITY.to_string(),
            read_timeout_ms: Some(DEFAULT_READ_TIMEOUT_MS),
            reconnect: true,
            reconnect_backoff: ReconnectBackoff::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            bulk_chunk_elements: DEFAULT_CHUNK_ELEMENTS,
        }
    }
}

impl BridgeConfig {
    /// Load and validate a JSON config file. Missing keys take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Parse and validate JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: BridgeConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.identity.is_empty() {
            return Err(BridgeError::Config("identity must not be empty".into()));
        }
        if u32::try_from(self.identity.len()).is_err() {
            return Err(BridgeError::Config("identity is too long".into()));
        }
        if self.queue_capacity == 0 {
            return Err(BridgeError::Config("queue_capacity must be > 0".into()));
        }
        if self.max_payload_size == 0 {
            return Err(BridgeError::Config("max_payload_size must be > 0".into()));
        }
        if self.bulk_chunk_elements == 0 {
            return Err(BridgeError::Config(
                "bulk_chunk_elements must be > 0".into(),
            ));
        }
        if self.read_timeout_ms == Some(0) {
            return Err(BridgeError::Config(
                "read_timeout_ms must be > 0 (use null to disable)".into(),
            ));
        }
        let backoff = &self.reconnect_backoff;
        if backoff.max_ms < backoff.initial_ms {
            return Err(BridgeError::Config(
                "reconnect_backoff.max_ms must be >= initial_ms".into(),
            ));
        }
        Ok(())
    }

    /// Read timeout as a `Duration`.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    /// Largest bulk array accepted, in bytes.
    pub fn bulk_limit(&self) -> usize {
        (self.max_payload_size as usize).saturating_mul(BULK_LIMIT_FACTOR)
    }
}
