//! Blocking-style frame reader over an async byte stream.
//!
//! The reader never decodes a payload before all `length` bytes have arrived.
//! Short reads are retried against the remaining count, and an expired
//! socket read timeout is transient: it is logged and the read is retried.
//!
//! State machine for one frame:
//! - `WaitingForHeader`: need exactly 6 bytes
//! - `WaitingForPayload`: header parsed, need N more payload bytes
//!
//! Bulk sample arrays are pulled through [`FrameReader::read_some`] by
//! [`super::bulk::receive_bulk`].

use std::io::ErrorKind;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::frame::Frame;
use super::wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use crate::error::{BridgeError, Result};

/// Scratch size used when discarding unwanted payload bytes.
const DISCARD_CHUNK: usize = 4 * 1024;

/// Reads headers and payloads from one connection.
pub struct FrameReader<R> {
    reader: R,
    read_timeout: Option<Duration>,
    max_payload_size: u32,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a reader without a read timeout and the default payload limit.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            read_timeout: None,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Set the socket-level read timeout (expiry is retried, never an error).
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the largest payload length that may be buffered.
    pub fn with_max_payload(mut self, max_payload_size: u32) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    /// Read exactly one 6-byte header.
    ///
    /// Fails with `ConnectionClosed` if the peer closes the stream, `Io` on
    /// any other read failure. The announced length is not checked here:
    /// payloads that are only discarded may be of any size.
    pub async fn read_header(&mut self) -> Result<Header> {
        let mut buf = [0u8; HEADER_SIZE];
        self.read_exact(&mut buf).await?;
        let header = Header::decode(&buf).ok_or_else(|| {
            BridgeError::MalformedFrame("short header".to_string())
        })?;
        tracing::debug!(
            length = header.payload_length,
            tag = header.type_tag,
            "frame header"
        );
        Ok(header)
    }

    /// Read exactly `n` payload bytes into a buffer.
    ///
    /// A length above the configured maximum is `MalformedFrame`; a huge
    /// length almost always means the stream is misaligned.
    pub async fn read_payload(&mut self, n: usize) -> Result<Bytes> {
        if n > self.max_payload_size as usize {
            return Err(BridgeError::MalformedFrame(format!(
                "payload size {} exceeds maximum {}",
                n, self.max_payload_size
            )));
        }
        let mut buf = BytesMut::zeroed(n);
        self.read_exact(&mut buf).await?;
        Ok(buf.freeze())
    }

    /// Read the payload announced by `header`.
    pub async fn read_body(&mut self, header: Header) -> Result<Frame> {
        let payload = self.read_payload(header.payload_length as usize).await?;
        Ok(Frame::new(header, payload))
    }

    /// Read and drop `n` bytes so the next header stays aligned.
    pub async fn discard(&mut self, n: usize) -> Result<()> {
        let mut scratch = [0u8; DISCARD_CHUNK];
        let mut remaining = n;
        while remaining > 0 {
            let want = remaining.min(DISCARD_CHUNK);
            self.read_exact(&mut scratch[..want]).await?;
            remaining -= want;
        }
        Ok(())
    }

    /// Fill `buf` completely.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_some(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(BridgeError::ConnectionClosed);
            }
            filled += n;
        }
        Ok(())
    }

    /// One read call; returns 0 only when the peer closed the stream.
    ///
    /// Timeouts and interrupted reads are retried here.
    pub async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let limit = self.read_timeout;
        loop {
            let outcome = match limit {
                Some(limit) => {
                    match tokio::time::timeout(limit, self.reader.read(buf)).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            tracing::debug!("read timeout");
                            continue;
                        }
                    }
                }
                None => self.reader.read(buf).await,
            };

            match outcome {
                Ok(n) => return Ok(n),
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
                    ) =>
                {
                    tracing::debug!("transient read error: {}", e);
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Err(BridgeError::ConnectionClosed)
                }
                Err(e) => return Err(BridgeError::Io(e)),
            }
        }
    }
}
