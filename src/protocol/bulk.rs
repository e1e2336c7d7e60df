//! Bulk array transfer sub-protocol.
//!
//! After a buffered-transition header with `fresh = true` the controller
//! streams a two-dimensional sample array:
//! ```text
//! ┌──────────┬──────────┬────────────────────────────────┐
//! │ Rows     │ Cols     │ rows * cols * width raw bytes  │
//! │ int32 BE │ int32 BE │ row-major, BE elements         │
//! └──────────┴──────────┴────────────────────────────────┘
//! ```
//!
//! Samples are received in bounded chunks. Partially received data is never
//! handed out: either the whole array decodes or the transfer fails.

use bytes::BytesMut;
use ndarray::Array2;
use tokio::io::AsyncRead;

use super::reader::FrameReader;
use super::wire_format::SampleType;
use crate::error::{BridgeError, Result};

/// Size of the shape prefix (rows, cols).
pub const SHAPE_SIZE: usize = 8;

/// Default number of elements requested per chunk read.
pub const DEFAULT_CHUNK_ELEMENTS: usize = 1024;

/// Row-major shape of a bulk array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    /// Number of rows (samples).
    pub rows: usize,
    /// Number of columns (channels).
    pub cols: usize,
}

impl Shape {
    /// Create a shape.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Decode the 8-byte shape prefix.
    pub fn decode(buf: &[u8; SHAPE_SIZE]) -> Result<Self> {
        let rows = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let cols = i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if rows < 0 || cols < 0 {
            return Err(BridgeError::MalformedFrame(format!(
                "negative bulk shape {}x{}",
                rows, cols
            )));
        }
        Ok(Self::new(rows as usize, cols as usize))
    }

    /// Encode the 8-byte shape prefix.
    pub fn encode(&self) -> [u8; SHAPE_SIZE] {
        let mut buf = [0u8; SHAPE_SIZE];
        buf[0..4].copy_from_slice(&(self.rows as u32).to_be_bytes());
        buf[4..8].copy_from_slice(&(self.cols as u32).to_be_bytes());
        buf
    }

    /// Number of elements, `None` on overflow.
    pub fn element_count(&self) -> Option<usize> {
        self.rows.checked_mul(self.cols)
    }

    /// Whether the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Total bytes on the wire for the given element type.
    pub fn byte_len(&self, sample_type: SampleType) -> Result<usize> {
        self.element_count()
            .and_then(|n| n.checked_mul(sample_type.width()))
            .ok_or_else(|| {
                BridgeError::MalformedFrame(format!(
                    "bulk shape {}x{} overflows",
                    self.rows, self.cols
                ))
            })
    }
}

/// A decoded bulk sample array.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleArray {
    /// Analog samples.
    Float32(Array2<f32>),
    /// Digital samples.
    UInt8(Array2<u8>),
}

impl SampleArray {
    /// Reinterpret raw big-endian bytes as a `rows x cols` array.
    ///
    /// `bytes` must hold exactly `shape.byte_len(sample_type)` bytes.
    pub fn from_be_bytes(sample_type: SampleType, shape: Shape, bytes: &[u8]) -> Result<Self> {
        let expected = shape.byte_len(sample_type)?;
        if bytes.len() != expected {
            return Err(BridgeError::IncompleteBulkTransfer {
                expected,
                received: bytes.len(),
            });
        }
        let dims = (shape.rows, shape.cols);
        let array = match sample_type {
            SampleType::Float32 => {
                let values: Vec<f32> = bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                Array2::from_shape_vec(dims, values).map(SampleArray::Float32)
            }
            SampleType::UInt8 => {
                Array2::from_shape_vec(dims, bytes.to_vec()).map(SampleArray::UInt8)
            }
        };
        array.map_err(|e| BridgeError::MalformedFrame(format!("bulk shape: {}", e)))
    }

    /// Element type of this array.
    pub fn sample_type(&self) -> SampleType {
        match self {
            SampleArray::Float32(_) => SampleType::Float32,
            SampleArray::UInt8(_) => SampleType::UInt8,
        }
    }

    /// Row-major shape.
    pub fn shape(&self) -> Shape {
        let (rows, cols) = match self {
            SampleArray::Float32(a) => a.dim(),
            SampleArray::UInt8(a) => a.dim(),
        };
        Shape::new(rows, cols)
    }

    /// Number of samples per channel (rows).
    pub fn samples(&self) -> usize {
        self.shape().rows
    }

    /// Encode as it appears on the wire: shape prefix followed by samples.
    pub fn to_wire(&self) -> Vec<u8> {
        let shape = self.shape();
        let body = shape.byte_len(self.sample_type()).unwrap_or(0);
        let mut buf = Vec::with_capacity(SHAPE_SIZE + body);
        buf.extend_from_slice(&shape.encode());
        match self {
            SampleArray::Float32(a) => {
                for v in a.iter() {
                    buf.extend_from_slice(&v.to_be_bytes());
                }
            }
            SampleArray::UInt8(a) => buf.extend(a.iter().copied()),
        }
        buf
    }
}

/// Receive the shape prefix and the sample bytes, then decode.
///
/// Reads at most `chunk_elements` elements per read call and retries short
/// reads against the remaining count. A shape whose byte size exceeds
/// `max_bytes` is rejected before anything else is read.
pub async fn receive_bulk<R>(
    reader: &mut FrameReader<R>,
    sample_type: SampleType,
    chunk_elements: usize,
    max_bytes: usize,
) -> Result<SampleArray>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; SHAPE_SIZE];
    reader
        .read_exact(&mut prefix)
        .await
        .map_err(|e| match e {
            BridgeError::ConnectionClosed => BridgeError::IncompleteBulkTransfer {
                expected: SHAPE_SIZE,
                received: 0,
            },
            other => other,
        })?;
    let shape = Shape::decode(&prefix)?;

    let to_receive = shape.byte_len(sample_type)?;
    if to_receive > max_bytes {
        return Err(BridgeError::MalformedFrame(format!(
            "bulk array of {} bytes exceeds maximum {}",
            to_receive, max_bytes
        )));
    }

    let chunk_bytes = chunk_elements.max(1) * sample_type.width();
    let mut data = BytesMut::zeroed(to_receive);
    let mut received = 0;
    while received < to_receive {
        let end = (received + chunk_bytes).min(to_receive);
        let n = reader.read_some(&mut data[received..end]).await?;
        if n == 0 {
            return Err(BridgeError::IncompleteBulkTransfer {
                expected: to_receive,
                received,
            });
        }
        received += n;
    }

    tracing::debug!(
        rows = shape.rows,
        cols = shape.cols,
        bytes = to_receive,
        "bulk array received"
    );
    SampleArray::from_be_bytes(sample_type, shape, &data)
}
