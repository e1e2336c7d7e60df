//! Protocol module - wire format, framing, bulk arrays and replies.
//!
//! This module implements the binary protocol spoken with the controller:
//! - 6-byte header encoding/decoding
//! - Frame reader that retries short reads and read timeouts
//! - Chunked bulk sample array transfer
//! - Bare replies (task done, identity)

mod bulk;
mod frame;
mod reader;
mod reply;
mod wire_format;

pub use bulk::{receive_bulk, SampleArray, Shape, DEFAULT_CHUNK_ELEMENTS, SHAPE_SIZE};
pub use frame::{build_frame, Frame};
pub use reader::FrameReader;
pub use reply::Reply;
pub use wire_format::{
    encode_identity, encode_task_done, tags, Header, MessageType, SampleType,
    DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE, TYPE_TAG_SIZE,
};
