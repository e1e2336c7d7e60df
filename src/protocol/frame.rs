//! Frame struct with typed accessors.
//!
//! Represents one complete inbound frame: header plus its `length` payload
//! bytes. Bulk sample arrays that follow a buffered header are not part of
//! the frame; they are received separately (see [`super::bulk`]).
//!
//! # Example
//!
//! ```
//! use daq_bridge::protocol::{tags, Frame, Header, MessageType};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(Header::new(5, tags::LOG), Bytes::from_static(b"hello"));
//!
//! assert_eq!(frame.message_type(), MessageType::Log);
//! assert_eq!(frame.text(), "hello");
//! ```

use std::borrow::Cow;

use bytes::Bytes;

use super::wire_format::{Header, MessageType, HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Get the raw type tag.
    #[inline]
    pub fn type_tag(&self) -> i16 {
        self.header.type_tag
    }

    /// Get the message kind.
    #[inline]
    pub fn message_type(&self) -> MessageType {
        self.header.message_type()
    }

    /// Payload as text, invalid UTF-8 replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Build a complete frame as a single byte vector.
///
/// This is what the remote controller puts on the wire; the bridge itself
/// only sends the bare replies in [`super::reply`].
///
/// ```
/// use daq_bridge::protocol::{build_frame, tags, HEADER_SIZE};
///
/// let bytes = build_frame(tags::LOG, b"hi");
/// assert_eq!(bytes.len(), HEADER_SIZE + 2);
/// assert_eq!(&bytes[..HEADER_SIZE], &[0, 0, 0, 2, 0, 0]);
/// ```
pub fn build_frame(type_tag: i16, payload: &[u8]) -> Vec<u8> {
    let header = Header::new(payload.len() as u32, type_tag);
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::tags;

    #[test]
    fn test_frame_creation() {
        let frame = Frame::new(
            Header::new(5, tags::MANUAL),
            Bytes::from_static(b"{'a':1}"),
        );

        assert_eq!(frame.type_tag(), tags::MANUAL);
        assert_eq!(frame.message_type(), MessageType::Manual);
        assert_eq!(frame.payload(), b"{'a':1}");
        assert_eq!(frame.payload_len(), 7);
    }

    #[test]
    fn test_frame_empty_payload() {
        let frame = Frame::new(Header::new(0, tags::PING), Bytes::new());
        assert!(frame.payload().is_empty());
        assert_eq!(frame.text(), "");
    }

    #[test]
    fn test_text_replaces_invalid_utf8() {
        let frame = Frame::new(
            Header::new(3, tags::LOG),
            Bytes::from_static(&[b'o', 0xC3, 0x28]),
        );
        assert_eq!(frame.text(), "o\u{FFFD}(");
    }

    #[test]
    fn test_build_frame() {
        let bytes = build_frame(tags::TO_MANUAL, b"abc");

        let header = Header::decode(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(header.payload_length, 3);
        assert_eq!(header.type_tag, tags::TO_MANUAL);
        assert_eq!(&bytes[HEADER_SIZE..], b"abc");
    }

    #[test]
    fn test_build_frame_empty_payload() {
        assert_eq!(build_frame(tags::IDENTIFY, b""), vec![0, 0, 0, 0, 0, 7]);
    }
}
