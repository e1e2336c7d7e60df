//! Wire format encoding and decoding.
//!
//! Implements the 6-byte header format:
//! ```text
//! ┌──────────┬──────────┐
//! │ Length   │ Type     │
//! │ 4 bytes  │ 2 bytes  │
//! │ uint32 BE│ int16 BE │
//! └──────────┴──────────┘
//! ```
//!
//! `Length` counts payload bytes only. All multi-byte integers are Big Endian,
//! independent of host byte order.

/// Header size in bytes (fixed, exactly 6).
pub const HEADER_SIZE: usize = 6;

/// Size of the type tag on its own (the "task done" reply is a bare tag).
pub const TYPE_TAG_SIZE: usize = 2;

/// Default maximum payload size for structured/text payloads (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Type tags used on the wire.
pub mod tags {
    /// UTF-8 text, display only.
    pub const LOG: i16 = 0;
    /// Keepalive, no action.
    pub const PING: i16 = 1;
    /// Program static output values.
    pub const MANUAL: i16 = 2;
    /// Transition to buffered with float32 samples.
    pub const BUFFERED_F32: i16 = 3;
    /// Transition to manual.
    pub const TO_MANUAL: i16 = 4;
    /// Reply: the acknowledged command has completed.
    pub const TASK_DONE: i16 = 5;
    /// Transition to buffered with uint8 samples.
    pub const BUFFERED_U8: i16 = 6;
    /// Identity request.
    pub const IDENTIFY: i16 = 7;
    /// Reject: the controller refuses this client, do not reconnect.
    pub const REJECT: i16 = 8;
}

/// Element type of a bulk sample array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    /// 32-bit IEEE float, big-endian.
    Float32,
    /// 8-bit unsigned integer.
    UInt8,
}

impl SampleType {
    /// Bytes per element on the wire.
    #[inline]
    pub fn width(self) -> usize {
        match self {
            SampleType::Float32 => 4,
            SampleType::UInt8 => 1,
        }
    }
}

/// Decoded message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Text message for display.
    Log,
    /// Keepalive.
    Ping,
    /// Manual program.
    Manual,
    /// Transition to buffered, samples of the given type.
    Buffered(SampleType),
    /// Transition to manual.
    ToManual,
    /// Identity request.
    Identify,
    /// Reject / terminate.
    Reject,
    /// Anything else, including tags only this client sends.
    Unknown(i16),
}

impl MessageType {
    /// Map a raw tag onto a message kind.
    pub fn from_tag(tag: i16) -> Self {
        match tag {
            tags::LOG => MessageType::Log,
            tags::PING => MessageType::Ping,
            tags::MANUAL => MessageType::Manual,
            tags::BUFFERED_F32 => MessageType::Buffered(SampleType::Float32),
            tags::TO_MANUAL => MessageType::ToManual,
            tags::BUFFERED_U8 => MessageType::Buffered(SampleType::UInt8),
            tags::IDENTIFY => MessageType::Identify,
            tags::REJECT => MessageType::Reject,
            other => MessageType::Unknown(other),
        }
    }

    /// The raw tag.
    pub fn tag(self) -> i16 {
        match self {
            MessageType::Log => tags::LOG,
            MessageType::Ping => tags::PING,
            MessageType::Manual => tags::MANUAL,
            MessageType::Buffered(SampleType::Float32) => tags::BUFFERED_F32,
            MessageType::ToManual => tags::TO_MANUAL,
            MessageType::Buffered(SampleType::UInt8) => tags::BUFFERED_U8,
            MessageType::Identify => tags::IDENTIFY,
            MessageType::Reject => tags::REJECT,
            MessageType::Unknown(tag) => tag,
        }
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Payload length in bytes (header excluded).
    pub payload_length: u32,
    /// Raw type tag.
    pub type_tag: i16,
}

impl Header {
    /// Create a new header.
    pub fn new(payload_length: u32, type_tag: i16) -> Self {
        Self {
            payload_length,
            type_tag,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use daq_bridge::protocol::{tags, Header};
    ///
    /// let bytes = Header::new(24, tags::BUFFERED_F32).encode();
    /// assert_eq!(bytes, [0, 0, 0, 24, 0, 3]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.payload_length.to_be_bytes());
        buf[4..6].copy_from_slice(&self.type_tag.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            payload_length: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            type_tag: i16::from_be_bytes([buf[4], buf[5]]),
        })
    }

    /// Message kind for this header's tag.
    #[inline]
    pub fn message_type(&self) -> MessageType {
        MessageType::from_tag(self.type_tag)
    }
}

/// Encode the bare "task done" reply (2-byte tag, no length).
#[inline]
pub fn encode_task_done() -> [u8; TYPE_TAG_SIZE] {
    tags::TASK_DONE.to_be_bytes()
}

/// Encode the identity reply: 4-byte BE length followed by the UTF-8 name.
///
/// ```
/// use daq_bridge::protocol::encode_identity;
///
/// assert_eq!(encode_identity("Dev1"), b"\x00\x00\x00\x04Dev1".to_vec());
/// ```
pub fn encode_identity(name: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + name.len());
    buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
    buf.extend_from_slice(name.as_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::new(1234, tags::MANUAL);
        let decoded = Header::decode(&original.encode()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let bytes = Header::new(0x0102_0304, 0x0506).encode();
        assert_eq!(bytes, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    }

    #[test]
    fn test_negative_type_tag() {
        let header = Header::decode(&[0, 0, 0, 0, 0xFF, 0xFE]).unwrap();
        assert_eq!(header.type_tag, -2);
        assert_eq!(header.message_type(), MessageType::Unknown(-2));
    }

    #[test]
    fn test_decode_too_short_buffer() {
        assert!(Header::decode(&[0u8; 5]).is_none());
    }

    #[test]
    fn test_message_type_mapping() {
        assert_eq!(MessageType::from_tag(0), MessageType::Log);
        assert_eq!(MessageType::from_tag(1), MessageType::Ping);
        assert_eq!(MessageType::from_tag(2), MessageType::Manual);
        assert_eq!(
            MessageType::from_tag(3),
            MessageType::Buffered(SampleType::Float32)
        );
        assert_eq!(MessageType::from_tag(4), MessageType::ToManual);
        // 5 is only ever sent by this client
        assert_eq!(MessageType::from_tag(5), MessageType::Unknown(5));
        assert_eq!(
            MessageType::from_tag(6),
            MessageType::Buffered(SampleType::UInt8)
        );
        assert_eq!(MessageType::from_tag(7), MessageType::Identify);
        assert_eq!(MessageType::from_tag(8), MessageType::Reject);
        assert_eq!(MessageType::from_tag(42), MessageType::Unknown(42));

        for tag in -3..12 {
            assert_eq!(MessageType::from_tag(tag).tag(), tag);
        }
    }

    #[test]
    fn test_sample_widths() {
        assert_eq!(SampleType::Float32.width(), 4);
        assert_eq!(SampleType::UInt8.width(), 1);
    }

    #[test]
    fn test_task_done_bytes() {
        assert_eq!(encode_task_done(), [0x00, 0x05]);
    }

    #[test]
    fn test_identity_bytes() {
        let bytes = encode_identity("Dev1");
        assert_eq!(&bytes[..4], &[0, 0, 0, 4]);
        assert_eq!(&bytes[4..], b"Dev1");

        assert_eq!(encode_identity(""), vec![0, 0, 0, 0]);
    }
}
