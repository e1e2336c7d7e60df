//! Typed decoding of structured command payloads.
//!
//! Payload text is parsed with [`parse_literal`] and then mapped onto
//! serde structs. Any failure is a `MalformedFrame`.

use serde::Deserialize;
use serde_json::Value;

use super::literal::parse_literal;
use crate::command::ManualValues;
use crate::error::{BridgeError, Result};
use crate::protocol::SampleType;

/// Channel list as sent by the controller: a single channel string such as
/// `"Dev1/ao0:7"` or a list of channel strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum Channels {
    One(String),
    Many(Vec<String>),
}

impl From<Channels> for Vec<String> {
    fn from(channels: Channels) -> Self {
        match channels {
            Channels::One(s) => vec![s],
            Channels::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnalogHeader {
    fresh: bool,
    #[serde(default)]
    clock_terminal: Option<String>,
    #[serde(default, alias = "channels")]
    ao_channels: Option<Channels>,
}

#[derive(Debug, Deserialize)]
struct DigitalHeader {
    fresh: bool,
    #[serde(default)]
    clock_terminal: Option<String>,
    #[serde(default, alias = "channels")]
    do_channels: Option<Channels>,
}

#[derive(Debug, Deserialize)]
struct ToManual {
    #[serde(alias = "moreReps")]
    more_reps: bool,
    abort: bool,
}

/// Header of a buffered transition, before any bulk array is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferedHeader {
    /// Rerun the previous buffer; no bulk array follows.
    Replay,
    /// A bulk array of the frame's sample type follows.
    Fresh {
        /// Terminal providing the sample clock.
        clock_terminal: String,
        /// Output channels.
        channels: Vec<String>,
    },
}

/// Decoder for structured command payloads.
pub struct CommandCodec;

impl CommandCodec {
    /// Decode a manual program (type 2).
    ///
    /// Booleans are accepted as 1/0 (digital lines).
    pub fn decode_manual(payload: &[u8]) -> Result<ManualValues> {
        let value = Self::parse(payload)?;
        let object = match value {
            Value::Object(map) => map,
            _ => return Err(malformed("manual payload must be a mapping")),
        };

        let mut values = ManualValues::new();
        for (channel, value) in object {
            let number = match value {
                Value::Number(n) => n
                    .as_f64()
                    .ok_or_else(|| malformed(&format!("channel '{}' out of range", channel)))?,
                Value::Bool(b) => f64::from(u8::from(b)),
                other => {
                    return Err(malformed(&format!(
                        "channel '{}' has non-numeric value {}",
                        channel, other
                    )))
                }
            };
            values.insert(channel, number);
        }
        Ok(values)
    }

    /// Decode the structured header of a buffered transition (types 3 and 6).
    ///
    /// When `fresh` is true the clock terminal and channels are required.
    pub fn decode_buffered_header(
        payload: &[u8],
        sample_type: SampleType,
    ) -> Result<BufferedHeader> {
        let value = Self::parse(payload)?;
        let (fresh, clock_terminal, channels) = match sample_type {
            SampleType::Float32 => {
                let h: AnalogHeader = Self::typed(value)?;
                (h.fresh, h.clock_terminal, h.ao_channels)
            }
            SampleType::UInt8 => {
                let h: DigitalHeader = Self::typed(value)?;
                (h.fresh, h.clock_terminal, h.do_channels)
            }
        };

        if !fresh {
            return Ok(BufferedHeader::Replay);
        }
        let clock_terminal =
            clock_terminal.ok_or_else(|| malformed("fresh program without clock_terminal"))?;
        let channels: Vec<String> = channels
            .ok_or_else(|| malformed("fresh program without channels"))?
            .into();
        Ok(BufferedHeader::Fresh {
            clock_terminal,
            channels,
        })
    }

    /// Decode a transition to manual (type 4) into `(more_reps, abort)`.
    pub fn decode_to_manual(payload: &[u8]) -> Result<(bool, bool)> {
        let msg: ToManual = Self::typed(Self::parse(payload)?)?;
        Ok((msg.more_reps, msg.abort))
    }

    fn parse(payload: &[u8]) -> Result<Value> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| malformed(&format!("payload is not UTF-8: {}", e)))?;
        parse_literal(text)
    }

    fn typed<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
        serde_json::from_value(value).map_err(|e| malformed(&e.to_string()))
    }
}

fn malformed(msg: &str) -> BridgeError {
    BridgeError::MalformedFrame(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_manual() {
        let values =
            CommandCodec::decode_manual(b"{'ao0': 1.5, 'ao1': -2, 'do_0': True, 'do_1': 0}")
                .unwrap();
        assert_eq!(values["ao0"], 1.5);
        assert_eq!(values["ao1"], -2.0);
        assert_eq!(values["do_0"], 1.0);
        assert_eq!(values["do_1"], 0.0);
    }

    #[test]
    fn test_decode_manual_rejects_strings() {
        let result = CommandCodec::decode_manual(b"{'ao0': 'high'}");
        assert!(matches!(result, Err(BridgeError::MalformedFrame(_))));
    }

    #[test]
    fn test_decode_manual_rejects_non_mapping() {
        assert!(CommandCodec::decode_manual(b"[1, 2]").is_err());
        assert!(CommandCodec::decode_manual(&[0xFF, 0xFE]).is_err());
    }

    #[test]
    fn test_decode_analog_fresh_header() {
        let header = CommandCodec::decode_buffered_header(
            b"{'fresh': True, 'clock_terminal': '/Dev1/PFI0', 'ao_channels': 'Dev1/ao0:2'}",
            SampleType::Float32,
        )
        .unwrap();
        assert_eq!(
            header,
            BufferedHeader::Fresh {
                clock_terminal: "/Dev1/PFI0".to_string(),
                channels: vec!["Dev1/ao0:2".to_string()],
            }
        );
    }

    #[test]
    fn test_decode_digital_header_with_list() {
        let header = CommandCodec::decode_buffered_header(
            br#"{"fresh": true, "clock_terminal": "/Dev2/PFI2", "do_channels": ["Dev2/port0/line0", "Dev2/port0/line1"]}"#,
            SampleType::UInt8,
        )
        .unwrap();
        match header {
            BufferedHeader::Fresh { channels, .. } => assert_eq!(channels.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_channels_alias() {
        let header = CommandCodec::decode_buffered_header(
            b"{'fresh': True, 'clock_terminal': 'PFI0', 'channels': 'Dev1/ao0'}",
            SampleType::Float32,
        )
        .unwrap();
        assert!(matches!(header, BufferedHeader::Fresh { .. }));
    }

    #[test]
    fn test_decode_replay_header() {
        let header =
            CommandCodec::decode_buffered_header(b"{'fresh': False}", SampleType::UInt8).unwrap();
        assert_eq!(header, BufferedHeader::Replay);

        // optional fields are ignored when not fresh
        let header = CommandCodec::decode_buffered_header(
            b"{'fresh': False, 'clock_terminal': None, 'ao_channels': None}",
            SampleType::Float32,
        )
        .unwrap();
        assert_eq!(header, BufferedHeader::Replay);
    }

    #[test]
    fn test_fresh_header_missing_fields() {
        let result = CommandCodec::decode_buffered_header(
            b"{'fresh': True, 'clock_terminal': '/Dev1/PFI0'}",
            SampleType::Float32,
        );
        assert!(matches!(result, Err(BridgeError::MalformedFrame(_))));

        let result =
            CommandCodec::decode_buffered_header(b"{'clock_terminal': 'x'}", SampleType::UInt8);
        assert!(matches!(result, Err(BridgeError::MalformedFrame(_))));
    }

    #[test]
    fn test_decode_to_manual() {
        assert_eq!(
            CommandCodec::decode_to_manual(b"{'more_reps': True, 'abort': False}").unwrap(),
            (true, false)
        );
        assert_eq!(
            CommandCodec::decode_to_manual(br#"{"moreReps": false, "abort": true}"#).unwrap(),
            (false, true)
        );
        assert!(CommandCodec::decode_to_manual(b"{'abort': True}").is_err());
    }
}
