//! Codec module - decoding of structured command payloads.
//!
//! - [`parse_literal`] - safe recursive-descent parser for literal mapping text
//! - [`CommandCodec`] - typed decoding of manual and transition payloads
//!
//! # Design
//!
//! [`CommandCodec`] is a marker struct with static methods. Payloads are
//! parsed into `serde_json::Value` and then deserialized into private serde
//! structs, so field aliases and optional fields are declared rather than
//! hand-checked.
//!
//! # Example
//!
//! ```
//! use daq_bridge::codec::CommandCodec;
//!
//! let values = CommandCodec::decode_manual(b"{'ao0': 0.25, 'ao1': 1}").unwrap();
//! assert_eq!(values["ao0"], 0.25);
//! ```

mod command;
mod literal;

pub use command::{BufferedHeader, CommandCodec};
pub use literal::parse_literal;
