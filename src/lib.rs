//! # daq-bridge
//!
//! Client-side bridge between a remote experiment controller and a local
//! output device.
//!
//! The controller listens on TCP and streams typed, length-prefixed
//! commands. The bridge decodes them, hands them in order to an
//! [`Executor`] and answers transitions with a "task done" reply once the
//! executor has finished them.
//!
//! ## Architecture
//!
//! - **Frame loop** (one tokio task): reads frames, receives bulk arrays,
//!   reconnects after socket loss
//! - **Executor** (one blocking thread): consumes the command queue in FIFO
//!   order
//!
//! ## Wire format
//!
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ length   │ type     │ payload (length bytes)      │
//! │ u32 BE   │ i16 BE   │                             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! Buffered transitions with `fresh = true` are followed by
//! `[i32 rows][i32 cols][rows * cols samples]`, all big-endian.
//!
//! ## Example
//!
//! ```ignore
//! use daq_bridge::{BridgeBuilder, DeviceKind, SimulatedDevice};
//!
//! #[tokio::main]
//! async fn main() -> daq_bridge::Result<()> {
//!     let mut bridge = BridgeBuilder::new()
//!         .identity("Dev1")
//!         .build(SimulatedDevice::new("Dev1", DeviceKind::Analog6713))?;
//!
//!     bridge.connect("192.168.1.114:1028").await?;
//!     bridge.wait_for_shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod backpressure;
pub mod codec;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod protocol;
pub mod transport;

mod bridge;
mod dispatcher;

pub use bridge::{Bridge, BridgeBuilder, CloseHandle};
pub use command::{BufferedProgram, Command, ManualValues};
pub use config::{BridgeConfig, ReconnectBackoff};
pub use connection::ConnectionState;
pub use dispatcher::Dispatcher;
pub use error::{BridgeError, Result};
pub use executor::{spawn_executor, DeviceKind, Executor, ExecutorHandle, SimulatedDevice};
