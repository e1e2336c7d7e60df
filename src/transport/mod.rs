//! Transport module - TCP socket handling.
//!
//! The controller is always the listening side; the bridge dials out and
//! redials the same address after a disconnect.

mod tcp;

pub use tcp::connect;
