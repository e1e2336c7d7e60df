//! TCP connect.
//!
//! # Example
//!
//! ```ignore
//! use daq_bridge::transport::connect;
//!
//! let stream = connect("192.168.1.114:1028").await?;
//! let (reader, writer) = stream.into_split();
//! ```

use tokio::net::TcpStream;

use crate::error::Result;

/// Open a TCP connection to the controller.
///
/// Nagle is disabled: replies are two bytes long and the controller blocks
/// on them.
pub async fn connect(address: &str) -> Result<TcpStream> {
    let stream = TcpStream::connect(address).await?;
    stream.set_nodelay(true)?;
    tracing::debug!(address, "tcp connected");
    Ok(stream)
}
