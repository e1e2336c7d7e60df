//! Replies sent by the bridge to the controller.
//!
//! Neither reply carries the usual 6-byte header:
//! - task done: the bare 2-byte type tag `5`
//! - identity: 4-byte BE length followed by the UTF-8 name

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::wire_format::{encode_identity, encode_task_done};
use crate::error::Result;

/// A reply ready to be written to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The acknowledged command and everything queued before it completed.
    TaskDone,
    /// Answer to an identity request.
    Identity(String),
}

impl Reply {
    /// Encoded bytes of this reply.
    pub fn encode(&self) -> Bytes {
        match self {
            Reply::TaskDone => Bytes::copy_from_slice(&encode_task_done()),
            Reply::Identity(name) => Bytes::from(encode_identity(name)),
        }
    }

    /// Write the reply and flush.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.encode()).await?;
        writer.flush().await?;
        Ok(())
    }
}
