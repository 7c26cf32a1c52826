//! Line codec: one JSON object per line, UTF-8, newline-delimited.

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::messages::Request;

/// Errors produced by the codec.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decodes one input line into a [`Request`].
///
/// Surrounding whitespace is ignored; the `event` discriminant is required.
pub fn decode(line: &str) -> Result<Request, ProtocolError> {
    Ok(serde_json::from_str(line.trim())?)
}

/// Encodes a message as a single compact JSON line (no trailing newline).
pub fn encode<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}

/// Writes protocol messages to the output channel, one flushed line each.
///
/// Flushing per message is what upholds the ordering guarantee: a command's
/// replies are fully on the wire before the next input line is read.
pub struct MessageWriter<W> {
    out: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Encodes `msg`, writes it as one line, and flushes.
    pub async fn write<T: Serialize>(&mut self, msg: &T) -> Result<(), ProtocolError> {
        let mut line = encode(msg)?;
        line.push('\n');
        self.out.write_all(line.as_bytes()).await?;
        self.out.flush().await?;
        Ok(())
    }
}
