//! Command loop for the git-lfs custom transfer channel.
//!
//! Reads one command per input line, resolves it fully (all progress plus
//! the terminal message, each flushed) before reading the next line, and
//! never interleaves two transfers on the output stream.

mod engine;

pub use engine::{Engine, UNKNOWN_OID};

use drivelfs_protocol::ProtocolError;

/// Errors that end an engine run abnormally.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol failure: {0}")]
    Protocol(#[from] ProtocolError),
}
