//! Wire protocol types for the git-lfs custom transfer channel.
//!
//! git-lfs drives a custom transfer agent over its stdin/stdout with
//! newline-delimited JSON objects, one message per line. This crate owns
//! the message vocabulary, the stable error codes, and the line codec.

pub mod codec;
pub mod messages;

// Re-export primary types for convenience.
pub use codec::{MessageWriter, ProtocolError, decode, encode};
pub use messages::{Action, ErrorCode, InitAck, ObjectError, Operation, Reply, Request};
