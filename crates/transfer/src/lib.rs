//! Per-object transfer orchestration.
//!
//! One inbound `upload` or `download` command maps to one orchestrator
//! call: resolve the object by name in the remote container, move the
//! bytes, translate store progress into protocol progress messages, and
//! finish with exactly one terminal `complete` message.

mod orchestrator;
mod staging;

pub use orchestrator::{download, upload};
pub use staging::{STAGING_DIR, TempAllocator};

use std::path::PathBuf;

use drivelfs_protocol::ErrorCode;
use drivelfs_store::StoreError;

/// Per-command transfer failures, each mapping to a stable wire code.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("object {oid} not found in remote storage")]
    NotFound { oid: String },

    #[error("cannot create temp file: {0}")]
    TmpFile(#[source] std::io::Error),

    #[error("cannot open source file {}: {source}", path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload failed after {transferred} of {declared} bytes: {source}")]
    Upload {
        transferred: u64,
        declared: u64,
        #[source]
        source: StoreError,
    },

    #[error("download failed after {transferred} of {declared} bytes: {source}")]
    Download {
        transferred: u64,
        declared: u64,
        #[source]
        source: StoreError,
    },
}

impl TransferError {
    /// The wire error code reported for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            TransferError::NotFound { .. } => ErrorCode::FileNotFound,
            TransferError::TmpFile(_) => ErrorCode::CannotCreateTmpFile,
            TransferError::Source { .. } | TransferError::Upload { .. } => ErrorCode::Upload,
            TransferError::Download { .. } => ErrorCode::Download,
        }
    }
}
