//! Remote object store capability.
//!
//! The transfer engine only needs a narrow interface: find an object by
//! logical name within the configured container, upload a stream under a
//! name, and download a stream for a remote identifier. [`DriveStore`]
//! implements it against the Google Drive v3 REST API; [`MemoryStore`] is
//! an in-process fake for tests.

mod drive;
mod memory;

pub use drive::DriveStore;
pub use memory::MemoryStore;

use tokio::fs::File;
use tokio::sync::mpsc;

/// Channel carrying cumulative transferred-byte counts out of a store call.
///
/// The receiving side is drained on the same task that awaits the transfer,
/// so senders must never block the transfer on a full buffer.
pub type ProgressTx = mpsc::Sender<u64>;

/// Buffer capacity for progress channels.
pub const PROGRESS_BUFFER: usize = 32;

/// Result of a name lookup in the remote container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Opaque remote identifier, used for replace/fetch.
    pub id: String,
    /// Logical object name (the oid).
    pub name: String,
    /// Size in bytes as reported by the store (0 if unknown).
    pub size: u64,
}

/// Errors produced by store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Drive API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("upload session rejected: {0}")]
    Session(String),

    #[error("invalid access token")]
    InvalidToken,
}

/// Capability to move object content in and out of a remote container.
///
/// Lookups are by exact name; when several objects share a name the first
/// match wins. Upload/download calls report cumulative byte counts through
/// the progress channel while they run, and release the file handle they
/// were given on every exit path.
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// Finds an object named `name` in the container, if any.
    async fn find_by_name(&self, name: &str) -> Result<Option<RemoteObject>, StoreError>;

    /// Creates a new object named `name` with the contents of `source`,
    /// as a child of the container.
    async fn create(
        &self,
        name: &str,
        source: File,
        size: u64,
        progress: ProgressTx,
    ) -> Result<(), StoreError>;

    /// Replaces the content of the existing object `id` with `source`.
    async fn replace(
        &self,
        id: &str,
        source: File,
        size: u64,
        progress: ProgressTx,
    ) -> Result<(), StoreError>;

    /// Streams the content of object `id` into `dest`.
    ///
    /// The destination is flushed and synced to disk before this returns,
    /// so a successful fetch leaves a durable file. Returns the number of
    /// bytes written.
    async fn fetch(&self, id: &str, dest: File, progress: ProgressTx) -> Result<u64, StoreError>;
}
