//! Temp-file placement for downloads.
//!
//! Downloaded content is handed to the caller as a path it renames into
//! its content-addressed store. Rename is only atomic within one
//! filesystem volume, so the staging directory is nested under the
//! invoking process's working directory, which guarantees volume
//! equality.

use std::io;
use std::path::PathBuf;

use tokio::fs::{self, File};

/// Hidden staging subdirectory created under the working directory.
pub const STAGING_DIR: &str = ".drivelfs-tmp";

/// Allocates destination files for downloaded objects.
#[derive(Debug, Clone)]
pub struct TempAllocator {
    root: PathBuf,
}

impl TempAllocator {
    /// Creates an allocator rooted at `workdir`.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            root: workdir.into(),
        }
    }

    /// Creates an allocator rooted at the current working directory.
    pub fn in_current_dir() -> io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    /// The staging directory path (not necessarily created yet).
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Creates the staging file for `oid`, truncating any stale leftover.
    ///
    /// The directory is created on first use. Returns the path together
    /// with the open handle so the caller controls when it is closed.
    pub async fn allocate(&self, oid: &str) -> io::Result<(PathBuf, File)> {
        if !valid_oid(oid) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("oid {oid:?} is not a valid staging file name"),
            ));
        }

        let dir = self.staging_dir();
        fs::create_dir_all(&dir).await?;

        let path = dir.join(oid);
        let file = File::create(&path).await?;
        Ok((path, file))
    }
}

/// Object ids arrive as hex content hashes; anything else must not be
/// used as a file name.
fn valid_oid(oid: &str) -> bool {
    !oid.is_empty() && oid.chars().all(|c| c.is_ascii_alphanumeric())
}
