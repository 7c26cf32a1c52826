//! Upload and download flows.
//!
//! Progress flows out of the store call through a bounded channel of
//! cumulative byte counts; the same task drains it between polls of the
//! transfer future, so progress lines and the terminal line never
//! interleave with another command's output.

use std::future::Future;
use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

use drivelfs_protocol::{MessageWriter, ProtocolError, Reply};
use drivelfs_store::{PROGRESS_BUFFER, RemoteStore, StoreError};

use crate::{TempAllocator, TransferError};

/// Cumulative byte counter for one transfer; computes per-message deltas.
#[derive(Debug, Default)]
struct ProgressState {
    so_far: u64,
}

impl ProgressState {
    /// Folds in a cumulative count, clamped to be non-decreasing.
    /// Returns `(bytes_so_far, bytes_since_last)`.
    fn advance(&mut self, cumulative: u64) -> (u64, u64) {
        let so_far = cumulative.max(self.so_far);
        let delta = so_far - self.so_far;
        self.so_far = so_far;
        (so_far, delta)
    }
}

/// Uploads the object `oid` from the local file `source`.
///
/// Emits zero or more `progress` messages followed by exactly one
/// `complete`. Per-command failures are reported on the wire; only output
/// failures escape as errors.
pub async fn upload<S, W>(
    store: &S,
    out: &mut MessageWriter<W>,
    oid: &str,
    source: &Path,
    size: u64,
) -> Result<(), ProtocolError>
where
    S: RemoteStore,
    W: AsyncWrite + Unpin,
{
    let mut state = ProgressState::default();
    match run_upload(store, out, oid, source, size, &mut state).await? {
        Ok(()) => {
            tracing::info!(oid, size, "upload complete");
            out.write(&Reply::complete(oid)).await
        }
        Err(err) => {
            tracing::warn!(oid, error = %err, "upload failed");
            out.write(&Reply::failed(oid, err.code(), err.to_string()))
                .await
        }
    }
}

/// Downloads the object `oid` into a freshly allocated staging file.
///
/// The staging file is durable on disk before the success `complete`
/// advertises its path.
pub async fn download<S, W>(
    store: &S,
    staging: &TempAllocator,
    out: &mut MessageWriter<W>,
    oid: &str,
    size: u64,
) -> Result<(), ProtocolError>
where
    S: RemoteStore,
    W: AsyncWrite + Unpin,
{
    let mut state = ProgressState::default();
    match run_download(store, staging, out, oid, size, &mut state).await? {
        Ok(path) => {
            tracing::info!(oid, path = %path.display(), "download complete");
            out.write(&Reply::complete_with_path(oid, path)).await
        }
        Err(err) => {
            tracing::warn!(oid, error = %err, "download failed");
            out.write(&Reply::failed(oid, err.code(), err.to_string()))
                .await
        }
    }
}

async fn run_upload<S, W>(
    store: &S,
    out: &mut MessageWriter<W>,
    oid: &str,
    source: &Path,
    size: u64,
    state: &mut ProgressState,
) -> Result<Result<(), TransferError>, ProtocolError>
where
    S: RemoteStore,
    W: AsyncWrite + Unpin,
{
    // Create vs. update is re-resolved by name lookup on every command;
    // nothing is cached across transfers.
    let existing = match store.find_by_name(oid).await {
        Ok(v) => v,
        Err(source) => {
            return Ok(Err(TransferError::Upload {
                transferred: 0,
                declared: size,
                source,
            }));
        }
    };

    let file = match File::open(source).await {
        Ok(f) => f,
        Err(err) => {
            return Ok(Err(TransferError::Source {
                path: source.to_path_buf(),
                source: err,
            }));
        }
    };

    let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
    let result = match &existing {
        Some(obj) => pump(out, oid, state, rx, store.replace(&obj.id, file, size, tx)).await?,
        None => pump(out, oid, state, rx, store.create(oid, file, size, tx)).await?,
    };

    Ok(result.map_err(|source| TransferError::Upload {
        transferred: state.so_far,
        declared: size,
        source,
    }))
}

async fn run_download<S, W>(
    store: &S,
    staging: &TempAllocator,
    out: &mut MessageWriter<W>,
    oid: &str,
    size: u64,
    state: &mut ProgressState,
) -> Result<Result<std::path::PathBuf, TransferError>, ProtocolError>
where
    S: RemoteStore,
    W: AsyncWrite + Unpin,
{
    let obj = match store.find_by_name(oid).await {
        Ok(Some(obj)) => obj,
        Ok(None) => {
            return Ok(Err(TransferError::NotFound {
                oid: oid.to_string(),
            }));
        }
        Err(source) => {
            return Ok(Err(TransferError::Download {
                transferred: 0,
                declared: size,
                source,
            }));
        }
    };

    let (path, file) = match staging.allocate(oid).await {
        Ok(v) => v,
        Err(err) => return Ok(Err(TransferError::TmpFile(err))),
    };

    let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
    match pump(out, oid, state, rx, store.fetch(&obj.id, file, tx)).await? {
        Ok(_written) => Ok(Ok(path)),
        Err(source) => {
            // The path was never advertised; remove the partial file so a
            // stale leftover cannot shadow a later attempt.
            if let Err(err) = tokio::fs::remove_file(&path).await {
                tracing::debug!(path = %path.display(), %err, "failed to remove partial download");
            }
            Ok(Err(TransferError::Download {
                transferred: state.so_far,
                declared: size,
                source,
            }))
        }
    }
}

/// Awaits `transfer` while draining the progress channel, emitting one
/// `progress` message per received count, then drains whatever is left
/// so every progress line precedes the terminal message.
async fn pump<W, T>(
    out: &mut MessageWriter<W>,
    oid: &str,
    state: &mut ProgressState,
    mut rx: mpsc::Receiver<u64>,
    transfer: impl Future<Output = Result<T, StoreError>>,
) -> Result<Result<T, StoreError>, ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    tokio::pin!(transfer);
    let result = loop {
        tokio::select! {
            res = &mut transfer => break res,
            Some(count) = rx.recv() => {
                let (so_far, delta) = state.advance(count);
                out.write(&Reply::progress(oid, so_far, delta)).await?;
            }
        }
    };

    while let Ok(count) = rx.try_recv() {
        let (so_far, delta) = state.advance(count);
        out.write(&Reply::progress(oid, so_far, delta)).await?;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivelfs_store::MemoryStore;
    use serde_json::Value;

    fn decode_lines(buf: &[u8]) -> Vec<Value> {
        std::str::from_utf8(buf)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn write_source(dir: &Path, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    /// Checks the progress/terminal shape: 0..n progress lines, with
    /// non-decreasing totals and matching deltas, then exactly one
    /// `complete` as the final line.
    fn assert_transfer_shape(lines: &[Value], oid: &str) {
        assert!(!lines.is_empty());
        let (terminal, progress) = lines.split_last().unwrap();
        assert_eq!(terminal["event"], "complete");
        assert_eq!(terminal["oid"], oid);

        let mut so_far = 0u64;
        for line in progress {
            assert_eq!(line["event"], "progress");
            assert_eq!(line["oid"], oid);
            let total = line["bytesSoFar"].as_u64().unwrap();
            let delta = line["bytesSinceLast"].as_u64().unwrap();
            assert!(total >= so_far, "bytesSoFar must be non-decreasing");
            assert_eq!(delta, total - so_far, "delta must match totals");
            so_far = total;
        }
    }

    #[tokio::test]
    async fn upload_creates_when_name_is_absent() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), "f.bin", b"payload");

        let mut buf = Vec::new();
        let mut out = MessageWriter::new(&mut buf);
        upload(&store, &mut out, "abc", &source, 7).await.unwrap();

        let lines = decode_lines(&buf);
        assert_transfer_shape(&lines, "abc");
        assert!(lines.last().unwrap().get("error").is_none());
        assert!(lines.last().unwrap().get("path").is_none());

        assert_eq!(store.object_count(), 1);
        assert_eq!(store.content_of("abc").unwrap(), b"payload");
    }

    #[tokio::test]
    async fn upload_replaces_when_name_exists() {
        let store = MemoryStore::new();
        store.seed("abc", b"old");

        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), "f.bin", b"new content");

        let mut buf = Vec::new();
        let mut out = MessageWriter::new(&mut buf);
        upload(&store, &mut out, "abc", &source, 11).await.unwrap();

        let lines = decode_lines(&buf);
        assert!(lines.last().unwrap().get("error").is_none());

        // Still exactly one object under that name, with the new content.
        assert_eq!(store.object_count(), 1);
        assert_eq!(store.content_of("abc").unwrap(), b"new content");
    }

    #[tokio::test]
    async fn upload_missing_source_reports_upload_error() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();

        let mut buf = Vec::new();
        let mut out = MessageWriter::new(&mut buf);
        upload(&store, &mut out, "abc", &dir.path().join("missing.bin"), 7)
            .await
            .unwrap();

        let lines = decode_lines(&buf);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["error"]["code"], 4);
        assert_eq!(store.object_count(), 0);
    }

    #[tokio::test]
    async fn upload_transfer_failure_reports_byte_counts() {
        let store = MemoryStore::new();
        store.set_fail_transfers(true);

        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), "f.bin", b"0123456789");

        let mut buf = Vec::new();
        let mut out = MessageWriter::new(&mut buf);
        upload(&store, &mut out, "abc", &source, 10).await.unwrap();

        let lines = decode_lines(&buf);
        let terminal = lines.last().unwrap();
        assert_eq!(terminal["error"]["code"], 4);
        let message = terminal["error"]["message"].as_str().unwrap();
        assert!(
            message.contains("of 10 bytes"),
            "message should carry declared size: {message}"
        );
    }

    #[tokio::test]
    async fn download_writes_into_staging_and_advertises_path() {
        let store = MemoryStore::new();
        let data = vec![42u8; 100_000];
        store.seed("abc", &data);

        let dir = tempfile::tempdir().unwrap();
        let staging = TempAllocator::new(dir.path());

        let mut buf = Vec::new();
        let mut out = MessageWriter::new(&mut buf);
        download(&store, &staging, &mut out, "abc", data.len() as u64)
            .await
            .unwrap();

        let lines = decode_lines(&buf);
        assert_transfer_shape(&lines, "abc");
        assert!(
            lines.len() > 2,
            "a 100 KB transfer should emit several progress lines"
        );

        let terminal = lines.last().unwrap();
        assert!(terminal.get("error").is_none());
        let path = std::path::PathBuf::from(terminal["path"].as_str().unwrap());
        assert!(path.starts_with(staging.staging_dir()));
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[tokio::test]
    async fn download_unknown_oid_reports_not_found() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let staging = TempAllocator::new(dir.path());

        let mut buf = Vec::new();
        let mut out = MessageWriter::new(&mut buf);
        download(&store, &staging, &mut out, "zzz", 5).await.unwrap();

        let lines = decode_lines(&buf);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["error"]["code"], 2);
        // No temp file, not even the staging directory.
        assert!(!staging.staging_dir().exists());
    }

    #[tokio::test]
    async fn download_allocation_failure_reports_tmp_file_error() {
        let store = MemoryStore::new();
        store.seed("abc", b"data");

        let dir = tempfile::tempdir().unwrap();
        // Occupy the staging path with a file so the directory cannot exist.
        std::fs::write(dir.path().join(crate::STAGING_DIR), b"in the way").unwrap();
        let staging = TempAllocator::new(dir.path());

        let mut buf = Vec::new();
        let mut out = MessageWriter::new(&mut buf);
        download(&store, &staging, &mut out, "abc", 4).await.unwrap();

        let lines = decode_lines(&buf);
        assert_eq!(lines.last().unwrap()["error"]["code"], 5);
    }

    #[tokio::test]
    async fn download_transfer_failure_removes_partial_file() {
        let store = MemoryStore::new();
        store.seed("abc", b"doomed data");
        store.set_fail_transfers(true);

        let dir = tempfile::tempdir().unwrap();
        let staging = TempAllocator::new(dir.path());

        let mut buf = Vec::new();
        let mut out = MessageWriter::new(&mut buf);
        download(&store, &staging, &mut out, "abc", 11).await.unwrap();

        let lines = decode_lines(&buf);
        let terminal = lines.last().unwrap();
        assert_eq!(terminal["error"]["code"], 3);
        assert!(terminal.get("path").is_none());
        assert!(!staging.staging_dir().join("abc").exists());
    }

    #[test]
    fn progress_state_clamps_to_non_decreasing() {
        let mut state = ProgressState::default();
        assert_eq!(state.advance(10), (10, 10));
        assert_eq!(state.advance(25), (25, 15));
        // A lagging sample never moves the counter backwards.
        assert_eq!(state.advance(20), (25, 0));
    }
}
