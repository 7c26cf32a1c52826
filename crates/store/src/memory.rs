//! In-memory store used by engine and orchestrator tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{ProgressTx, RemoteObject, RemoteStore, StoreError};

/// Progress is reported once per this many bytes moved.
const PROGRESS_CHUNK: usize = 64 * 1024;

/// In-memory [`RemoteStore`] with synthetic chunked progress.
///
/// Transfers can be made to fail on demand to exercise error paths.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_transfers: AtomicBool,
}

#[derive(Default)]
struct Inner {
    objects: Vec<StoredObject>,
    next_id: u64,
}

struct StoredObject {
    id: String,
    name: String,
    data: Vec<u8>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an object directly, returning its id.
    pub fn seed(&self, name: &str, data: &[u8]) -> String {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = format!("mem-{}", inner.next_id);
        inner.objects.push(StoredObject {
            id: id.clone(),
            name: name.to_string(),
            data: data.to_vec(),
        });
        id
    }

    /// Number of objects currently stored.
    pub fn object_count(&self) -> usize {
        self.inner.lock().unwrap().objects.len()
    }

    /// Content of the first object named `name`, if any.
    pub fn content_of(&self, name: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner
            .objects
            .iter()
            .find(|o| o.name == name)
            .map(|o| o.data.clone())
    }

    /// Makes subsequent transfers fail after moving their bytes.
    pub fn set_fail_transfers(&self, fail: bool) {
        self.fail_transfers.store(fail, Ordering::Relaxed);
    }

    fn injected_failure() -> StoreError {
        StoreError::Api {
            status: 500,
            body: "injected transfer failure".into(),
        }
    }

    /// Reads `source` to the end, reporting cumulative progress per chunk.
    async fn slurp(source: &mut File, progress: &ProgressTx) -> Result<Vec<u8>, StoreError> {
        let mut data = Vec::new();
        let mut buf = vec![0u8; PROGRESS_CHUNK];
        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let _ = progress.send(data.len() as u64).await;
        }
        Ok(data)
    }
}

impl RemoteStore for MemoryStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<RemoteObject>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .objects
            .iter()
            .find(|o| o.name == name)
            .map(|o| RemoteObject {
                id: o.id.clone(),
                name: o.name.clone(),
                size: o.data.len() as u64,
            }))
    }

    async fn create(
        &self,
        name: &str,
        mut source: File,
        _size: u64,
        progress: ProgressTx,
    ) -> Result<(), StoreError> {
        let data = Self::slurp(&mut source, &progress).await?;
        if self.fail_transfers.load(Ordering::Relaxed) {
            return Err(Self::injected_failure());
        }

        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = format!("mem-{}", inner.next_id);
        inner.objects.push(StoredObject {
            id,
            name: name.to_string(),
            data,
        });
        Ok(())
    }

    async fn replace(
        &self,
        id: &str,
        mut source: File,
        _size: u64,
        progress: ProgressTx,
    ) -> Result<(), StoreError> {
        let data = Self::slurp(&mut source, &progress).await?;
        if self.fail_transfers.load(Ordering::Relaxed) {
            return Err(Self::injected_failure());
        }

        let mut inner = self.inner.lock().unwrap();
        match inner.objects.iter_mut().find(|o| o.id == id) {
            Some(obj) => {
                obj.data = data;
                Ok(())
            }
            None => Err(StoreError::Api {
                status: 404,
                body: format!("no object with id {id}"),
            }),
        }
    }

    async fn fetch(&self, id: &str, mut dest: File, progress: ProgressTx) -> Result<u64, StoreError> {
        let data = {
            let inner = self.inner.lock().unwrap();
            inner
                .objects
                .iter()
                .find(|o| o.id == id)
                .map(|o| o.data.clone())
        }
        .ok_or_else(|| StoreError::Api {
            status: 404,
            body: format!("no object with id {id}"),
        })?;

        let mut written: u64 = 0;
        for chunk in data.chunks(PROGRESS_CHUNK) {
            dest.write_all(chunk).await?;
            written += chunk.len() as u64;
            let _ = progress.send(written).await;
        }

        if self.fail_transfers.load(Ordering::Relaxed) {
            return Err(Self::injected_failure());
        }

        dest.flush().await?;
        dest.sync_all().await?;
        Ok(written)
    }
}
