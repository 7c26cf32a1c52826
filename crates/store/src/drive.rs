//! Google Drive v3 backend.
//!
//! Async HTTP client using `reqwest` with Bearer token authentication.
//! Objects live as files inside one configured folder (the container);
//! lookups use a `files.list` query with an exact-name filter, uploads go
//! through a resumable session so the content streams without buffering,
//! and downloads use `alt=media`.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, HeaderMap, HeaderValue, LOCATION};
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::{ProgressTx, RemoteObject, RemoteStore, StoreError};

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/drive/v3";
const DEFAULT_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Google Drive object store scoped to one container folder.
pub struct DriveStore {
    http: reqwest::Client,
    api_base: String,
    upload_base: String,
    folder_id: String,
}

impl DriveStore {
    /// Creates a store for `folder_id` authenticated with `access_token`.
    ///
    /// Credential acquisition happens elsewhere; the token is an opaque
    /// capability attached to every request.
    pub fn new(access_token: &str, folder_id: impl Into<String>) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {access_token}"))
                .map_err(|_| StoreError::InvalidToken)?,
        );

        let http = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            upload_base: DEFAULT_UPLOAD_BASE.to_string(),
            folder_id: folder_id.into(),
        })
    }

    /// Builds the `files.list` query for an exact-name lookup in the container.
    fn list_query(&self, name: &str) -> String {
        format!(
            "name = '{}' and '{}' in parents and trashed = false",
            escape_query(name),
            escape_query(&self.folder_id)
        )
    }

    /// Streams `source` to a resumable upload session at `session_url`.
    async fn put_content(
        &self,
        session_url: &str,
        source: File,
        size: u64,
        progress: ProgressTx,
    ) -> Result<(), StoreError> {
        let body = reqwest::Body::wrap_stream(CountingStream::new(source, progress));
        let resp = self
            .http
            .put(session_url)
            .header(CONTENT_LENGTH, size)
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(())
    }

    /// Opens a resumable upload session and returns its URL.
    async fn open_session(&self, resp: reqwest::Response) -> Result<String, StoreError> {
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        let url = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| StoreError::Session("missing session location".into()))?;
        Ok(url.to_string())
    }
}

impl RemoteStore for DriveStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<RemoteObject>, StoreError> {
        let query = self.list_query(name);
        let resp = self
            .http
            .get(format!("{}/files", self.api_base))
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id, name, size)"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let list: FileList = resp.json().await?;
        Ok(list.files.into_iter().next().map(RemoteObject::from))
    }

    async fn create(
        &self,
        name: &str,
        source: File,
        size: u64,
        progress: ProgressTx,
    ) -> Result<(), StoreError> {
        let metadata = serde_json::json!({
            "name": name,
            "parents": [self.folder_id],
        });
        let resp = self
            .http
            .post(format!("{}/files", self.upload_base))
            .query(&[("uploadType", "resumable"), ("supportsAllDrives", "true")])
            .json(&metadata)
            .send()
            .await?;

        let session = self.open_session(resp).await?;
        tracing::debug!(name, size, "creating drive object");
        self.put_content(&session, source, size, progress).await
    }

    async fn replace(
        &self,
        id: &str,
        source: File,
        size: u64,
        progress: ProgressTx,
    ) -> Result<(), StoreError> {
        let resp = self
            .http
            .patch(format!("{}/files/{id}", self.upload_base))
            .query(&[("uploadType", "resumable"), ("supportsAllDrives", "true")])
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let session = self.open_session(resp).await?;
        tracing::debug!(id, size, "replacing drive object content");
        self.put_content(&session, source, size, progress).await
    }

    async fn fetch(&self, id: &str, mut dest: File, progress: ProgressTx) -> Result<u64, StoreError> {
        let resp = self
            .http
            .get(format!("{}/files/{id}", self.api_base))
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let mut stream = resp.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            dest.write_all(&chunk).await?;
            written += chunk.len() as u64;
            let _ = progress.try_send(written);
        }

        dest.flush().await?;
        dest.sync_all().await?;
        Ok(written)
    }
}

/// Converts a non-success response into a [`StoreError::Api`].
async fn api_error(resp: reqwest::Response) -> StoreError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    StoreError::Api { status, body }
}

/// Escapes a string for use inside a single-quoted Drive query literal.
fn escape_query(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

// ---------------------------------------------------------------------------
// List response payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    name: String,
    /// Drive reports int64 fields as JSON strings.
    #[serde(default)]
    size: Option<String>,
}

impl From<DriveFile> for RemoteObject {
    fn from(f: DriveFile) -> Self {
        RemoteObject {
            id: f.id,
            name: f.name,
            size: f.size.and_then(|s| s.parse().ok()).unwrap_or(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Counted upload body
// ---------------------------------------------------------------------------

/// Wraps the source file stream and reports cumulative byte counts as the
/// HTTP client pulls chunks off it.
struct CountingStream {
    inner: ReaderStream<File>,
    progress: ProgressTx,
    sent: u64,
}

impl CountingStream {
    fn new(source: File, progress: ProgressTx) -> Self {
        Self {
            inner: ReaderStream::new(source),
            progress,
            sent: 0,
        }
    }
}

impl Stream for CountingStream {
    type Item = std::io::Result<bytes::Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.sent += chunk.len() as u64;
                // Progress is advisory; a full buffer just drops a sample.
                let _ = this.progress.try_send(this.sent);
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}
