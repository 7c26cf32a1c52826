use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};

use drivelfs_protocol::{ErrorCode, InitAck, MessageWriter, ProtocolError, Reply, Request, codec};
use drivelfs_store::RemoteStore;
use drivelfs_transfer::TempAllocator;

use crate::EngineError;

/// Attribution for failures that occur with no command active.
pub const UNKNOWN_OID: &str = "unknown";

/// Wait between polls when the input yields an empty line.
///
/// An empty line means "no command available yet", not end-of-stream;
/// end-of-stream is a zero-byte read.
const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingInit,
    Ready,
}

/// The command loop.
///
/// Lifecycle: `init` acknowledgement, zero or more upload/download
/// commands, then `terminate` (or end of input). Transfers are strictly
/// sequential; the concurrency hints in `init` are accepted and ignored.
pub struct Engine<S> {
    store: S,
    staging: TempAllocator,
    state: State,
}

impl<S: RemoteStore> Engine<S> {
    pub fn new(store: S, staging: TempAllocator) -> Self {
        Self {
            store,
            staging,
            state: State::AwaitingInit,
        }
    }

    /// Runs the loop until `terminate`, end of input, or an unexpected
    /// failure (which is reported as a code-9 `complete` before returning).
    pub async fn run<R, W>(&mut self, mut input: R, output: W) -> Result<(), EngineError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut out = MessageWriter::new(output);
        let mut line = String::new();

        loop {
            line.clear();
            let n = input.read_line(&mut line).await?;
            if n == 0 {
                tracing::debug!("input stream closed, shutting down");
                return Ok(());
            }
            if line.trim().is_empty() {
                tokio::time::sleep(INPUT_POLL_INTERVAL).await;
                continue;
            }

            let request = match codec::decode(&line) {
                Ok(request) => request,
                Err(err) => {
                    tracing::warn!(%err, "skipping undecodable input line");
                    continue;
                }
            };

            match request {
                Request::Terminate => {
                    tracing::debug!("terminate received, shutting down");
                    return Ok(());
                }

                Request::Init {
                    operation,
                    remote,
                    concurrent,
                    concurrent_transfers,
                } => {
                    if self.state == State::Ready {
                        tracing::warn!("ignoring repeated init");
                        continue;
                    }
                    tracing::info!(
                        ?operation,
                        remote,
                        concurrent,
                        concurrent_transfers,
                        "session initialized"
                    );
                    if let Err(err) = out.write(&InitAck::ok()).await {
                        return abort(&mut out, UNKNOWN_OID, err).await;
                    }
                    self.state = State::Ready;
                }

                Request::Upload {
                    oid, size, path, ..
                } => {
                    if self.state != State::Ready {
                        tracing::warn!(oid, "upload before init, skipping");
                        continue;
                    }
                    if let Err(err) =
                        drivelfs_transfer::upload(&self.store, &mut out, &oid, &path, size).await
                    {
                        return abort(&mut out, &oid, err).await;
                    }
                }

                Request::Download { oid, size, .. } => {
                    if self.state != State::Ready {
                        tracing::warn!(oid, "download before init, skipping");
                        continue;
                    }
                    if let Err(err) = drivelfs_transfer::download(
                        &self.store,
                        &self.staging,
                        &mut out,
                        &oid,
                        size,
                    )
                    .await
                    {
                        return abort(&mut out, &oid, err).await;
                    }
                }
            }
        }
    }
}

/// Best-effort code-9 report for a failure outside the per-command
/// taxonomy, attributed to the active oid, then the run ends.
async fn abort<W: AsyncWrite + Unpin>(
    out: &mut MessageWriter<W>,
    oid: &str,
    err: ProtocolError,
) -> Result<(), EngineError> {
    tracing::error!(oid, error = %err, "unexpected failure, shutting down");
    let reply = Reply::failed(oid, ErrorCode::Unhandled, err.to_string());
    if let Err(write_err) = out.write(&reply).await {
        tracing::error!(%write_err, "could not report unhandled failure");
    }
    Err(EngineError::Protocol(err))
}
