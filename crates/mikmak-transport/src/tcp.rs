//! Plain TCP transport using `tokio::net`.
//!
//! The wire is unencrypted even though the cluster listens on port 443.
//! Messages are UTF-8 text terminated by a single `0x00` byte.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use mikmak_protocol::{Framer, FRAME_TERMINATOR};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Notify;

use crate::{
    ConnectionHandler, ConnectionId, ConnectionTarget, DisconnectReason, Flow, MessageSink,
    TransportError,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Messages longer than this are cut short in error logs.
const LOG_PREVIEW_CHARS: usize = 200;

/// Socket settings.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// How long a single read may block before the loop re-checks whether
    /// it should keep running. An idle connection is not an error; this
    /// is a liveness interval, not a protocol deadline. Also bounds the
    /// initial TCP connect.
    pub read_timeout: Duration,

    /// Size of each socket read.
    pub read_chunk: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
            read_chunk: 8192,
        }
    }
}

/// Dials TCP connections.
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    config: TcpConfig,
}

impl TcpTransport {
    pub fn new(config: TcpConfig) -> Self {
        Self { config }
    }

    /// Opens a connection to `target` and calls `handler.on_connect`.
    ///
    /// The returned connection isn't reading yet; call
    /// [`TcpConnection::run`] to start the receive loop.
    pub async fn connect<H: ConnectionHandler>(
        &self,
        target: &ConnectionTarget,
        handler: &mut H,
    ) -> Result<TcpConnection, TransportError> {
        let connect_failed = |source| TransportError::ConnectFailed {
            target: target.clone(),
            source,
        };

        let stream = tokio::time::timeout(
            self.config.read_timeout,
            TcpStream::connect((target.host.as_str(), target.port)),
        )
        .await
        .map_err(|_| connect_failed(std::io::ErrorKind::TimedOut.into()))?
        .map_err(connect_failed)?;

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::info!(%id, %target, "connected");

        let (reader, writer) = stream.into_split();
        let mut connection = TcpConnection {
            id,
            reader,
            outbound: TcpOutbound { id, writer },
            framer: Framer::new(),
            config: self.config.clone(),
            close: CloseHandle::new(),
        };

        handler.on_connect(&mut connection.outbound).await;
        Ok(connection)
    }
}

/// Stops a running receive loop from anywhere.
///
/// Cheap to clone. Closing is idempotent: the first call clears the
/// running flag and wakes a pending read, later calls do nothing.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl CloseHandle {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn close(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            // `notify_one` stores a permit if the loop isn't waiting yet,
            // so a close that races the next read still wakes it.
            self.wake.notify_one();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Write half of a connection.
#[derive(Debug)]
pub struct TcpOutbound {
    id: ConnectionId,
    writer: OwnedWriteHalf,
}

impl MessageSink for TcpOutbound {
    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        let mut bytes = Vec::with_capacity(message.len() + 1);
        bytes.extend_from_slice(message.as_bytes());
        bytes.push(FRAME_TERMINATOR);

        tracing::trace!(id = %self.id, %message, "→");
        if let Err(e) = self.writer.write_all(&bytes).await {
            // Reported, not fatal: the receive loop decides when the
            // connection is gone.
            tracing::warn!(id = %self.id, error = %e, "send failed");
            return Err(TransportError::SendFailed(e));
        }
        Ok(())
    }
}

/// An open connection whose receive loop hasn't finished yet.
#[derive(Debug)]
pub struct TcpConnection {
    id: ConnectionId,
    reader: OwnedReadHalf,
    outbound: TcpOutbound,
    framer: Framer,
    config: TcpConfig,
    close: CloseHandle,
}

impl TcpConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns a handle that can stop this connection's receive loop.
    pub fn close_handle(&self) -> CloseHandle {
        self.close.clone()
    }

    /// Runs the receive loop until the connection ends.
    ///
    /// - A read that times out just loops again.
    /// - Every complete message goes to `handler.on_message`, in order.
    ///   A handler error or panic is logged and the next message is
    ///   handled as usual.
    /// - EOF, a read failure, a [`CloseHandle::close`], or a handler
    ///   returning [`Flow::Close`] ends the loop. The socket is shut down
    ///   and `handler.on_disconnect` is called exactly once.
    pub async fn run<H: ConnectionHandler>(mut self, handler: &mut H) -> DisconnectReason {
        let id = self.id;
        let mut buf = vec![0u8; self.config.read_chunk.max(1)];

        let reason = 'read: loop {
            if !self.close.is_running() {
                break DisconnectReason::Local;
            }

            let read = tokio::select! {
                _ = self.close.wake.notified() => continue,
                read = tokio::time::timeout(self.config.read_timeout, self.reader.read(&mut buf)) => read,
            };

            let n = match read {
                Err(_elapsed) => {
                    tracing::trace!(%id, "read timed out, connection idle");
                    continue;
                }
                Ok(Ok(0)) => break DisconnectReason::Remote,
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    tracing::warn!(%id, error = %e, "receive failed");
                    break DisconnectReason::Failed(TransportError::ReceiveFailed(e));
                }
            };

            for message in self.framer.push(&buf[..n]) {
                if dispatch(id, handler, &mut self.outbound, &message).await == Flow::Close {
                    self.close.close();
                    break 'read DisconnectReason::Local;
                }
            }
        };

        self.close.close();
        if let Err(e) = self.outbound.writer.shutdown().await {
            tracing::debug!(%id, error = %e, "socket shutdown failed");
        }
        if !self.framer.remainder().is_empty() {
            tracing::debug!(
                %id,
                bytes = self.framer.remainder().len(),
                "discarding unterminated data"
            );
        }
        tracing::info!(%id, %reason, "disconnected");

        handler.on_disconnect(&reason).await;
        reason
    }
}

/// Hands one message to the handler, containing any failure.
async fn dispatch<H: ConnectionHandler>(
    id: ConnectionId,
    handler: &mut H,
    sink: &mut TcpOutbound,
    message: &str,
) -> Flow {
    tracing::trace!(%id, %message, "←");

    match AssertUnwindSafe(handler.on_message(sink, message))
        .catch_unwind()
        .await
    {
        Ok(Ok(flow)) => flow,
        Ok(Err(e)) => {
            tracing::error!(
                %id,
                error = %e,
                message = preview(message),
                "message handler failed"
            );
            Flow::Continue
        }
        Err(panic) => {
            let fault = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(
                %id,
                %fault,
                message = preview(message),
                "message handler panicked"
            );
            Flow::Continue
        }
    }
}

/// First [`LOG_PREVIEW_CHARS`] characters of `message`.
fn preview(message: &str) -> &str {
    match message.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((end, _)) => &message[..end],
        None => message,
    }
}
