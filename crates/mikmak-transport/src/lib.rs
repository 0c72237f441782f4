//! Transport layer for the mikmak client.
//!
//! Owns the socket and the receive loop. Everything above this crate sees
//! complete text messages, never bytes:
//!
//! ```text
//! socket bytes ──→ Framer (mikmak-protocol) ──→ ConnectionHandler::on_message
//! ```
//!
//! The seams are two traits:
//!
//! - [`MessageSink`]: something you can send a message through
//!   (the write half of a connection, or a recorder in tests).
//! - [`ConnectionHandler`]: what the receive loop calls back into on
//!   connect, on every message, and exactly once on disconnect.
//!
//! # Feature Flags
//!
//! - `tcp` (default): plain TCP transport via `tokio::net`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "tcp")]
mod tcp;

pub use error::TransportError;
#[cfg(feature = "tcp")]
pub use tcp::{CloseHandle, TcpConfig, TcpConnection, TcpOutbound, TcpTransport};

use std::fmt;

/// Opaque identifier for a connection, used to tell reconnects apart in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Where to dial: the bootstrap address or a server picked from the list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
}

impl ConnectionTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// What the receive loop should do after a message was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    /// Keep reading.
    #[default]
    Continue,
    /// Stop reading and close the connection.
    Close,
}

/// Why a receive loop ended.
#[derive(Debug)]
pub enum DisconnectReason {
    /// Closed from our side: a [`CloseHandle`](crate::CloseHandle) or a
    /// handler returning [`Flow::Close`].
    Local,
    /// The server closed the stream.
    Remote,
    /// The socket failed.
    Failed(TransportError),
}

impl DisconnectReason {
    /// `true` when the disconnect was not requested by this client.
    pub fn is_unexpected(&self) -> bool {
        !matches!(self, Self::Local)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("closed locally"),
            Self::Remote => f.write_str("closed by server"),
            Self::Failed(e) => write!(f, "{e}"),
        }
    }
}

/// Anything outbound messages can be written to.
pub trait MessageSink: Send {
    /// Sends one message. The sink adds the wire terminator.
    async fn send(&mut self, message: &str) -> Result<(), TransportError>;
}

/// Callbacks driven by a connection's receive loop.
///
/// Calls are strictly sequential: one message is fully handled before the
/// next is read from the buffer, and `on_disconnect` runs exactly once
/// after the last `on_message`.
pub trait ConnectionHandler: Send {
    /// Error a message handler can report. It's logged with the message
    /// and the loop carries on.
    type Error: fmt::Display;

    /// Called once, right after the connection is established.
    async fn on_connect<S: MessageSink>(&mut self, sink: &mut S);

    /// Called for every complete inbound message, in arrival order.
    async fn on_message<S: MessageSink>(
        &mut self,
        sink: &mut S,
        message: &str,
    ) -> Result<Flow, Self::Error>;

    /// Called once when the receive loop has ended and the socket is closed.
    async fn on_disconnect(&mut self, reason: &DisconnectReason);
}
