//! Error types for the session layer.

use mikmak_transport::TransportError;

/// Errors surfaced by the session orchestrator.
///
/// Protocol trouble inside the handshake (a message that fails to parse,
/// a level that disagrees with the login rank) never shows up here: it is
/// logged and the message is skipped. What's left is configuration that
/// can't work and transport failures worth reporting.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The client configuration can't be used to connect.
    #[error("invalid client config: {0}")]
    InvalidConfig(String),

    /// A send failed while reacting to a message. The connection keeps
    /// running; the receive loop decides whether it's gone.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
