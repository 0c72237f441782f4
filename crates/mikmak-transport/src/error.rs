use crate::ConnectionTarget;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Opening the TCP connection failed (refused, unreachable, timed out).
    #[error("connect to {target} failed: {source}")]
    ConnectFailed {
        target: ConnectionTarget,
        #[source]
        source: std::io::Error,
    },

    /// Writing a message failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading from the socket failed for a reason other than the
    /// liveness timeout.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}
