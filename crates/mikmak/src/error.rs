//! Unified error type for the mikmak client.

use mikmak_protocol::{LooseError, ProtocolError};
use mikmak_session::SessionError;
use mikmak_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors, so code
/// using the `mikmak` crate only has to name this one type.
#[derive(Debug, thiserror::Error)]
pub enum MikmakError {
    /// Connecting, sending, or receiving failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A message could not be decoded or parsed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The session could not start or run.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<LooseError> for MikmakError {
    fn from(source: LooseError) -> Self {
        Self::Protocol(ProtocolError::Loose {
            field: "list",
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::SendFailed(std::io::Error::from(
            std::io::ErrorKind::BrokenPipe,
        ));
        let mikmak_err: MikmakError = err.into();
        assert!(matches!(mikmak_err, MikmakError::Transport(_)));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let mikmak_err: MikmakError = err.into();
        assert!(matches!(mikmak_err, MikmakError::Protocol(_)));
        assert!(mikmak_err.to_string().contains("bad"));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::InvalidConfig("username is empty".into());
        let mikmak_err: MikmakError = err.into();
        assert!(matches!(mikmak_err, MikmakError::Session(_)));
        assert!(mikmak_err.to_string().contains("username"));
    }

    #[test]
    fn test_loose_error_via_question_mark() {
        fn parse(text: &str) -> Result<serde_json::Value, MikmakError> {
            Ok(mikmak_protocol::decode_loose_list(text)?)
        }

        let err = parse("[1, 2").unwrap_err();
        assert!(matches!(err, MikmakError::Protocol(ProtocolError::Loose { .. })));
        assert!(parse("[1, 2]").is_ok());
    }
}
