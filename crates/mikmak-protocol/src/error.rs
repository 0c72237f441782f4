//! Error types for the protocol layer.
//!
//! Framing itself never fails (invalid UTF-8 is replaced, not rejected),
//! so everything here is about turning a complete message into structure:
//! the JSON envelope, the XML envelope, or the loose literal lists that
//! ride inside JSON string fields.

/// Errors that can occur while decoding or parsing an inbound message.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The message is not valid JSON.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The message is not well-formed XML.
    #[error("xml decode failed: {0}")]
    Xml(#[source] roxmltree::Error),

    /// An embedded loose literal list could not be parsed.
    ///
    /// `field` names the payload the list belonged to, so a log line
    /// reads like "server_list: list parse failed: ...".
    #[error("{field}: list parse failed: {source}")]
    Loose {
        field: &'static str,
        #[source]
        source: LooseError,
    },

    /// The message parsed but doesn't have the shape a payload parser
    /// expects, such as a missing field or a field of the wrong type.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// A syntax error in a loose (JavaScript object literal) list.
///
/// `offset` is the byte position in the input where parsing stopped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason} at byte {offset}")]
pub struct LooseError {
    pub offset: usize,
    pub reason: String,
}

impl LooseError {
    pub(crate) fn new(offset: usize, reason: impl Into<String>) -> Self {
        Self {
            offset,
            reason: reason.into(),
        }
    }
}
