//! Envelope encoding, stream framing, and structural decoding.
//!
//! The server speaks two envelope dialects over the same socket:
//!
//! ```text
//! xt  (JSON): {"b":{"c":"avt_joinRoom","p":{"auto":1},"r":-1,"x":"ExtManager"},"t":"xt"}
//! sys (XML):  <msg t='sys'><body action='verChk' r='0'><ver v='165' /></body></msg>
//! ```
//!
//! Every message on the wire is terminated by a single `0x00` byte. The
//! [`Framer`] turns the raw byte stream back into those messages.

use serde_json::Value;

use crate::xml::XmlElement;
use crate::ProtocolError;

/// The byte that terminates every message on the wire.
pub const FRAME_TERMINATOR: u8 = 0x00;

/// Extension name used by every xt command the client sends.
pub const DEFAULT_EXTENSION: &str = "ExtManager";

/// Room id for xt commands that aren't addressed to a specific room.
pub const DEFAULT_XT_ROOM: i64 = -1;

/// Room id for sys actions that aren't addressed to a specific room.
pub const DEFAULT_SYS_ROOM: i64 = 0;

// ---------------------------------------------------------------------------
// Outgoing envelopes
// ---------------------------------------------------------------------------

/// A JSON ("xt") extension command.
#[derive(Debug, Clone, PartialEq)]
pub struct XtEnvelope {
    pub command: String,
    pub room: i64,
    pub extension: String,
    /// Command parameters. Key order is preserved on the wire.
    pub payload: Value,
}

/// An XML ("sys") system action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysEnvelope {
    pub action: String,
    pub room: i64,
    /// Raw inner XML, inserted verbatim.
    pub body: String,
}

/// One complete outgoing protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Xt(XtEnvelope),
    Sys(SysEnvelope),
}

impl Envelope {
    /// Builds an xt command addressed to the default extension and room.
    pub fn command(command: impl Into<String>, payload: Value) -> Self {
        Self::Xt(XtEnvelope {
            command: command.into(),
            room: DEFAULT_XT_ROOM,
            extension: DEFAULT_EXTENSION.to_string(),
            payload,
        })
    }

    /// Builds a sys action addressed to the default room.
    pub fn system(action: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Sys(SysEnvelope {
            action: action.into(),
            room: DEFAULT_SYS_ROOM,
            body: body.into(),
        })
    }

    /// Renders the envelope to its wire string (without the terminator).
    pub fn encode(&self) -> String {
        match self {
            Self::Xt(xt) => {
                encode_command(&xt.command, &xt.payload, &xt.extension, xt.room)
            }
            Self::Sys(sys) => {
                encode_system_action(&sys.action, &sys.body, sys.room)
            }
        }
    }
}

/// Encodes an xt command.
///
/// The key order (`b.c`, `b.p`, `b.r`, `b.x`, `t`) is fixed, separators
/// are compact, and non-ASCII text is written as literal UTF-8 rather
/// than `\u` escapes. Usernames on this server are commonly Hebrew, and
/// the server compares them byte-for-byte.
pub fn encode_command(
    cmd: &str,
    params: &Value,
    extension: &str,
    room: i64,
) -> String {
    // `Value`'s Display impl writes compact JSON and only escapes what
    // JSON requires, so each piece is already in wire form.
    format!(
        r#"{{"b":{{"c":{},"p":{},"r":{},"x":{}}},"t":"xt"}}"#,
        Value::from(cmd),
        params,
        room,
        Value::from(extension),
    )
}

/// Encodes a sys action. `body` is inserted verbatim.
pub fn encode_system_action(action: &str, body: &str, room: i64) -> String {
    format!("<msg t='sys'><body action='{action}' r='{room}'>{body}</body></msg>")
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// Splits `buffer` into complete messages and the unterminated remainder.
///
/// Each segment before a `0x00` byte becomes one message. Invalid UTF-8
/// is replaced with U+FFFD instead of being rejected, so this never
/// fails. The returned slice holds only bytes after the last terminator.
pub fn frame(buffer: &[u8]) -> (Vec<String>, &[u8]) {
    let mut messages = Vec::new();
    let mut rest = buffer;

    while let Some(pos) = rest.iter().position(|&b| b == FRAME_TERMINATOR) {
        messages.push(String::from_utf8_lossy(&rest[..pos]).into_owned());
        rest = &rest[pos + 1..];
    }

    (messages, rest)
}

/// Accumulates raw socket reads and yields complete messages.
///
/// Chunk boundaries don't matter: a message split across any number of
/// reads comes out whole once its terminator arrives.
#[derive(Debug, Default)]
pub struct Framer {
    buffer: Vec<u8>,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every message it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let (messages, consumed) = {
            let (messages, rest) = frame(&self.buffer);
            (messages, self.buffer.len() - rest.len())
        };
        self.buffer.drain(..consumed);

        messages
    }

    /// Bytes received but not yet terminated.
    pub fn remainder(&self) -> &[u8] {
        &self.buffer
    }
}

// ---------------------------------------------------------------------------
// Structural decoding
// ---------------------------------------------------------------------------

/// Parses an xt message into a generic JSON value.
///
/// Fails only on malformed JSON; the shape is checked by the payload
/// parsers in [`crate::parse`].
pub fn decode_xt(message: &str) -> Result<Value, ProtocolError> {
    serde_json::from_str(message).map_err(ProtocolError::Decode)
}

/// Parses a sys message into an owned element tree.
pub fn decode_xml(message: &str) -> Result<XmlElement, ProtocolError> {
    XmlElement::parse(message)
}
