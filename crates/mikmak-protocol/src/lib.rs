//! Wire protocol for the mikmak client.
//!
//! This crate knows how to talk to the server, but not when:
//!
//! - **Codec** ([`Envelope`], [`encode_command`], [`encode_system_action`],
//!   [`Framer`]): building outgoing messages and cutting the inbound byte
//!   stream into complete ones.
//! - **Decoding** ([`decode_xt`], [`decode_xml`], [`decode_loose_list`]):
//!   the three syntaxes a message body can be written in.
//! - **Payload parsers** ([`parse_server_list`], [`parse_room_list`], ...):
//!   typed views over the messages the session layer reacts to.
//! - **Errors** ([`ProtocolError`], [`LooseError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (messages, payloads) → Session (handshake)
//! ```

mod codec;
mod error;
mod loose;
mod parse;
mod types;
mod xml;

pub use codec::{
    decode_xml, decode_xt, encode_command, encode_system_action, frame, Envelope, Framer,
    SysEnvelope, XtEnvelope, DEFAULT_EXTENSION, DEFAULT_SYS_ROOM, DEFAULT_XT_ROOM,
    FRAME_TERMINATOR,
};
pub use error::{LooseError, ProtocolError};
pub use loose::decode_loose_list;
pub use parse::{
    parse_achievements, parse_inventory, parse_login_result, parse_room_list, parse_server_list,
};
pub use types::{
    AchievementEntry, AchievementKey, AchievementReport, InventoryItem, KnownServer, LoginResult,
    RoomDescriptor, ServerDescriptor, ServerListReport, CLIENT_VERSION, CLUSTER_PASSWORD_PREFIX,
    JOIN_ROOM_COMMAND, LOGIN_ZONE,
};
pub use xml::XmlElement;
