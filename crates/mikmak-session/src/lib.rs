//! Session layer for the mikmak client.
//!
//! This crate takes the client from "nothing" to "standing in a room":
//!
//! 1. **Handshake** ([`handshake`]): version check, login, server list,
//!    second login on the chosen server, room join. Written as pure
//!    transition functions over [`SessionState`].
//! 2. **Orchestration** ([`MikmakClient`]): dials connections, applies
//!    the transitions, switches servers, and reconnects with a bounded
//!    retry budget.
//! 3. **Notifications** ([`EventBus`]): typed subscribers for server
//!    lists, room lists, login results, achievements, and inventory.
//! 4. **Achievements** ([`merge()`]): folding update reports into the
//!    progress already known.
//!
//! # How it fits in the stack
//!
//! ```text
//! Application (above)  ← subscribes to events, reads SessionState
//!     ↕
//! Session Layer (this crate)  ← handshake, server switch, reconnection
//!     ↕
//! Transport Layer (below)  ← TCP connection, receive loop
//! ```

#![allow(async_fn_in_trait)]

mod config;
mod error;
mod events;
pub mod handshake;
mod merge;
mod orchestrator;
mod state;

pub use config::{ClientBuilder, ClientConfig};
pub use error::SessionError;
pub use events::{EventBus, EventKind, SessionEvent};
pub use handshake::Phase;
pub use merge::merge;
pub use orchestrator::{MikmakClient, SessionEnd, ShutdownHandle};
pub use state::{SessionPatch, SessionState};
