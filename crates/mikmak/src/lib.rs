//! # mikmak
//!
//! Client engine for the mikmak virtual-world servers.
//!
//! The client logs in through the cluster's login server, picks a game
//! server from the list it returns, logs in there, and joins a room. It
//! keeps the account's state up to date as the server reports it, and
//! reconnects when the connection drops.
//!
//! ## Crates
//!
//! - `mikmak-protocol`: wire codec, loose-list parser, payload parsers
//! - `mikmak-transport`: null-terminated TCP transport and receive loop
//! - `mikmak-session`: handshake, server switch, reconnection, events
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mikmak::prelude::*;
//!
//! # async fn run() -> Result<(), MikmakError> {
//! let mut client = MikmakClient::builder("user", "secret")
//!     .server(KnownServer::Kiwi)
//!     .build();
//!
//! client.events().on_room_list(|rooms| {
//!     for room in rooms {
//!         println!("{} ({}/{})", room.name, room.user_count, room.max_user_count);
//!     }
//! });
//!
//! let end = client.connect().await?;
//! println!("session ended: {end:?}");
//! # Ok(())
//! # }
//! ```

mod error;
pub mod logging;

pub use error::MikmakError;

pub use mikmak_protocol as protocol;
pub use mikmak_session as session;
pub use mikmak_transport as transport;

/// The types most applications need.
pub mod prelude {
    pub use crate::MikmakError;
    pub use mikmak_protocol::{
        AchievementEntry, AchievementKey, InventoryItem, KnownServer, LoginResult,
        RoomDescriptor, ServerDescriptor,
    };
    pub use mikmak_session::{
        ClientBuilder, ClientConfig, EventBus, EventKind, MikmakClient, Phase, SessionEnd,
        SessionEvent, SessionState, ShutdownHandle,
    };
}
