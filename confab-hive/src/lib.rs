//! # Confab Hive
//!
//! The chat and user-presence layer.
//! Presence commands travel inside the kernel's ordinary execute channel
//! (see [`meta`]); every client sees them echoed back and keeps its own
//! sorted view of who is connected.

pub mod meta;
pub mod registry;
pub mod room;

pub use meta::{CommandContent, CommandFields, Envelope, MetaCommand, UserAction};
pub use registry::{Departure, Presence, UserEntry, UserRegistry};
pub use room::{ChatIdentity, ChatRoom, Inbound, RoundTable};

use serde::{Deserialize, Serialize};

/// Events emitted by a [`ChatRoom`] whenever presence actually changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HiveEvent {
    /// A client announced itself. `new_user` is false when the name was
    /// already present through another client.
    UserJoined {
        name: String,
        client_id: String,
        new_user: bool,
    },
    /// A client left. `last_client` is true when the name is gone entirely.
    UserLeft {
        name: String,
        client_id: String,
        last_client: bool,
    },
    /// Another client asked everyone to announce themselves.
    PresenceRequested { from: String },
    RoundTableStarted {
        moderator: String,
        restriction: Option<u32>,
    },
    RoundTableStopped { moderator: String },
}
