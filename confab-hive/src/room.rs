//! The local view of a chat session.
//!
//! A `ChatRoom` knows who we are, holds the user registry and the current
//! round table, and turns inbound meta commands into [`HiveEvent`]s.
//! It lives on the UI/router thread and is never shared.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::HiveEvent;
use crate::meta::{self, CommandFields, MetaCommand};
use crate::registry::{Departure, Presence, UserRegistry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatIdentity {
    pub user: String,
    pub client_id: String,
}

impl ChatIdentity {
    /// A fresh identity with a random client id.
    pub fn new(user: &str) -> Result<Self> {
        Self::with_client_id(user, &Uuid::new_v4().to_string())
    }

    pub fn with_client_id(user: &str, client_id: &str) -> Result<Self> {
        let user = user.trim();
        if user.is_empty() {
            bail!("Invalid user name: must not be empty");
        }
        if client_id.trim().is_empty() {
            bail!("Invalid client id: must not be empty");
        }
        Ok(Self {
            user: user.to_string(),
            client_id: client_id.to_string(),
        })
    }
}

/// Turn-taking mode started by a moderator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundTable {
    pub moderator: String,
    pub moderator_client_id: String,
    /// Responses each participant may give, if limited.
    pub restriction: Option<u32>,
}

/// How an inbound line relates to the chat protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Not a meta command for this session.
    Plain,
    /// A meta command for this session that we do not act on.
    Dropped,
    Command(MetaCommand),
}

#[derive(Debug)]
pub struct ChatRoom {
    identity: ChatIdentity,
    session_id: String,
    registry: UserRegistry,
    round_table: Option<RoundTable>,
    events: broadcast::Sender<HiveEvent>,
}

impl ChatRoom {
    pub fn new(
        identity: ChatIdentity,
        session_id: impl Into<String>,
    ) -> (Self, broadcast::Receiver<HiveEvent>) {
        let (events, rx) = broadcast::channel(256);
        let room = Self {
            identity,
            session_id: session_id.into(),
            registry: UserRegistry::new(),
            round_table: None,
            events,
        };
        (room, rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HiveEvent> {
        self.events.subscribe()
    }

    pub fn identity(&self) -> &ChatIdentity {
        &self.identity
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn registry(&self) -> &UserRegistry {
        &self.registry
    }

    pub fn round_table(&self) -> Option<&RoundTable> {
        self.round_table.as_ref()
    }

    // ────────────────────────────────────────────────────────────────
    // Inbound
    // ────────────────────────────────────────────────────────────────

    pub fn classify(&self, text: &str) -> Inbound {
        let Some(envelope) = meta::parse(&self.session_id, text) else {
            return Inbound::Plain;
        };

        match MetaCommand::from_envelope(envelope, &self.identity.client_id, &self.identity.user) {
            Some(cmd) => Inbound::Command(cmd),
            None => Inbound::Dropped,
        }
    }

    pub fn parse(&self, text: &str) -> Option<MetaCommand> {
        match self.classify(text) {
            Inbound::Command(cmd) => Some(cmd),
            Inbound::Plain | Inbound::Dropped => None,
        }
    }

    /// Apply a command. Returns a reply that should be sent back, if any.
    pub fn apply(&mut self, cmd: MetaCommand) -> Option<MetaCommand> {
        match cmd {
            MetaCommand::AddUser(f) => {
                let presence = self.registry.insert(&f.sender, &f.sender_client_id);
                if presence != Presence::Unchanged {
                    tracing::info!(user = %f.sender, client = %f.sender_client_id, "user joined");
                    self.emit(HiveEvent::UserJoined {
                        name: f.sender,
                        client_id: f.sender_client_id,
                        new_user: presence == Presence::Joined,
                    });
                }
                None
            }

            MetaCommand::DropUser(f) => {
                let departure = self.registry.remove(&f.sender, &f.sender_client_id);
                if departure != Departure::Unchanged {
                    tracing::info!(user = %f.sender, client = %f.sender_client_id, "user left");
                    self.emit(HiveEvent::UserLeft {
                        name: f.sender,
                        client_id: f.sender_client_id,
                        last_client: departure == Departure::Left,
                    });
                }
                None
            }

            MetaCommand::WhoIsHere(f) => {
                if f.sender_client_id == self.identity.client_id {
                    return None;
                }
                self.emit(HiveEvent::PresenceRequested {
                    from: f.sender.clone(),
                });
                Some(MetaCommand::AddUser(self.fields_to(
                    &f.sender_client_id,
                    &f.sender,
                    None,
                )))
            }

            MetaCommand::StartRoundTable { fields, restriction } => {
                self.round_table = Some(RoundTable {
                    moderator: fields.sender.clone(),
                    moderator_client_id: fields.sender_client_id,
                    restriction,
                });
                self.emit(HiveEvent::RoundTableStarted {
                    moderator: fields.sender,
                    restriction,
                });
                None
            }

            MetaCommand::StopRoundTable(f) => {
                if self.round_table.take().is_some() {
                    self.emit(HiveEvent::RoundTableStopped { moderator: f.sender });
                }
                None
            }
        }
    }

    // ────────────────────────────────────────────────────────────────
    // Outbound
    // ────────────────────────────────────────────────────────────────

    pub fn join(&self) -> MetaCommand {
        MetaCommand::AddUser(self.broadcast_fields(None))
    }

    pub fn leave(&self, last_client: bool) -> MetaCommand {
        MetaCommand::DropUser(self.broadcast_fields(Some(last_client)))
    }

    pub fn who(&self) -> MetaCommand {
        MetaCommand::WhoIsHere(self.broadcast_fields(None))
    }

    pub fn start_round_table(&self, restriction: Option<u32>) -> MetaCommand {
        let mut fields = self.broadcast_fields(None);
        fields.round_table = true;
        MetaCommand::StartRoundTable { fields, restriction }
    }

    pub fn stop_round_table(&self) -> MetaCommand {
        MetaCommand::StopRoundTable(self.broadcast_fields(None))
    }

    /// Wire text for `cmd` in this session.
    pub fn encode(&self, cmd: &MetaCommand) -> Result<String> {
        cmd.to_wire(&self.session_id)
    }

    fn broadcast_fields(&self, last_client: Option<bool>) -> CommandFields {
        self.fields_to("", "", last_client)
    }

    fn fields_to(
        &self,
        recipient_client_id: &str,
        recipient: &str,
        last_client: Option<bool>,
    ) -> CommandFields {
        CommandFields {
            sender_client_id: self.identity.client_id.clone(),
            sender: self.identity.user.clone(),
            recipient_client_id: recipient_client_id.to_string(),
            recipient: recipient.to_string(),
            round_table: self.round_table.is_some(),
            last_client,
        }
    }

    fn emit(&self, event: HiveEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
