//! Embedded control channel.
//!
//! Chat clients only share the kernel's "execute code" channel, so presence
//! commands are smuggled through it as a comment line:
//!
//! ```text
//! #<session_id>/{"sender_client_id": "...", "sender": "...", "type": "command", ...}
//! ```
//!
//! The kernel runs the comment as a no-op and echoes it to every client.
//! Parsing is fail-closed: anything that is not exactly this shape for the
//! expected session is treated as ordinary text.

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// The only envelope `type` that carries commands.
pub const COMMAND_TYPE: &str = "command";

// ════════════════════════════════════════════════════════════════════
// Wire types
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender_client_id: String,
    pub sender: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub recipient_client_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub recipient: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<CommandContent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserAction>,
    #[serde(default)]
    pub round_table: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_client: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restriction: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserAction {
    Join,
    Leave,
    Who,
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

impl Envelope {
    /// Both recipient fields empty means a broadcast.
    pub fn is_for_everyone(&self) -> bool {
        self.recipient_client_id.is_empty() && self.recipient.is_empty()
    }

    pub fn is_addressed_to(&self, client_id: &str, user: &str) -> bool {
        self.is_for_everyone()
            || (!self.recipient_client_id.is_empty() && self.recipient_client_id == client_id)
            || (!self.recipient.is_empty() && self.recipient == user)
    }
}

/// Parse `text` as a meta command envelope for `session_id`.
///
/// Returns `None` for anything else: wrong session, missing `/`, a payload
/// that is not exactly one JSON object, or an object of the wrong shape.
pub fn parse(session_id: &str, text: &str) -> Option<Envelope> {
    if session_id.is_empty() {
        return None;
    }

    let payload = text
        .trim_start()
        .strip_prefix('#')?
        .strip_prefix(session_id)?
        .strip_prefix('/')?;

    let value: Value = serde_json::from_str(payload).ok()?;
    if !value.is_object() {
        return None;
    }

    serde_json::from_value(value).ok()
}

// ════════════════════════════════════════════════════════════════════
// Commands
// ════════════════════════════════════════════════════════════════════

/// Fields shared by every command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFields {
    pub sender_client_id: String,
    pub sender: String,
    pub recipient_client_id: String,
    pub recipient: String,
    pub round_table: bool,
    pub last_client: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaCommand {
    AddUser(CommandFields),
    DropUser(CommandFields),
    WhoIsHere(CommandFields),
    StartRoundTable {
        fields: CommandFields,
        restriction: Option<u32>,
    },
    StopRoundTable(CommandFields),
}

impl MetaCommand {
    /// Convert a parsed envelope into a command for the receiving client.
    ///
    /// Envelopes that are not commands, have no content, or are addressed to
    /// somebody else yield `None`.
    pub fn from_envelope(envelope: Envelope, client_id: &str, user: &str) -> Option<Self> {
        if envelope.kind != COMMAND_TYPE {
            return None;
        }

        if !envelope.is_addressed_to(client_id, user) {
            tracing::debug!(
                sender = %envelope.sender,
                recipient = %envelope.recipient,
                "meta command addressed elsewhere"
            );
            return None;
        }

        let content = envelope.content?;
        let fields = CommandFields {
            sender_client_id: envelope.sender_client_id,
            sender: envelope.sender,
            recipient_client_id: envelope.recipient_client_id,
            recipient: envelope.recipient,
            round_table: content.round_table.unwrap_or(false),
            last_client: content.last_client,
        };

        match content.user {
            Some(UserAction::Join) => Some(Self::AddUser(fields)),
            Some(UserAction::Leave) => Some(Self::DropUser(fields)),
            Some(UserAction::Who) => Some(Self::WhoIsHere(fields)),
            None => match content.round_table {
                Some(true) => Some(Self::StartRoundTable {
                    fields,
                    restriction: content.restriction,
                }),
                Some(false) => Some(Self::StopRoundTable(fields)),
                None => None,
            },
        }
    }

    pub fn fields(&self) -> &CommandFields {
        match self {
            Self::AddUser(f)
            | Self::DropUser(f)
            | Self::WhoIsHere(f)
            | Self::StopRoundTable(f)
            | Self::StartRoundTable { fields: f, .. } => f,
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        let f = self.fields();
        let (user, round_table, restriction) = match self {
            Self::AddUser(_) => (Some(UserAction::Join), f.round_table, None),
            Self::DropUser(_) => (Some(UserAction::Leave), f.round_table, None),
            Self::WhoIsHere(_) => (Some(UserAction::Who), f.round_table, None),
            Self::StartRoundTable { restriction, .. } => (None, true, *restriction),
            Self::StopRoundTable(_) => (None, false, None),
        };

        Envelope {
            sender_client_id: f.sender_client_id.clone(),
            sender: f.sender.clone(),
            recipient_client_id: f.recipient_client_id.clone(),
            recipient: f.recipient.clone(),
            kind: COMMAND_TYPE.to_string(),
            content: Some(CommandContent {
                user,
                round_table: Some(round_table),
                last_client: f.last_client,
                restriction,
            }),
        }
    }

    /// Encode as `#<session_id>/<json>`, ready to submit as code.
    pub fn to_wire(&self, session_id: &str) -> Result<String> {
        let json = serde_json::to_string(&self.to_envelope())?;
        Ok(format!("#{}/{}", session_id, json))
    }
}
