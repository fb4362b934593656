//! Decoded kernel protocol messages, as handed over by the transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageHeader {
    pub msg_id: String,
    pub msg_type: String,
    pub session: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelMessage {
    pub header: MessageHeader,
    #[serde(default)]
    pub parent_header: MessageHeader,
    #[serde(default)]
    pub content: Value,
}

impl KernelMessage {
    pub fn new(msg_type: &str, content: Value) -> Self {
        Self {
            header: MessageHeader {
                msg_type: msg_type.to_string(),
                ..Default::default()
            },
            parent_header: MessageHeader::default(),
            content,
        }
    }

    /// Same message, marked as a reply to a request from `session`.
    pub fn in_reply_to(mut self, session: &str) -> Self {
        self.parent_header.session = session.to_string();
        self
    }

    pub fn kind(&self) -> MessageKind {
        MessageKind::from_msg_type(&self.header.msg_type)
    }

    /// Whether the request that caused this message came from `session`.
    pub fn is_from_session(&self, session: &str) -> bool {
        !session.is_empty() && self.parent_header.session == session
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.content.get(key).and_then(Value::as_str)
    }

    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.content.get(key).and_then(Value::as_bool)
    }

    pub fn u64_field(&self, key: &str) -> Option<u64> {
        self.content.get(key).and_then(Value::as_u64)
    }
}

/// The closed set of message types the router understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Stream,
    ClearOutput,
    ExecuteInput,
    ExecuteResult,
    DisplayData,
    Error,
    ExecuteReply,
    KernelInfoReply,
    InputRequest,
    Status,
    ShutdownReply,
    Unknown(String),
}

impl MessageKind {
    pub fn from_msg_type(msg_type: &str) -> Self {
        match msg_type {
            "stream" => MessageKind::Stream,
            "clear_output" => MessageKind::ClearOutput,
            "execute_input" => MessageKind::ExecuteInput,
            "execute_result" => MessageKind::ExecuteResult,
            "display_data" => MessageKind::DisplayData,
            "error" => MessageKind::Error,
            "execute_reply" => MessageKind::ExecuteReply,
            "kernel_info_reply" => MessageKind::KernelInfoReply,
            "input_request" => MessageKind::InputRequest,
            "status" => MessageKind::Status,
            "shutdown_reply" => MessageKind::ShutdownReply,
            other => MessageKind::Unknown(other.to_string()),
        }
    }

    /// Control messages are processed whatever session they came from.
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            MessageKind::Status | MessageKind::KernelInfoReply | MessageKind::ShutdownReply
        )
    }
}
