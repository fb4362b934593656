//! Kernel message router.
//!
//! Runs on the UI thread. Each inbound message becomes at most one output
//! item (or a chat command, or a [`ConsoleAction`]); nothing the kernel or
//! another chat participant sends can make routing fail.

use crate::editor::ExternalEditor;
use crate::item::{OutputItem, StreamSource};
use crate::message::{KernelMessage, MessageKind};
use crate::queue::OutputQueue;
use crate::transport::{KernelTransport, OutboundRequest};

use anyhow::Result;
use confab_hive::{ChatRoom, Inbound, MetaCommand};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Effects that are not output and belong to the owning UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsoleAction {
    /// The kernel asked the console to exit.
    Exit { keep_kernel: bool },
    /// Pre-fill the next input prompt.
    SetNextInput { text: String, replace: bool },
    /// Another client shut the kernel down or restarted it.
    KernelShutdown { restart: bool },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KernelState {
    #[default]
    Unknown,
    Starting,
    Busy,
    Idle,
}

pub struct MessageRouter {
    queue: OutputQueue,
    room: ChatRoom,
    editor: ExternalEditor,
    transport: Arc<dyn KernelTransport>,
    actions: mpsc::UnboundedSender<ConsoleAction>,
    kernel_state: KernelState,
    banner_shown: bool,
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("room", &self.room)
            .field("editor", &self.editor)
            .field("transport", &"Arc<dyn KernelTransport>")
            .field("kernel_state", &self.kernel_state)
            .field("banner_shown", &self.banner_shown)
            .finish()
    }
}

impl MessageRouter {
    pub fn new(
        queue: OutputQueue,
        room: ChatRoom,
        editor: ExternalEditor,
        transport: Arc<dyn KernelTransport>,
    ) -> (Self, mpsc::UnboundedReceiver<ConsoleAction>) {
        let (actions, rx) = mpsc::unbounded_channel();
        let router = Self {
            queue,
            room,
            editor,
            transport,
            actions,
            kernel_state: KernelState::Unknown,
            banner_shown: false,
        };
        (router, rx)
    }

    pub fn room(&self) -> &ChatRoom {
        &self.room
    }

    pub fn kernel_state(&self) -> KernelState {
        self.kernel_state
    }

    /// Forget the banner so the next kernel info reply shows it again.
    pub fn reset_kernel_session(&mut self) {
        self.banner_shown = false;
    }

    // ────────────────────────────────────────────────────────────────
    // Inbound
    // ────────────────────────────────────────────────────────────────

    /// Route one kernel message.
    ///
    /// Messages caused by other clients are dropped unless `show_other`,
    /// except control messages and chat commands, which always apply.
    pub fn route(&mut self, msg: &KernelMessage, from_here: bool, show_other: bool) {
        let kind = msg.kind();

        let chat = match kind {
            MessageKind::ExecuteInput => self.room.classify(msg.str_field("code").unwrap_or("")),
            _ => Inbound::Plain,
        };
        let control = kind.is_control() || chat != Inbound::Plain;

        if !from_here && !show_other && !control {
            tracing::trace!(msg_type = %msg.header.msg_type, "suppressed message from other client");
            return;
        }

        match kind {
            MessageKind::Stream => self.handle_stream(msg),
            MessageKind::ClearOutput => {
                let wait = msg.bool_field("wait").unwrap_or(false);
                self.push(OutputItem::ClearOutput { wait });
            }
            MessageKind::ExecuteInput => self.handle_execute_input(msg, chat),
            MessageKind::ExecuteResult => self.handle_execute_result(msg),
            MessageKind::DisplayData => self.handle_display_data(msg),
            MessageKind::Error => {
                tracing::debug!("error message ignored; traceback comes with the execute reply");
            }
            MessageKind::ExecuteReply => self.handle_execute_reply(msg),
            MessageKind::KernelInfoReply => self.handle_kernel_info(msg),
            MessageKind::InputRequest => {
                self.push(OutputItem::InputRequest {
                    prompt: msg.str_field("prompt").unwrap_or("").to_string(),
                    password: msg.bool_field("password").unwrap_or(false),
                });
            }
            MessageKind::Status => self.handle_status(msg),
            MessageKind::ShutdownReply => self.handle_shutdown_reply(msg, from_here),
            MessageKind::Unknown(msg_type) => {
                tracing::debug!(%msg_type, "ignoring unknown message type");
            }
        }
    }

    fn handle_stream(&mut self, msg: &KernelMessage) {
        let source = StreamSource::from_name(msg.str_field("name").unwrap_or("stdout"));
        let text = msg.str_field("text").unwrap_or("");
        self.push(OutputItem::stream(text, source));
    }

    fn handle_execute_input(&mut self, msg: &KernelMessage, chat: Inbound) {
        match chat {
            Inbound::Plain => {
                let code = msg.str_field("code").unwrap_or("");
                let count = msg.u64_field("execution_count").unwrap_or(0);
                self.push(OutputItem::input(code, count));
            }
            Inbound::Dropped => {}
            Inbound::Command(cmd) => self.dispatch(cmd),
        }
    }

    fn handle_execute_result(&mut self, msg: &KernelMessage) {
        let Some(text) = plain_text(&msg.content) else {
            tracing::debug!("execute_result without text/plain dropped");
            return;
        };
        let count = msg.u64_field("execution_count").unwrap_or(0);
        self.push(OutputItem::result(text, count));
    }

    fn handle_display_data(&mut self, msg: &KernelMessage) {
        let Some(text) = plain_text(&msg.content) else {
            tracing::debug!("display_data without text/plain dropped");
            return;
        };
        let mut text = text.to_string();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        self.push(OutputItem::stream(text, StreamSource::Stdout));
    }

    fn handle_execute_reply(&mut self, msg: &KernelMessage) {
        match msg.str_field("status").unwrap_or("") {
            "ok" => {
                if let Some(payloads) = msg.content.get("payload").and_then(Value::as_array) {
                    for payload in payloads {
                        self.handle_payload(payload);
                    }
                }
            }
            "error" => self.push(OutputItem::error_text(format_traceback(&msg.content))),
            "aborted" => self.push(OutputItem::error_text("ERROR: execution aborted\n")),
            other => tracing::warn!(status = %other, "execute_reply with unexpected status"),
        }
    }

    fn handle_payload(&mut self, payload: &Value) {
        let source = payload.get("source").and_then(Value::as_str).unwrap_or("");
        match source {
            "page" => {
                let data = payload.get("data").unwrap_or(&Value::Null);
                let text = data
                    .get("text/plain")
                    .or_else(|| payload.get("text"))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                let html = data
                    .get("text/html")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                self.push(OutputItem::PageDoc { text, html });
            }
            "edit_magic" => {
                let filename = payload.get("filename").and_then(Value::as_str).unwrap_or("");
                let line = payload.get("line_number").and_then(Value::as_u64);
                if let Err(e) = self.editor.open(filename, line) {
                    tracing::warn!(error = %e, "editor launch failed");
                    self.push(OutputItem::error_text(format!("{}\n", e)));
                }
            }
            "ask_exit" => {
                let keep_kernel = payload.get("keepkernel").and_then(Value::as_bool).unwrap_or(false);
                self.act(ConsoleAction::Exit { keep_kernel });
            }
            "set_next_input" => {
                let text = payload.get("text").and_then(Value::as_str).unwrap_or("").to_string();
                let replace = payload.get("replace").and_then(Value::as_bool).unwrap_or(false);
                self.act(ConsoleAction::SetNextInput { text, replace });
            }
            other => tracing::warn!(source = %other, "unknown payload source ignored"),
        }
    }

    fn handle_kernel_info(&mut self, msg: &KernelMessage) {
        if self.banner_shown {
            return;
        }
        let Some(text) = msg.str_field("banner") else {
            return;
        };

        let help_links = msg
            .content
            .get("help_links")
            .and_then(Value::as_array)
            .map(|links| {
                links
                    .iter()
                    .filter_map(|link| {
                        let label = link.get("text")?.as_str()?;
                        let url = link.get("url")?.as_str()?;
                        Some((label.to_string(), url.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        self.banner_shown = true;
        self.push(OutputItem::Banner {
            text: text.to_string(),
            help_links,
            continuation: false,
        });
    }

    fn handle_status(&mut self, msg: &KernelMessage) {
        self.kernel_state = match msg.str_field("execution_state").unwrap_or("") {
            "starting" => {
                self.banner_shown = false;
                KernelState::Starting
            }
            "busy" => KernelState::Busy,
            "idle" => KernelState::Idle,
            _ => self.kernel_state,
        };
    }

    fn handle_shutdown_reply(&mut self, msg: &KernelMessage, from_here: bool) {
        if from_here {
            return;
        }
        let restart = msg.bool_field("restart").unwrap_or(false);
        let notice = if restart {
            "Kernel has been restarted by another client.\n"
        } else {
            "Kernel has been shut down by another client.\n"
        };
        self.push(OutputItem::error_text(notice));
        self.act(ConsoleAction::KernelShutdown { restart });
    }

    fn dispatch(&mut self, cmd: MetaCommand) {
        tracing::debug!(command = ?cmd, "meta command");
        if let Some(reply) = self.room.apply(cmd) {
            if let Err(e) = self.send_meta(&reply) {
                tracing::warn!(error = %e, "failed to answer meta command");
            }
        }
    }

    fn push(&self, item: OutputItem) {
        self.queue.push(item);
    }

    fn act(&self, action: ConsoleAction) {
        // The UI may not listen for actions.
        let _ = self.actions.send(action);
    }

    // ────────────────────────────────────────────────────────────────
    // Outbound
    // ────────────────────────────────────────────────────────────────

    /// Submit user code.
    pub fn execute(&self, code: &str) -> Result<()> {
        self.transport.send(OutboundRequest::Execute {
            code: code.to_string(),
            silent: false,
            store_history: true,
        })
    }

    /// Answer the kernel's pending input request.
    pub fn reply_input(&self, value: &str) -> Result<()> {
        self.transport.send(OutboundRequest::Input {
            value: value.to_string(),
        })
    }

    pub fn complete(&self, code: &str, cursor_pos: usize) -> Result<()> {
        self.transport.send(OutboundRequest::Complete {
            code: code.to_string(),
            cursor_pos,
        })
    }

    pub fn inspect(&self, code: &str, cursor_pos: usize, detail_level: u8) -> Result<()> {
        self.transport.send(OutboundRequest::Inspect {
            code: code.to_string(),
            cursor_pos,
            detail_level,
        })
    }

    /// Announce ourselves to the session.
    pub fn announce(&self) -> Result<()> {
        self.send_meta(&self.room.join())
    }

    pub fn depart(&self, last_client: bool) -> Result<()> {
        self.send_meta(&self.room.leave(last_client))
    }

    pub fn request_presence(&self) -> Result<()> {
        self.send_meta(&self.room.who())
    }

    pub fn start_round_table(&self, restriction: Option<u32>) -> Result<()> {
        self.send_meta(&self.room.start_round_table(restriction))
    }

    pub fn stop_round_table(&self) -> Result<()> {
        self.send_meta(&self.room.stop_round_table())
    }

    /// Meta commands must be echoed to every client, so they are not
    /// silent; they are kept out of history.
    fn send_meta(&self, cmd: &MetaCommand) -> Result<()> {
        let code = self.room.encode(cmd)?;
        self.transport.send(OutboundRequest::Execute {
            code,
            silent: false,
            store_history: false,
        })
    }
}

fn plain_text(content: &Value) -> Option<&str> {
    content.get("data")?.get("text/plain")?.as_str()
}

fn format_traceback(content: &Value) -> String {
    let lines: Vec<&str> = content
        .get("traceback")
        .and_then(Value::as_array)
        .map(|tb| tb.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut text = if lines.is_empty() {
        let ename = content.get("ename").and_then(Value::as_str).unwrap_or("Error");
        let evalue = content.get("evalue").and_then(Value::as_str).unwrap_or("");
        format!("{}: {}", ename, evalue)
    } else {
        lines.join("\n")
    };

    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}
