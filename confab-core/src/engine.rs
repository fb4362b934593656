use crate::config::RelayConfig;
use crate::editor::ExternalEditor;
use crate::error::RelayError;
use crate::message::KernelMessage;
use crate::queue::{FlushHandle, FlushLoop, OutputQueue, OutputSink};
use crate::router::{ConsoleAction, MessageRouter};
use crate::transport::KernelTransport;

use anyhow::Result;
use confab_hive::{ChatIdentity, ChatRoom, HiveEvent};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

/// One open console: router on the caller's thread, flush worker in the
/// background. The UI holds one instance per tab.
#[derive(Debug)]
pub struct ConsoleEngine<S> {
    pub router: MessageRouter,
    /// Exit / next-input / shutdown requests for the UI.
    pub actions: mpsc::UnboundedReceiver<ConsoleAction>,
    /// Presence changes for the UI.
    pub hive_events: broadcast::Receiver<HiveEvent>,
    show_other: bool,
    flush: FlushHandle<S>,
}

impl<S: OutputSink + 'static> ConsoleEngine<S> {
    /// Wire everything up and start the flush worker on the current tokio
    /// runtime.
    pub fn start(
        config: &RelayConfig,
        sink: S,
        transport: Arc<dyn KernelTransport>,
    ) -> Result<Self, RelayError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| RelayError::NoRuntime)?;

        // 1. Chat identity + room
        let identity = ChatIdentity::new(&config.user_name)
            .map_err(|e| RelayError::Identity(e.to_string()))?;
        let session_id = config
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let (room, hive_events) = ChatRoom::new(identity, session_id);

        // 2. Queue + flush worker
        let (queue, queue_rx) = OutputQueue::new();
        let flush = FlushLoop::new(queue_rx, sink, config.flush_interval()).spawn_on(&runtime);

        // 3. Router
        let editor = ExternalEditor::new(config.editor.clone(), config.editor_line.clone());
        let (router, actions) = MessageRouter::new(queue, room, editor, transport);

        tracing::info!(
            user = %router.room().identity().user,
            client = %router.room().identity().client_id,
            "console engine started"
        );

        Ok(Self {
            router,
            actions,
            hive_events,
            show_other: config.show_other,
            flush,
        })
    }

    pub fn show_other(&self) -> bool {
        self.show_other
    }

    pub fn set_show_other(&mut self, show_other: bool) {
        self.show_other = show_other;
    }

    /// Route a kernel message with the configured `show_other` policy.
    pub fn route(&mut self, msg: &KernelMessage, from_here: bool) {
        self.router.route(msg, from_here, self.show_other);
    }

    /// Stop the flush worker. Anything not yet emitted is discarded.
    pub async fn shutdown(self) -> Result<S> {
        tracing::info!("console engine shutting down");
        self.flush.shutdown().await
    }

    /// Drop the producer side and wait until everything queued has been
    /// emitted.
    pub async fn drain(self) -> Result<S> {
        let Self { router, flush, .. } = self;
        drop(router);
        flush.join().await
    }
}
