//! Outbound half of the kernel connection.
//!
//! The relay never waits for an answer to anything it sends; delivery is
//! the transport's business.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum OutboundRequest {
    Execute {
        code: String,
        silent: bool,
        store_history: bool,
    },
    Complete {
        code: String,
        cursor_pos: usize,
    },
    Inspect {
        code: String,
        cursor_pos: usize,
        detail_level: u8,
    },
    /// Answer to an `input_request`.
    Input { value: String },
}

pub trait KernelTransport: Send + Sync {
    fn send(&self, request: OutboundRequest) -> Result<()>;
}

/// Keeps every request in memory instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<OutboundRequest>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundRequest> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl KernelTransport for RecordingTransport {
    fn send(&self, request: OutboundRequest) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow!("Recording transport lock poisoned"))?
            .push(request);
        Ok(())
    }
}
