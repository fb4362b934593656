//! Recorded kernel sessions.
//!
//! A recording is JSON lines, one kernel message per line. Each line may
//! carry a `from_here` flag saying whether this console caused the
//! message; it defaults to true.

use anyhow::{Context, Result};
use confab_core::{KernelMessage, KernelTransport, OutboundRequest};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedMessage {
    #[serde(default = "default_from_here")]
    pub from_here: bool,
    #[serde(flatten)]
    pub message: KernelMessage,
}

fn default_from_here() -> bool {
    true
}

/// Parse one recording line. Blank lines yield `None`.
pub fn parse_line(line_no: usize, line: &str) -> Result<Option<RecordedMessage>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let recorded = serde_json::from_str(line)
        .with_context(|| format!("Invalid recording at line {}", line_no))?;
    Ok(Some(recorded))
}

/// Nothing answers during a replay, so outbound requests are only logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

impl KernelTransport for LogTransport {
    fn send(&self, request: OutboundRequest) -> Result<()> {
        match &request {
            OutboundRequest::Execute {
                code,
                silent,
                store_history,
            } => tracing::info!(%code, silent, store_history, "execute request"),
            OutboundRequest::Complete { code, cursor_pos } => {
                tracing::info!(%code, cursor_pos, "complete request")
            }
            OutboundRequest::Inspect {
                code,
                cursor_pos,
                detail_level,
            } => tracing::info!(%code, cursor_pos, detail_level, "inspect request"),
            OutboundRequest::Input { .. } => tracing::info!("input reply"),
        }
        Ok(())
    }
}
