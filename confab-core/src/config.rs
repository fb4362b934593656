//! Console configuration, loaded from a JSON file.
//!
//! Every field has a default, so an empty object (or no file at all) is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::queue::DEFAULT_FLUSH_INTERVAL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Minimum pause between flush cycles.
    pub flush_interval_ms: u64,
    /// Show output caused by other clients of the same kernel.
    pub show_other: bool,
    pub user_name: String,
    /// Shared chat secret. Generated per console when absent.
    pub session_id: Option<String>,
    pub editor: Option<String>,
    /// Editor template used when a line number is known.
    pub editor_line: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL.as_millis() as u64,
            show_other: true,
            user_name: default_user_name(),
            session_id: None,
            editor: None,
            editor_line: None,
        }
    }
}

fn default_user_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "anonymous".to_string())
}

impl RelayConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Never zero; a zero interval would make the worker spin.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }
}
