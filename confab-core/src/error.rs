use thiserror::Error;

use crate::config::ConfigError;

/// Failures that stop a console from starting.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("No async runtime available to host the flush worker")]
    NoRuntime,

    #[error("Invalid chat identity: {0}")]
    Identity(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
