//! Error type for the headless runner.

use serf_core::error::GameError;
use thiserror::Error;

/// Everything that can stop the headless runner.
#[derive(Error, Debug)]
pub enum HeadlessError {
    /// Config file not found.
    #[error("Config file not found: {0}")]
    ConfigNotFound(String),
    /// Failed to read or write a file or stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// Failed to encode or decode JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// The simulation rejected an operation.
    #[error(transparent)]
    Game(#[from] GameError),
}

/// Result alias for the headless crate.
pub type Result<T> = std::result::Result<T, HeadlessError>;
