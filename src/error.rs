//! Error types for Matsya

use thiserror::Error;

/// Matsya error type
#[derive(Error, Debug)]
pub enum MatsyaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the channel and it cannot be reopened
    #[error("Channel closed: {0}")]
    Closed(String),

    /// Peer link dropped and was re-established; the current exchange is lost
    #[error("Channel reconnected: {0}")]
    Disconnected(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Mission error: {0}")]
    Mission(String),

    #[error("Signal handler error: {0}")]
    Signal(String),

    #[error("Shutdown requested")]
    Shutdown,
}

impl MatsyaError {
    /// Whether a worker loop should stop instead of skipping the cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MatsyaError::Closed(_) | MatsyaError::Shutdown)
    }
}

impl From<toml::de::Error> for MatsyaError {
    fn from(e: toml::de::Error) -> Self {
        MatsyaError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MatsyaError>;
