//! Error types for the KartNet environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The receiving end of a channel is gone (shutdown)
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Context operation failed (e.g. a poisoned clock lock)
    #[error("Context error: {0}")]
    ContextError(String),
}

impl EnvError {
    /// Creates a channel-closed error.
    pub fn closed(channel: impl Into<String>) -> Self {
        Self::ChannelClosed(channel.into())
    }

    /// Creates a context error.
    pub fn context(msg: impl std::fmt::Display) -> Self {
        Self::ContextError(msg.to_string())
    }
}
