//! Error types for a3s-bot

use thiserror::Error;

/// Errors that can occur in the bot runtime
#[derive(Debug, Error)]
pub enum BotError {
    /// Invalid bot configuration (patterns, step keys, thresholds)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// The transport rejected the bot's credentials
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Sending a message failed
    #[error("Failed to send message to channel '{channel}': {reason}")]
    Transport { channel: String, reason: String },

    /// Lookup miss (store key, channel, user, exchange)
    #[error("Not found: {0}")]
    NotFound(String),

    /// An exchange cursor points at a step index that does not exist
    #[error("exchange step with index {0} not found")]
    StepNotFound(usize),

    /// A step or responder handler reported failure
    #[error("Handler error: {0}")]
    Handler(String),

    /// Attempt to store an empty value
    #[error("error trying to put key {0}: value is empty")]
    EmptyValue(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed cron expression
    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    /// The circuit breaker has tripped; no further sends are allowed
    #[error("Circuit breaker is open")]
    CircuitOpen,

    /// An exchange is already running on the thread
    #[error("Exchange already active on thread '{0}'")]
    ExchangeActive(String),
}

impl BotError {
    /// Convenience constructor for handler failures
    pub fn handler(reason: impl Into<String>) -> Self {
        BotError::Handler(reason.into())
    }
}

/// Result type alias for bot operations
pub type Result<T> = std::result::Result<T, BotError>;
