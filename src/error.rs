//! Error types for karmabot.

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ledger persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Failed to open ledger: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    // Rendered verbatim when a query target has no ledger history.
    #[error("no such user")]
    NoSuchUser,
}

/// Chat transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect: {reason}")]
    ConnectFailed { reason: String },

    #[error("Transport disconnected: {reason}")]
    Disconnected { reason: String },

    #[error("Failed to send message: {reason}")]
    SendFailed { reason: String },

    #[error("User lookup failed for {id}: {reason}")]
    LookupFailed { id: String, reason: String },

    #[error("Failed to acknowledge event {envelope_id}: {reason}")]
    AckFailed { envelope_id: String, reason: String },

    #[error("API call {method} failed: {reason}")]
    Api { method: String, reason: String },
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
