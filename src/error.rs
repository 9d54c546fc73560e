//! Error types for replyloop.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Missing or invalid configuration. Always raised before any network I/O.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox or outbound transport failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Mailbox {op} failed: {reason}")]
    Mailbox { op: String, reason: String },

    #[error("Provider {provider} send failed: {reason}")]
    SendFailed { provider: String, reason: String },

    #[error("Provider {provider} rejected message with status {status}: {body}")]
    Rejected {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{op} timed out after {timeout:?}")]
    Timeout { op: String, timeout: Duration },
}

/// Generation collaborator failure.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} returned unusable content: {reason}")]
    Unusable { provider: String, reason: String },

    #[error("Generation timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

/// Ledger / processed-set persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record in {path} at line {line}: {reason}")]
    Malformed {
        path: String,
        line: usize,
        reason: String,
    },
}

/// Per-message failure while scanning a mailbox.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Failed to fetch message {uid}: {source}")]
    Fetch {
        uid: String,
        #[source]
        source: TransportError,
    },

    #[error("Failed to record message {uid} as processed: {source}")]
    Store {
        uid: String,
        #[source]
        source: StoreError,
    },
}

/// Outbound dispatch failure.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid recipient address: {0:?}")]
    InvalidRecipient(String),
}

/// Result type alias for replyloop.
pub type Result<T> = std::result::Result<T, Error>;
