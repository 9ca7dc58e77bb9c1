//! Error types for the template mailer.

use std::path::PathBuf;

/// Top-level error for a single `send`.
#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    #[error("Failed to read template file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot locate e-mail body.")]
    MissingBody,

    #[error("Missing required header: '{field}'")]
    MissingHeader { field: &'static str },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Failures reported by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid {field} address: {reason}")]
    InvalidAddress { field: &'static str, reason: String },

    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Invalid attachment: {0}")]
    Attachment(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("{transport} delivery failed: {reason}")]
    Delivery { transport: String, reason: String },

    #[error("Transport task failed: {0}")]
    Task(String),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Result type alias for the mailer.
pub type Result<T> = std::result::Result<T, MailerError>;
