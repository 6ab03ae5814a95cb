//! Error types for bulk-relay.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Mail transport is not configured (set SMTP_HOST and credentials)")]
    MailNotConfigured,
}

/// Inbound-request validation errors. Always surfaced to the caller with a
/// client-error status, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing or empty required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidField { field: String, message: String },
}

/// Messaging-transport errors. Per-recipient failures are isolated and
/// counted by the dispatch loop; they never abort a batch.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send to {to}: {reason}")]
    SendFailed { to: String, reason: String },

    #[error("Existence check failed: {0}")]
    CheckFailed(String),

    #[error("Failed to save inbound document: {0}")]
    SaveFailed(String),

    #[error("Blacklist operation failed: {0}")]
    BlacklistFailed(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Transport health check failed: {name}")]
    HealthCheckFailed { name: String },
}

/// Mail delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP send to {address} failed: {reason}")]
    Send { address: String, reason: String },

    #[error("SMTP connectivity check failed: {0}")]
    Verify(String),
}

/// Identifier-extraction errors. A missing upload path is surfaced as a
/// chat message, non-fatal to the session.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
