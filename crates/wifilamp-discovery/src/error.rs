//! Error types for the discovery crate

use thiserror::Error;

/// Result type alias for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Errors that can occur while setting up or driving discovery.
///
/// Per-instance failures never show up here; they degrade to the instance
/// being absent from the resolved set.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// mDNS service daemon failed to initialize
    #[error("Failed to initialize mDNS daemon: {0}")]
    MdnsInitFailed(String),

    /// Invalid browser configuration
    #[error("Invalid discovery configuration: {0}")]
    InvalidConfig(#[from] wifilamp_core::ConfigError),

    /// The browser actor is no longer running
    #[error("Browser service has stopped")]
    ServiceStopped,
}

/// Reasons a resolved service does not become a record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("resolved service has no host name")]
    MissingHostName,

    #[error("cannot build endpoint from host '{host}': {reason}")]
    InvalidEndpoint { host: String, reason: String },

    #[error("resolved service has no TXT metadata")]
    MissingMetadata,

    #[error("malformed TXT metadata: {0}")]
    MalformedMetadata(String),

    #[error("TXT metadata has no '{key}' value")]
    MissingIdentifier { key: String },

    #[error("TXT value for '{key}' is not valid UTF-8")]
    InvalidIdentifier { key: String },
}
