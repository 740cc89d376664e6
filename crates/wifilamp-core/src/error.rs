//! Error types for the WiFiLamp discovery tooling.
//!
//! The discovery engine itself never fails fatally; these errors cover the
//! ambient surface around it (configuration loading and validation).

use thiserror::Error;

/// Result type alias using WifilampError as the error type.
pub type Result<T> = std::result::Result<T, WifilampError>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum WifilampError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    /// Shorthand for an `InvalidValue` error.
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns the offending field, if the error names one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidValue { field, .. } => Some(field),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("browser.domain", "only local. is supported");
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for 'browser.domain': only local. is supported"
        );
        assert_eq!(err.field(), Some("browser.domain"));
    }

    #[test]
    fn test_wraps_config_error() {
        let err: WifilampError = ConfigError::InvalidFormat {
            reason: "bad yaml".to_string(),
        }
        .into();
        assert!(err.to_string().contains("bad yaml"));

        // Configuration is the only failure outside the discovery crate
        let WifilampError::Config(inner) = err;
        assert_eq!(inner.field(), None);
    }
}
