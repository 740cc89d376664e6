//! Configuration management for WiFiLamp discovery.
//!
//! Supports:
//! - Loading from YAML files
//! - Environment variable overrides (`WIFILAMP__<SECTION>__<FIELD>`)
//! - Validation of all settings

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Root configuration.
///
/// # Examples
///
/// ```
/// use wifilamp_core::config::AppConfig;
///
/// let config = AppConfig::from_yaml("browser:\n  removable_prefix: \"Acme \"\n").unwrap();
/// assert_eq!(config.browser.removable_prefix, "Acme ");
/// assert_eq!(config.browser.service_type, "_wifilamp._tcp.");
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Browser and record builder settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Device classification rules
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration using the `config` crate: the file at `path` (if
    /// given) overlaid with `WIFILAMP__*` environment variables.
    pub fn from_config_builder(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let source = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<environment>".to_string());

        let config = builder
            .add_source(
                config::Environment::with_prefix("WIFILAMP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: source,
                reason: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.browser.validate()?;
        self.classifier.validate()?;
        self.logging.parse_level()?;
        Ok(())
    }
}

/// Settings for the browser state machine and the record builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// DNS-SD service type, e.g. `_wifilamp._tcp.`
    #[serde(default = "default_service_type")]
    pub service_type: String,

    /// Search domain. Multicast DNS only serves `local.`
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Branding prefix stripped from instance names
    #[serde(default = "default_removable_prefix")]
    pub removable_prefix: String,

    /// TXT key carrying the device identifier
    #[serde(default = "default_identifier_key")]
    pub identifier_key: String,

    /// Per-handle resolution timeout (seconds)
    #[serde(default = "default_resolve_timeout")]
    pub resolve_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            service_type: default_service_type(),
            domain: default_domain(),
            removable_prefix: default_removable_prefix(),
            identifier_key: default_identifier_key(),
            resolve_timeout_secs: default_resolve_timeout(),
        }
    }
}

impl BrowserConfig {
    /// Returns the resolution timeout as a Duration.
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// Validates the browser settings.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        validate_service_type(&self.service_type)?;

        if self.domain != "local." {
            return Err(ConfigError::invalid(
                "browser.domain",
                format!("'{}' is not a multicast DNS domain (expected local.)", self.domain),
            ));
        }

        if self.identifier_key.is_empty() {
            return Err(ConfigError::invalid("browser.identifier_key", "cannot be empty"));
        }

        if self.identifier_key.contains('=') {
            return Err(ConfigError::invalid(
                "browser.identifier_key",
                "TXT keys cannot contain '='",
            ));
        }

        if self.resolve_timeout_secs == 0 {
            return Err(ConfigError::invalid("browser.resolve_timeout_secs", "cannot be 0"));
        }

        Ok(())
    }
}

/// Checks for the `_name._tcp.` / `_name._udp.` shape, trailing dot included.
fn validate_service_type(service_type: &str) -> std::result::Result<(), ConfigError> {
    let labels: Vec<&str> = match service_type.strip_suffix('.') {
        Some(name) => name.split('.').collect(),
        None => Vec::new(),
    };

    let valid = match labels.as_slice() {
        [name, proto] => {
            name.len() > 1
                && name.starts_with('_')
                && (*proto == "_tcp" || *proto == "_udp")
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            "browser.service_type",
            format!("'{}' is not of the form _name._tcp.", service_type),
        ))
    }
}

/// A single host-prefix classification rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixRule {
    /// Host name prefix to match
    pub prefix: String,

    /// Kind assigned when the prefix matches
    pub kind: String,
}

/// Device classification rules. First matching rule wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_rules")]
    pub rules: Vec<PrefixRule>,

    /// Kind for records no rule matches
    #[serde(default = "default_fallback_kind")]
    pub fallback_kind: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            fallback_kind: default_fallback_kind(),
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.fallback_kind.is_empty() {
            return Err(ConfigError::invalid("classifier.fallback_kind", "cannot be empty"));
        }

        for rule in &self.rules {
            if rule.prefix.is_empty() {
                return Err(ConfigError::invalid(
                    "classifier.rules",
                    format!("rule for kind '{}' has an empty prefix", rule.kind),
                ));
            }
        }

        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        self.level.parse().map_err(|_| {
            ConfigError::invalid("logging.level", format!("Invalid log level: {}", self.level))
                .into()
        })
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
}

// Default configuration values
fn default_service_type() -> String {
    "_wifilamp._tcp.".to_string()
}

fn default_domain() -> String {
    "local.".to_string()
}

fn default_removable_prefix() -> String {
    "The Cave ".to_string()
}

fn default_identifier_key() -> String {
    "chipid".to_string()
}

fn default_resolve_timeout() -> u64 {
    10
}

fn default_rules() -> Vec<PrefixRule> {
    vec![PrefixRule {
        prefix: "wifilamp".to_string(),
        kind: "WiFiLamp".to_string(),
    }]
}

fn default_fallback_kind() -> String {
    "Unknown".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WifilampError;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.browser.service_type, "_wifilamp._tcp.");
        assert_eq!(config.browser.domain, "local.");
        assert_eq!(config.browser.removable_prefix, "The Cave ");
        assert_eq!(config.browser.identifier_key, "chipid");
        assert_eq!(config.browser.resolve_timeout(), Duration::from_secs(10));
        assert_eq!(config.classifier.fallback_kind, "Unknown");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
browser:
  service_type: "_lamp._udp."
  resolve_timeout_secs: 3
classifier:
  rules:
    - prefix: "lamp"
      kind: "Lamp"
    - prefix: "strip"
      kind: "LedStrip"
  fallback_kind: "Other"
logging:
  level: debug
  format: json
"#;

        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.browser.service_type, "_lamp._udp.");
        assert_eq!(config.browser.resolve_timeout_secs, 3);
        // Untouched fields keep their defaults
        assert_eq!(config.browser.identifier_key, "chipid");
        assert_eq!(config.classifier.rules.len(), 2);
        assert_eq!(config.classifier.fallback_kind, "Other");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.parse_level().unwrap(), Level::DEBUG);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_overrides_file() {
        use std::io::Write;

        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "browser:\n  removable_prefix: \"Acme \"\n  resolve_timeout_secs: 5"
        )
        .unwrap();

        std::env::set_var("WIFILAMP__BROWSER__RESOLVE_TIMEOUT_SECS", "42");
        let config = AppConfig::from_config_builder(Some(file.path()));
        std::env::remove_var("WIFILAMP__BROWSER__RESOLVE_TIMEOUT_SECS");

        let config = config.unwrap();
        assert_eq!(config.browser.resolve_timeout_secs, 42);
        assert_eq!(config.browser.removable_prefix, "Acme ");
        assert_eq!(config.browser.identifier_key, "chipid");
        config.validate().unwrap();
    }

    #[test]
    fn test_config_builder_missing_file() {
        let err = AppConfig::from_config_builder(Some(Path::new("/nonexistent/wifilamp.yaml")))
            .unwrap_err();
        assert!(matches!(
            err,
            WifilampError::Config(ConfigError::LoadFailed { .. })
        ));
    }

    #[test]
    fn test_invalid_yaml() {
        let result = AppConfig::from_yaml("browser: [not, a, map]");
        assert!(matches!(
            result,
            Err(WifilampError::Config(ConfigError::InvalidFormat { .. }))
        ));
    }

    #[test]
    fn test_service_type_validation() {
        for good in ["_wifilamp._tcp.", "_x._udp."] {
            assert!(validate_service_type(good).is_ok(), "{good}");
        }

        for bad in [
            "wifilamp._tcp.",
            "_wifilamp._tcp",
            "_wifilamp._sctp.",
            "_._tcp.",
            "_a._tcp.local.",
            "",
        ] {
            assert!(validate_service_type(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_browser_validation() {
        for domain in ["example.com.", "local"] {
            let config = BrowserConfig {
                domain: domain.to_string(),
                ..Default::default()
            };
            assert_eq!(config.validate().unwrap_err().field(), Some("browser.domain"));
        }

        let config = BrowserConfig {
            resolve_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BrowserConfig {
            identifier_key: "chip=id".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_classifier_validation() {
        let config = ClassifierConfig {
            rules: vec![PrefixRule {
                prefix: String::new(),
                kind: "Lamp".to_string(),
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let config = LoggingConfig {
            level: "loud".to_string(),
            ..Default::default()
        };
        assert!(config.parse_level().is_err());
    }
}
