//! Resolved records and the builder that validates them.

use crate::error::RecordError;
use crate::primitive::{ResolvedService, ServiceHandle};
use crate::txt::TxtRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use wifilamp_core::BrowserConfig;

/// Comparable reference back to the handle a record came from.
///
/// Only used to match removal events; never handed back to the primitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey(ServiceHandle);

impl RecordKey {
    pub fn matches(&self, handle: &ServiceHandle) -> bool {
        &self.0 == handle
    }
}

impl From<&ServiceHandle> for RecordKey {
    fn from(handle: &ServiceHandle) -> Self {
        Self(handle.clone())
    }
}

/// A fully resolved service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Display name with the branding prefix removed
    pub name: String,

    /// Host name as resolved
    pub host_name: String,

    /// Local network endpoint
    pub url: Url,

    /// Device identifier from the TXT metadata
    pub identifier: String,

    pub resolved_at: DateTime<Utc>,

    key: RecordKey,
}

impl Record {
    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// Whether this record originated from `handle`.
    pub fn is_from(&self, handle: &ServiceHandle) -> bool {
        self.key.matches(handle)
    }
}

/// Turns resolved services into records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBuilder {
    removable_prefix: String,
    identifier_key: String,
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::from_config(&BrowserConfig::default())
    }
}

impl RecordBuilder {
    pub fn new(removable_prefix: impl Into<String>, identifier_key: impl Into<String>) -> Self {
        Self {
            removable_prefix: removable_prefix.into(),
            identifier_key: identifier_key.into(),
        }
    }

    pub fn from_config(config: &BrowserConfig) -> Self {
        Self::new(&config.removable_prefix, &config.identifier_key)
    }

    /// Builds a record from a resolved service.
    pub fn build(&self, service: &ResolvedService) -> Result<Record, RecordError> {
        self.build_parts(
            service.host_name.as_deref(),
            service.txt.as_deref(),
            service.handle.name(),
            &service.handle,
        )
    }

    /// Builds a record from its raw parts.
    pub fn build_parts(
        &self,
        host_name: Option<&str>,
        txt: Option<&[u8]>,
        display_name: &str,
        handle: &ServiceHandle,
    ) -> Result<Record, RecordError> {
        let host_name = match host_name {
            Some(host) if !host.is_empty() => host,
            _ => return Err(RecordError::MissingHostName),
        };

        // Local network devices serve plain http; there are no certificates to check.
        let url = Url::parse(&format!("http://{}", host_name)).map_err(|e| {
            RecordError::InvalidEndpoint {
                host: host_name.to_string(),
                reason: e.to_string(),
            }
        })?;

        let txt = TxtRecord::parse(txt.ok_or(RecordError::MissingMetadata)?)
            .map_err(RecordError::MalformedMetadata)?;

        let identifier = match txt.get(&self.identifier_key) {
            Some(Some(value)) => std::str::from_utf8(value)
                .map_err(|_| RecordError::InvalidIdentifier {
                    key: self.identifier_key.clone(),
                })?
                .to_string(),
            _ => {
                return Err(RecordError::MissingIdentifier {
                    key: self.identifier_key.clone(),
                })
            }
        };

        Ok(Record {
            name: self.display_name(display_name),
            host_name: host_name.to_string(),
            url,
            identifier,
            resolved_at: Utc::now(),
            key: RecordKey::from(handle),
        })
    }

    /// Strips the removable prefix once, if present.
    pub fn display_name(&self, name: &str) -> String {
        name.strip_prefix(self.removable_prefix.as_str())
            .unwrap_or(name)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txt;

    fn handle(name: &str) -> ServiceHandle {
        ServiceHandle::new(name, "_wifilamp._tcp.", "local.")
    }

    fn resolved(name: &str, host: Option<&str>, txt: Option<Vec<u8>>) -> ResolvedService {
        ResolvedService {
            handle: handle(name),
            host_name: host.map(str::to_string),
            port: 80,
            addresses: vec![],
            txt,
        }
    }

    fn chipid(value: &[u8]) -> Option<Vec<u8>> {
        Some(txt::encode([("chipid", Some(value))]))
    }

    #[test]
    fn test_build_record() {
        let builder = RecordBuilder::default();
        let service = resolved(
            "The Cave WiFiLamp1",
            Some("wifilamp-ab12.local"),
            chipid(b"XYZ"),
        );

        let record = builder.build(&service).unwrap();
        assert_eq!(record.name, "WiFiLamp1");
        assert_eq!(record.host_name, "wifilamp-ab12.local");
        assert_eq!(record.url.as_str(), "http://wifilamp-ab12.local/");
        assert_eq!(record.url.scheme(), "http");
        assert_eq!(record.url.host_str(), Some("wifilamp-ab12.local"));
        assert_eq!(record.identifier, "XYZ");
        assert!(record.is_from(&service.handle));
        assert!(!record.is_from(&handle("Another")));
    }

    #[test]
    fn test_missing_identifier() {
        let builder = RecordBuilder::default();
        let service = resolved(
            "The Cave WiFiLamp1",
            Some("wifilamp-ab12.local"),
            Some(txt::encode([("version", Some(&b"1.2"[..]))])),
        );

        assert_eq!(
            builder.build(&service),
            Err(RecordError::MissingIdentifier {
                key: "chipid".to_string()
            })
        );
        assert!(builder.build(&service).ok().is_none());
    }

    #[test]
    fn test_identifier_without_value() {
        let builder = RecordBuilder::default();
        let service = resolved(
            "Lamp",
            Some("wifilamp.local"),
            Some(txt::encode([("chipid", None)])),
        );
        assert!(matches!(
            builder.build(&service),
            Err(RecordError::MissingIdentifier { .. })
        ));
    }

    #[test]
    fn test_identifier_not_utf8() {
        let builder = RecordBuilder::default();
        let service = resolved("Lamp", Some("wifilamp.local"), chipid(&[0xff, 0xfe]));
        assert!(matches!(
            builder.build(&service),
            Err(RecordError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_missing_host_name() {
        let builder = RecordBuilder::default();
        assert_eq!(
            builder.build(&resolved("Lamp", None, chipid(b"XYZ"))),
            Err(RecordError::MissingHostName)
        );
        assert_eq!(
            builder.build(&resolved("Lamp", Some(""), chipid(b"XYZ"))),
            Err(RecordError::MissingHostName)
        );
    }

    #[test]
    fn test_invalid_endpoint() {
        let builder = RecordBuilder::default();
        let service = resolved("Lamp", Some("bad host name"), chipid(b"XYZ"));
        assert!(matches!(
            builder.build(&service),
            Err(RecordError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_missing_and_malformed_metadata() {
        let builder = RecordBuilder::default();
        assert_eq!(
            builder.build(&resolved("Lamp", Some("wifilamp.local"), None)),
            Err(RecordError::MissingMetadata)
        );
        assert!(matches!(
            builder.build(&resolved("Lamp", Some("wifilamp.local"), Some(b"\x20short".to_vec()))),
            Err(RecordError::MalformedMetadata(_))
        ));
    }

    #[test]
    fn test_display_name_normalization() {
        let builder = RecordBuilder::default();
        assert_eq!(builder.display_name("The Cave WiFiLamp1"), "WiFiLamp1");
        assert_eq!(builder.display_name("Kitchen Lamp"), "Kitchen Lamp");
        // Only one prefix is removed
        assert_eq!(builder.display_name("The Cave The Cave X"), "The Cave X");
        // Prefix match is exact
        assert_eq!(builder.display_name("the cave Lamp"), "the cave Lamp");
    }

    #[test]
    fn test_custom_prefix_and_key() {
        let builder = RecordBuilder::new("Acme ", "serial");
        let service = resolved(
            "Acme Porch",
            Some("lamp-1.local."),
            Some(txt::encode([("serial", Some(&b"S-1"[..]))])),
        );

        let record = builder.build(&service).unwrap();
        assert_eq!(record.name, "Porch");
        assert_eq!(record.identifier, "S-1");
        assert_eq!(record.host_name, "lamp-1.local.");
    }
}
