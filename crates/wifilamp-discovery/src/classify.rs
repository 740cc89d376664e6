//! Device classification policy.
//!
//! The browser never decides what a record *is*; consumers plug in a
//! [`DeviceClassifier`] to map records onto their own device taxonomy.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;
use wifilamp_core::ClassifierConfig;

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceKind(String);

impl DeviceKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

pub trait DeviceClassifier: Send + Sync {
    fn classify(&self, record: &Record) -> DeviceKind;
}

impl<F> DeviceClassifier for F
where
    F: Fn(&Record) -> DeviceKind + Send + Sync,
{
    fn classify(&self, record: &Record) -> DeviceKind {
        self(record)
    }
}

/// Classifies by host name prefix. First matching rule wins.
#[derive(Debug, Clone)]
pub struct PrefixClassifier {
    rules: Vec<(String, DeviceKind)>,
    fallback: DeviceKind,
}

impl PrefixClassifier {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            fallback: DeviceKind::new(fallback),
        }
    }

    pub fn with_rule(mut self, prefix: impl Into<String>, kind: impl Into<String>) -> Self {
        self.rules.push((prefix.into(), DeviceKind::new(kind)));
        self
    }

    pub fn from_config(config: &ClassifierConfig) -> Self {
        config
            .rules
            .iter()
            .fold(Self::new(&config.fallback_kind), |classifier, rule| {
                classifier.with_rule(&rule.prefix, &rule.kind)
            })
    }
}

impl DeviceClassifier for PrefixClassifier {
    fn classify(&self, record: &Record) -> DeviceKind {
        self.rules
            .iter()
            .find(|(prefix, _)| record.host_name.starts_with(prefix.as_str()))
            .map(|(_, kind)| kind.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Consumer view of a classified record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub kind: DeviceKind,
    pub identifier: String,
    pub name: String,
    pub local_network_url: Url,
}

impl Device {
    pub fn from_record(record: &Record, classifier: &dyn DeviceClassifier) -> Self {
        Self {
            kind: classifier.classify(record),
            identifier: record.identifier.clone(),
            name: record.name.clone(),
            local_network_url: record.url.clone(),
        }
    }
}
