//! The seam between the browser and the platform discovery service.
//!
//! A [`DiscoveryPrimitive`] only issues requests. Everything it learns comes
//! back later as a [`DiscoveryEvent`] pushed into the [`EventSink`] it was
//! built with.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Sending half of the primitive → browser event channel.
pub type EventSink = async_channel::Sender<DiscoveryEvent>;

/// Receiving half of the primitive → browser event channel.
pub type EventStream = async_channel::Receiver<DiscoveryEvent>;

/// Creates an unbounded event channel. Primitives must never block on
/// delivering an event.
pub fn event_channel() -> (EventSink, EventStream) {
    async_channel::unbounded()
}

/// Opaque reference to one discovered service instance.
///
/// Identity is `(name, service_type, domain)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceHandle {
    name: String,
    service_type: String,
    domain: String,
}

impl ServiceHandle {
    pub fn new(
        name: impl Into<String>,
        service_type: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.into(),
            domain: domain.into(),
        }
    }

    /// Splits a DNS-SD full name (`<instance>.<type><domain>`) into a handle.
    ///
    /// Returns `None` when `fullname` does not belong to the given type and
    /// domain or has an empty instance label.
    pub fn from_fullname(fullname: &str, service_type: &str, domain: &str) -> Option<Self> {
        let ty_domain = format!(".{}{}", service_type, domain);
        let name = fullname.strip_suffix(ty_domain.as_str())?;
        if name.is_empty() {
            return None;
        }
        Some(Self::new(name, service_type, domain))
    }

    /// Instance name as advertised, before any display normalization.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// DNS-SD full name, e.g. `The Cave Lamp._wifilamp._tcp.local.`
    pub fn fullname(&self) -> String {
        format!("{}.{}{}", self.name, self.service_type, self.domain)
    }
}

impl fmt::Display for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.name, self.service_type, self.domain)
    }
}

/// Failure details reported by the primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Platform error code, when the platform has one
    pub code: Option<i64>,
    pub message: String,
}

impl ErrorDetails {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::new(format!("resolution timed out after {}s", timeout.as_secs_f32()))
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

/// What the primitive knows about a successfully resolved instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedService {
    pub handle: ServiceHandle,
    pub host_name: Option<String>,
    pub port: u16,
    pub addresses: Vec<IpAddr>,
    /// Raw TXT record in DNS-SD wire format
    pub txt: Option<Vec<u8>>,
}

/// Events delivered by the primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// The browse request could not start
    DidNotSearch(ErrorDetails),
    /// Browsing is about to begin
    WillSearch,
    /// Browsing has fully stopped
    DidStop,
    Found {
        handle: ServiceHandle,
        more_coming: bool,
    },
    Removed {
        handle: ServiceHandle,
        more_coming: bool,
    },
    Resolved(ResolvedService),
    ResolveFailed {
        handle: ServiceHandle,
        error: ErrorDetails,
    },
}

impl DiscoveryEvent {
    /// Short event label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DidNotSearch(_) => "did_not_search",
            Self::WillSearch => "will_search",
            Self::DidStop => "did_stop",
            Self::Found { .. } => "found",
            Self::Removed { .. } => "removed",
            Self::Resolved(_) => "resolved",
            Self::ResolveFailed { .. } => "resolve_failed",
        }
    }
}

/// Platform discovery service driven by the browser.
///
/// Every method returns immediately. Outcomes arrive as events.
pub trait DiscoveryPrimitive: Send {
    /// Begin browsing `service_type` in `domain`. Answers with
    /// [`DiscoveryEvent::WillSearch`] or [`DiscoveryEvent::DidNotSearch`].
    fn browse(&mut self, service_type: &str, domain: &str);

    /// Stop browsing. Answers with [`DiscoveryEvent::DidStop`].
    fn stop(&mut self);

    /// Resolve one handle. Answers with [`DiscoveryEvent::Resolved`] or
    /// [`DiscoveryEvent::ResolveFailed`] once `timeout` expires.
    fn resolve(&mut self, handle: &ServiceHandle, timeout: Duration);

    /// Drop any in-flight resolution for `handle`. No event.
    fn stop_resolve(&mut self, handle: &ServiceHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_from_fullname() {
        let handle = ServiceHandle::from_fullname(
            "The Cave WiFiLamp1._wifilamp._tcp.local.",
            "_wifilamp._tcp.",
            "local.",
        )
        .unwrap();

        assert_eq!(handle.name(), "The Cave WiFiLamp1");
        assert_eq!(handle.service_type(), "_wifilamp._tcp.");
        assert_eq!(handle.domain(), "local.");
        assert_eq!(handle.fullname(), "The Cave WiFiLamp1._wifilamp._tcp.local.");
        assert_eq!(handle.to_string(), handle.fullname());
    }

    #[test]
    fn test_handle_from_foreign_fullname() {
        assert!(ServiceHandle::from_fullname("x._http._tcp.local.", "_wifilamp._tcp.", "local.")
            .is_none());
        assert!(
            ServiceHandle::from_fullname("._wifilamp._tcp.local.", "_wifilamp._tcp.", "local.")
                .is_none()
        );
    }

    #[test]
    fn test_handle_identity() {
        let a = ServiceHandle::new("Lamp", "_wifilamp._tcp.", "local.");
        let b = ServiceHandle::new("Lamp", "_wifilamp._tcp.", "local.");
        let c = ServiceHandle::new("Lamp", "_other._tcp.", "local.");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_error_details_display() {
        assert_eq!(ErrorDetails::new("no network").to_string(), "no network");
        assert_eq!(
            ErrorDetails::new("busy").with_code(-72003).to_string(),
            "busy (code -72003)"
        );
    }
}
