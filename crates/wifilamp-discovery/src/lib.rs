//! mDNS service discovery for WiFiLamp devices
//!
//! This crate browses the local network for one DNS-SD service type and keeps
//! a live, deduplicated set of resolved records:
//! - [`Browser`] is the state machine: start/stop/refresh, pending
//!   resolutions, resolved records and observer notifications
//! - [`RecordBuilder`] validates resolved services into [`Record`]s
//! - [`DiscoveryPrimitive`] is the seam to the platform discovery service,
//!   with [`MdnsPrimitive`] implementing it over `mdns-sd`
//! - [`BrowserService`] runs a browser as a single tokio actor
//! - [`DeviceClassifier`] maps records onto a device taxonomy
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wifilamp_core::BrowserConfig;
//! use wifilamp_discovery::{BrowserNotification, BrowserObserver, BrowserService, ChannelObserver};
//!
//! #[tokio::main]
//! async fn main() -> wifilamp_discovery::Result<()> {
//!     let (observer, notifications) = ChannelObserver::new();
//!     let observer: Arc<dyn BrowserObserver> = Arc::new(observer);
//!
//!     let service = BrowserService::mdns(&BrowserConfig::default(), Arc::downgrade(&observer))?;
//!     service.start_search()?;
//!
//!     while let Ok(notification) = notifications.recv().await {
//!         if let BrowserNotification::FoundRecord(record) = notification {
//!             println!("{} at {}", record.name, record.url);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod browser;
pub mod classify;
pub mod error;
pub mod mdns;
pub mod observer;
pub mod primitive;
pub mod record;
pub mod service;
pub mod txt;

pub use browser::{Browser, BrowserState, EventOutcome};
pub use classify::{Device, DeviceClassifier, DeviceKind, PrefixClassifier};
pub use error::{DiscoveryError, RecordError, Result};
pub use mdns::MdnsPrimitive;
pub use observer::{BrowserNotification, BrowserObserver, ChannelObserver};
pub use primitive::{
    event_channel, DiscoveryEvent, DiscoveryPrimitive, ErrorDetails, EventSink, EventStream,
    ResolvedService, ServiceHandle,
};
pub use record::{Record, RecordBuilder, RecordKey};
pub use service::BrowserService;
