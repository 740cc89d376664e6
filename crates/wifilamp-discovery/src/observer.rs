//! Outbound notification surface of the browser.

use crate::primitive::ErrorDetails;
use crate::record::Record;
use async_channel::{Receiver, Sender};
use tracing::warn;

/// Receives browser notifications. Exactly one call per qualifying event.
///
/// Called from the browser's actor; implementations must not block.
pub trait BrowserObserver: Send + Sync {
    /// A new search cycle began with an empty record set.
    fn started_searching(&self);

    fn found_record(&self, record: &Record);

    fn removed_record(&self, record: &Record);

    /// The primitive refused to start browsing.
    fn search_failed(&self, _error: Option<&ErrorDetails>) {}
}

/// Notification as a value, for channel delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserNotification {
    StartedSearching,
    FoundRecord(Record),
    RemovedRecord(Record),
    SearchFailed(Option<ErrorDetails>),
}

/// Observer that forwards every notification into a channel.
pub struct ChannelObserver {
    tx: Sender<BrowserNotification>,
}

impl ChannelObserver {
    /// Creates the observer and the receiving end of its channel.
    pub fn new() -> (Self, Receiver<BrowserNotification>) {
        let (tx, rx) = async_channel::unbounded();
        (Self { tx }, rx)
    }

    fn forward(&self, notification: BrowserNotification) {
        if let Err(e) = self.tx.try_send(notification) {
            warn!(error = %e, "Dropping browser notification");
        }
    }
}

impl BrowserObserver for ChannelObserver {
    fn started_searching(&self) {
        self.forward(BrowserNotification::StartedSearching);
    }

    fn found_record(&self, record: &Record) {
        self.forward(BrowserNotification::FoundRecord(record.clone()));
    }

    fn removed_record(&self, record: &Record) {
        self.forward(BrowserNotification::RemovedRecord(record.clone()));
    }

    fn search_failed(&self, error: Option<&ErrorDetails>) {
        self.forward(BrowserNotification::SearchFailed(error.cloned()));
    }
}
