//! Browser state machine.
//!
//! Owns the discovery lifecycle for one service type: asks the primitive to
//! browse, tracks handles awaiting resolution, keeps the resolved record set
//! and tells the observer about changes. All state changes happen in
//! [`Browser::handle_event`]; the request methods only talk to the primitive.

use crate::error::{RecordError, Result};
use crate::observer::BrowserObserver;
use crate::primitive::{DiscoveryEvent, DiscoveryPrimitive, ErrorDetails, ResolvedService, ServiceHandle};
use crate::record::{Record, RecordBuilder};
use std::sync::Weak;
use std::time::Duration;
use tracing::{debug, error, info};
use wifilamp_core::BrowserConfig;

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserState {
    Idle,
    Searching,
}

/// What handling one event did.
///
/// Observers only hear about a subset of these; the rest are silent by
/// design of the notification surface and exist for callers and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// A search cycle began; observers were told.
    Started,
    /// Browsing stopped. `restarting` when a refresh started a new browse.
    Stopped { restarting: bool },
    /// Browsing could not start.
    SearchFailed,
    /// A handle joined the pending set and resolution was requested.
    Pending,
    /// A record was added; observers were told.
    RecordAdded,
    /// A record was removed; observers were told.
    RecordRemoved,
    /// A pending handle was withdrawn before it resolved.
    Withdrawn,
    /// The resolved data did not make a valid record.
    RecordRejected(RecordError),
    /// Resolution failed or timed out.
    ResolveFailed,
    /// The event did not apply to the current state.
    Ignored,
}

pub struct Browser<P> {
    service_type: String,
    domain: String,
    resolve_timeout: Duration,
    builder: RecordBuilder,
    primitive: P,
    observer: Option<Weak<dyn BrowserObserver>>,
    pending: Vec<ServiceHandle>,
    resolved: Vec<Record>,
    state: BrowserState,
    restart_requested: bool,
    // A browse request is out and has not been answered yet
    start_requested: bool,
    // A stop request is out and has not been confirmed yet
    stop_requested: bool,
}

impl<P: DiscoveryPrimitive> Browser<P> {
    /// Creates an idle browser.
    pub fn new(config: &BrowserConfig, primitive: P) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            service_type: config.service_type.clone(),
            domain: config.domain.clone(),
            resolve_timeout: config.resolve_timeout(),
            builder: RecordBuilder::from_config(config),
            primitive,
            observer: None,
            pending: Vec::new(),
            resolved: Vec::new(),
            state: BrowserState::Idle,
            restart_requested: false,
            start_requested: false,
            stop_requested: false,
        })
    }

    /// Sets the observer. The browser keeps only a weak reference.
    pub fn set_observer(&mut self, observer: Weak<dyn BrowserObserver>) {
        self.observer = Some(observer);
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn state(&self) -> BrowserState {
        self.state
    }

    pub fn is_searching(&self) -> bool {
        self.state == BrowserState::Searching
    }

    /// Current resolved records, in resolution order.
    pub fn records(&self) -> &[Record] {
        &self.resolved
    }

    /// Handles still awaiting resolution, in discovery order.
    pub fn pending(&self) -> &[ServiceHandle] {
        &self.pending
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested
    }

    pub fn primitive(&self) -> &P {
        &self.primitive
    }

    /// Starts browsing unless a search is running or already requested.
    pub fn start_search(&mut self) {
        if self.is_searching() || self.start_requested {
            debug!(service_type = %self.service_type, "Search already active");
            return;
        }

        info!(
            service_type = %self.service_type,
            domain = %self.domain,
            "Starting search"
        );
        self.start_requested = true;
        self.primitive.browse(&self.service_type, &self.domain);
    }

    /// Asks the primitive to stop. State changes when it confirms.
    pub fn stop_search(&mut self) {
        if self.stop_requested {
            debug!(service_type = %self.service_type, "Stop already pending");
            return;
        }

        debug!(service_type = %self.service_type, "Stopping search");
        self.stop_requested = true;
        self.primitive.stop();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Tears down a running search and starts a fresh one once the stop is
    /// confirmed, or starts searching when idle.
    pub fn refresh(&mut self) {
        if !self.is_searching() {
            self.start_search();
            return;
        }

        if self.restart_requested {
            debug!("Restart already pending");
            return;
        }

        info!(service_type = %self.service_type, "Refreshing search");
        self.restart_requested = true;
        self.stop_search();
    }

    /// Applies one primitive event.
    pub fn handle_event(&mut self, event: DiscoveryEvent) -> EventOutcome {
        match event {
            DiscoveryEvent::DidNotSearch(details) => self.on_did_not_search(details),
            DiscoveryEvent::WillSearch => self.on_will_search(),
            DiscoveryEvent::DidStop => self.on_did_stop(),
            DiscoveryEvent::Found {
                handle,
                more_coming,
            } => self.on_found(handle, more_coming),
            DiscoveryEvent::Removed {
                handle,
                more_coming,
            } => self.on_removed(handle, more_coming),
            DiscoveryEvent::Resolved(service) => self.on_resolved(service),
            DiscoveryEvent::ResolveFailed { handle, error } => self.on_resolve_failed(handle, error),
        }
    }

    fn on_did_not_search(&mut self, details: ErrorDetails) -> EventOutcome {
        error!(
            service_type = %self.service_type,
            error = %details,
            "Search failed to start"
        );
        self.clear_results();
        self.state = BrowserState::Idle;
        self.start_requested = false;
        self.stop_requested = false;
        self.restart_requested = false;
        self.notify(|observer| observer.search_failed(Some(&details)));
        EventOutcome::SearchFailed
    }

    fn on_will_search(&mut self) -> EventOutcome {
        debug!(service_type = %self.service_type, "Browser will search");
        self.clear_results();
        self.state = BrowserState::Searching;
        self.start_requested = false;
        self.notify(|observer| observer.started_searching());
        EventOutcome::Started
    }

    fn on_did_stop(&mut self) -> EventOutcome {
        debug!(service_type = %self.service_type, "Browser did stop search");
        self.clear_results();
        self.state = BrowserState::Idle;
        self.start_requested = false;
        self.stop_requested = false;

        if self.restart_requested {
            self.restart_requested = false;
            info!(service_type = %self.service_type, "Restarting search");
            self.start_search();
            return EventOutcome::Stopped { restarting: true };
        }

        EventOutcome::Stopped { restarting: false }
    }

    fn on_found(&mut self, handle: ServiceHandle, more_coming: bool) -> EventOutcome {
        debug!(service = %handle, more_coming, "Browser did find service");

        if self.pending.contains(&handle) || self.resolved.iter().any(|r| r.is_from(&handle)) {
            debug!(service = %handle, "Service already known");
            return EventOutcome::Ignored;
        }

        self.primitive.stop_resolve(&handle);
        self.primitive.resolve(&handle, self.resolve_timeout);
        self.pending.push(handle);
        EventOutcome::Pending
    }

    fn on_removed(&mut self, handle: ServiceHandle, more_coming: bool) -> EventOutcome {
        debug!(service = %handle, more_coming, "Browser did remove service");

        let was_pending = self.remove_pending(&handle);
        if was_pending {
            self.primitive.stop_resolve(&handle);
        }

        match self.resolved.iter().position(|r| r.is_from(&handle)) {
            Some(index) => {
                let record = self.resolved.remove(index);
                self.notify(|observer| observer.removed_record(&record));
                EventOutcome::RecordRemoved
            }
            None if was_pending => EventOutcome::Withdrawn,
            None => EventOutcome::Ignored,
        }
    }

    fn on_resolved(&mut self, service: ResolvedService) -> EventOutcome {
        let handle = service.handle.clone();
        let was_pending = self.remove_pending(&handle);
        self.primitive.stop_resolve(&handle);

        if !was_pending {
            // Straggler from a torn-down search, or a handle that was withdrawn
            debug!(service = %handle, "Ignoring resolution for unknown service");
            return EventOutcome::Ignored;
        }

        match self.builder.build(&service) {
            Ok(record) => {
                debug!(
                    service = %handle,
                    url = %record.url,
                    identifier = %record.identifier,
                    "Browser did resolve address"
                );
                self.resolved.push(record);
                if let Some(record) = self.resolved.last() {
                    self.notify(|observer| observer.found_record(record));
                }
                EventOutcome::RecordAdded
            }
            Err(e) => {
                debug!(service = %handle, reason = %e, "Dropping resolved service");
                EventOutcome::RecordRejected(e)
            }
        }
    }

    fn on_resolve_failed(&mut self, handle: ServiceHandle, error: ErrorDetails) -> EventOutcome {
        debug!(service = %handle, error = %error, "Browser did not resolve address");

        if self.remove_pending(&handle) {
            EventOutcome::ResolveFailed
        } else {
            EventOutcome::Ignored
        }
    }

    fn remove_pending(&mut self, handle: &ServiceHandle) -> bool {
        match self.pending.iter().position(|h| h == handle) {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => false,
        }
    }

    fn clear_results(&mut self) {
        if !self.pending.is_empty() || !self.resolved.is_empty() {
            debug!(
                pending = self.pending.len(),
                resolved = self.resolved.len(),
                "Clearing results"
            );
        }
        self.pending.clear();
        self.resolved.clear();
    }

    fn notify(&self, f: impl FnOnce(&dyn BrowserObserver)) {
        match self.observer.as_ref().map(Weak::upgrade) {
            Some(Some(observer)) => f(&*observer),
            Some(None) => debug!("Browser observer has been dropped"),
            None => {}
        }
    }
}
