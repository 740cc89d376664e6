//! Async driver that runs a [`Browser`] as a single actor.
//!
//! The browser and its primitive live on one tokio task. Commands from
//! handles and events from the primitive are processed one at a time, and a
//! snapshot of the record set is published after each one.

use crate::browser::Browser;
use crate::error::{DiscoveryError, Result};
use crate::mdns::MdnsPrimitive;
use crate::observer::BrowserObserver;
use crate::primitive::{event_channel, DiscoveryPrimitive, EventStream};
use crate::record::Record;
use async_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use wifilamp_core::BrowserConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Stop,
    Refresh,
    Shutdown,
}

#[derive(Debug, Default)]
struct Snapshot {
    records: Vec<Record>,
    searching: bool,
}

/// Handle to a running browser actor.
pub struct BrowserService {
    commands: Sender<Command>,
    snapshot: Arc<RwLock<Snapshot>>,
    task: JoinHandle<()>,
}

impl BrowserService {
    /// Moves `browser` onto its own task. `events` must be the stream its
    /// primitive reports into.
    pub fn spawn<P>(browser: Browser<P>, events: EventStream) -> Self
    where
        P: DiscoveryPrimitive + 'static,
    {
        let (commands, command_rx) = async_channel::unbounded();
        let snapshot = Arc::new(RwLock::new(Snapshot::default()));

        let task = tokio::spawn(run(browser, events, command_rx, snapshot.clone()));

        Self {
            commands,
            snapshot,
            task,
        }
    }

    /// Builds a browser over a fresh mDNS daemon and spawns it.
    pub fn mdns(config: &BrowserConfig, observer: Weak<dyn BrowserObserver>) -> Result<Self> {
        let (sink, events) = event_channel();
        let mut browser = Browser::new(config, MdnsPrimitive::new(sink)?)?;
        browser.set_observer(observer);
        Ok(Self::spawn(browser, events))
    }

    pub fn start_search(&self) -> Result<()> {
        self.send(Command::Start)
    }

    pub fn stop_search(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    pub fn refresh(&self) -> Result<()> {
        self.send(Command::Refresh)
    }

    /// Resolved records as of the last handled event.
    pub fn records(&self) -> Vec<Record> {
        self.snapshot.read().records.clone()
    }

    pub fn is_searching(&self) -> bool {
        self.snapshot.read().searching
    }

    /// Stops the actor and waits for it to exit. The primitive is dropped
    /// with it.
    pub async fn shutdown(self) {
        let _ = self.commands.try_send(Command::Shutdown);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Browser task ended abnormally");
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .try_send(command)
            .map_err(|_| DiscoveryError::ServiceStopped)
    }
}

async fn run<P>(
    mut browser: Browser<P>,
    events: EventStream,
    commands: Receiver<Command>,
    snapshot: Arc<RwLock<Snapshot>>,
) where
    P: DiscoveryPrimitive,
{
    info!(service_type = %browser.service_type(), "Browser service started");

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Ok(Command::Start) => browser.start_search(),
                Ok(Command::Stop) => browser.stop_search(),
                Ok(Command::Refresh) => browser.refresh(),
                Ok(Command::Shutdown) | Err(_) => break,
            },
            event = events.recv() => match event {
                Ok(event) => {
                    let kind = event.kind();
                    let outcome = browser.handle_event(event);
                    trace!(event = kind, ?outcome, "Handled discovery event");
                }
                Err(_) => {
                    warn!("Discovery event stream closed");
                    break;
                }
            },
        }

        publish(&browser, &snapshot);
    }

    if browser.is_searching() {
        browser.stop_search();
    }
    *snapshot.write() = Snapshot::default();

    debug!(service_type = %browser.service_type(), "Browser service stopped");
}

fn publish<P: DiscoveryPrimitive>(browser: &Browser<P>, snapshot: &RwLock<Snapshot>) {
    let mut snapshot = snapshot.write();
    snapshot.searching = browser.is_searching();
    if snapshot.records.as_slice() != browser.records() {
        snapshot.records = browser.records().to_vec();
    }
}
