//! Discovery primitive backed by the `mdns-sd` daemon.
//!
//! `mdns-sd` resolves instances on its own as soon as it sees them, so
//! resolution here is a rendezvous: a `resolve` request is answered from the
//! cache of resolved instances, or as soon as the daemon resolves the
//! instance, or with a timeout failure.

use crate::error::{DiscoveryError, Result};
use crate::primitive::{
    DiscoveryEvent, DiscoveryPrimitive, ErrorDetails, EventSink, ResolvedService, ServiceHandle,
};
use crate::txt;
use mdns_sd::{ServiceDaemon, ServiceEvent as MdnsEvent, ServiceInfo};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// How often outstanding resolutions are checked for expiry
const SWEEP_INTERVAL: Duration = Duration::from_millis(250);

/// Requests from the primitive to its pump task.
#[derive(Debug)]
enum PumpOp {
    Resolve(ServiceHandle, Duration),
    Forget(ServiceHandle),
}

struct ActiveBrowse {
    ty_domain: String,
    ops: mpsc::UnboundedSender<PumpOp>,
    task: JoinHandle<()>,
    stopped: Arc<AtomicBool>,
}

/// [`DiscoveryPrimitive`] over a private `mdns_sd::ServiceDaemon`.
///
/// Must be driven from within a tokio runtime.
pub struct MdnsPrimitive {
    daemon: ServiceDaemon,
    events: EventSink,
    active: Option<ActiveBrowse>,
    // Set by the pump of a browse being stopped once it reports DidStop
    stopping: Option<Arc<AtomicBool>>,
}

impl MdnsPrimitive {
    /// Creates the primitive and its mDNS daemon.
    pub fn new(events: EventSink) -> Result<Self> {
        let daemon = ServiceDaemon::new().map_err(|e| {
            DiscoveryError::MdnsInitFailed(format!("Failed to create mDNS daemon: {}", e))
        })?;

        info!("mDNS daemon created");

        Ok(Self {
            daemon,
            events,
            active: None,
            stopping: None,
        })
    }

    fn send_op(&self, op: PumpOp) {
        match &self.active {
            Some(active) => {
                if active.ops.send(op).is_err() {
                    debug!("Browse pump already finished");
                }
            }
            None => {
                if let PumpOp::Resolve(handle, _) = op {
                    emit(
                        &self.events,
                        DiscoveryEvent::ResolveFailed {
                            handle,
                            error: ErrorDetails::new("not browsing"),
                        },
                    );
                }
            }
        }
    }
}

impl DiscoveryPrimitive for MdnsPrimitive {
    fn browse(&mut self, service_type: &str, domain: &str) {
        if let Some(active) = &self.active {
            warn!(ty_domain = %active.ty_domain, "Browse already active");
            return;
        }

        let ty_domain = format!("{}{}", service_type, domain);

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                emit(
                    &self.events,
                    DiscoveryEvent::DidNotSearch(ErrorDetails::new(e.to_string())),
                );
                return;
            }
        };

        let receiver = match self.daemon.browse(&ty_domain) {
            Ok(receiver) => receiver,
            Err(e) => {
                warn!(ty_domain = %ty_domain, error = %e, "Failed to browse");
                emit(
                    &self.events,
                    DiscoveryEvent::DidNotSearch(ErrorDetails::new(e.to_string())),
                );
                return;
            }
        };

        info!(ty_domain = %ty_domain, "Browsing");

        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let stopped = Arc::new(AtomicBool::new(false));
        let pump = Pump::new(service_type, domain, self.events.clone(), stopped.clone());
        let task = runtime.spawn(pump.run(receiver, ops_rx));

        self.stopping = None;
        self.active = Some(ActiveBrowse {
            ty_domain,
            ops: ops_tx,
            task,
            stopped,
        });
    }

    fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            match &self.stopping {
                Some(stopped) if !stopped.load(Ordering::Acquire) => {
                    debug!("Stop already in flight");
                }
                _ => emit(&self.events, DiscoveryEvent::DidStop),
            }
            return;
        };

        // On success the pump reports DidStop when the daemon confirms
        match self.daemon.stop_browse(&active.ty_domain) {
            Ok(()) => self.stopping = Some(active.stopped),
            Err(e) => {
                warn!(ty_domain = %active.ty_domain, error = %e, "Failed to stop browse");
                active.task.abort();
                self.stopping = None;
                emit(&self.events, DiscoveryEvent::DidStop);
            }
        }
    }

    fn resolve(&mut self, handle: &ServiceHandle, timeout: Duration) {
        self.send_op(PumpOp::Resolve(handle.clone(), timeout));
    }

    fn stop_resolve(&mut self, handle: &ServiceHandle) {
        self.send_op(PumpOp::Forget(handle.clone()));
    }
}

impl Drop for MdnsPrimitive {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
        }
        if let Err(e) = self.daemon.shutdown() {
            debug!(error = %e, "Failed to shut down mDNS daemon");
        }
    }
}

/// Per-browse task translating daemon events into primitive events.
struct Pump {
    service_type: String,
    domain: String,
    events: EventSink,
    cache: ResolveCache,
    started: bool,
    stopped: Arc<AtomicBool>,
}

impl Pump {
    fn new(service_type: &str, domain: &str, events: EventSink, stopped: Arc<AtomicBool>) -> Self {
        Self {
            service_type: service_type.to_string(),
            domain: domain.to_string(),
            events,
            cache: ResolveCache::default(),
            started: false,
            stopped,
        }
    }

    async fn run(
        mut self,
        receiver: mdns_sd::Receiver<MdnsEvent>,
        mut ops: mpsc::UnboundedReceiver<PumpOp>,
    ) {
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);

        loop {
            tokio::select! {
                event = receiver.recv_async() => match event {
                    Ok(event) => {
                        if !self.on_mdns_event(event) {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "mDNS receiver closed");
                        self.report_stopped();
                        break;
                    }
                },
                Some(op) = ops.recv() => self.on_op(op),
                _ = sweep.tick() => {
                    for (handle, timeout) in self.cache.expire(Instant::now()) {
                        emit(
                            &self.events,
                            DiscoveryEvent::ResolveFailed {
                                handle,
                                error: ErrorDetails::timeout(timeout),
                            },
                        );
                    }
                }
            }
        }

        debug!(service_type = %self.service_type, "Browse pump stopped");
    }

    /// Returns false once browsing has stopped.
    fn on_mdns_event(&mut self, event: MdnsEvent) -> bool {
        match event {
            MdnsEvent::SearchStarted(ty) => {
                // The daemon repeats this for every query round
                if !self.started {
                    self.started = true;
                    debug!(ty = %ty, "Search started");
                    emit(&self.events, DiscoveryEvent::WillSearch);
                }
            }
            MdnsEvent::ServiceFound(_, fullname) => {
                if let Some(handle) = self.handle(&fullname) {
                    trace!(service = %handle, "Service found");
                    emit(
                        &self.events,
                        DiscoveryEvent::Found {
                            handle,
                            more_coming: false,
                        },
                    );
                }
            }
            MdnsEvent::ServiceResolved(info) => {
                if let Some(resolved) = resolved_from_info(&info, &self.service_type, &self.domain)
                {
                    trace!(service = %resolved.handle, "Service resolved");
                    if let Some(answer) = self.cache.insert(resolved) {
                        emit(&self.events, DiscoveryEvent::Resolved(answer));
                    }
                }
            }
            MdnsEvent::ServiceRemoved(_, fullname) => {
                if let Some(handle) = self.handle(&fullname) {
                    trace!(service = %handle, "Service removed");
                    self.cache.remove(&handle);
                    emit(
                        &self.events,
                        DiscoveryEvent::Removed {
                            handle,
                            more_coming: false,
                        },
                    );
                }
            }
            MdnsEvent::SearchStopped(ty) => {
                debug!(ty = %ty, "Search stopped");
                self.report_stopped();
                return false;
            }
            #[allow(unreachable_patterns)]
            _ => {}
        }

        true
    }

    /// Marks the browse stopped before the browser can hear about it.
    fn report_stopped(&self) {
        self.stopped.store(true, Ordering::Release);
        emit(&self.events, DiscoveryEvent::DidStop);
    }

    fn on_op(&mut self, op: PumpOp) {
        match op {
            PumpOp::Resolve(handle, timeout) => {
                if let Some(answer) = self.cache.request(handle, timeout, Instant::now()) {
                    emit(&self.events, DiscoveryEvent::Resolved(answer));
                }
            }
            PumpOp::Forget(handle) => self.cache.forget(&handle),
        }
    }

    fn handle(&self, fullname: &str) -> Option<ServiceHandle> {
        let handle = ServiceHandle::from_fullname(fullname, &self.service_type, &self.domain);
        if handle.is_none() {
            debug!(fullname, "Ignoring instance of another service type");
        }
        handle
    }
}

/// Resolved instances seen by the daemon and resolutions waiting for one.
#[derive(Debug, Default)]
struct ResolveCache {
    resolved: HashMap<ServiceHandle, ResolvedService>,
    waiting: HashMap<ServiceHandle, (Instant, Duration)>,
}

impl ResolveCache {
    /// Records a resolution. Returns it when a request is waiting on it.
    fn insert(&mut self, service: ResolvedService) -> Option<ResolvedService> {
        let answer = self
            .waiting
            .remove(&service.handle)
            .map(|_| service.clone());
        self.resolved.insert(service.handle.clone(), service);
        answer
    }

    /// Requests a resolution. Answers immediately when already resolved.
    fn request(
        &mut self,
        handle: ServiceHandle,
        timeout: Duration,
        now: Instant,
    ) -> Option<ResolvedService> {
        if let Some(service) = self.resolved.get(&handle) {
            return Some(service.clone());
        }
        self.waiting.insert(handle, (now + timeout, timeout));
        None
    }

    fn forget(&mut self, handle: &ServiceHandle) {
        self.waiting.remove(handle);
    }

    fn remove(&mut self, handle: &ServiceHandle) {
        self.resolved.remove(handle);
        self.waiting.remove(handle);
    }

    /// Drops and returns requests whose deadline has passed.
    fn expire(&mut self, now: Instant) -> Vec<(ServiceHandle, Duration)> {
        let expired: Vec<ServiceHandle> = self
            .waiting
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .map(|(handle, _)| handle.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|handle| {
                self.waiting
                    .remove(&handle)
                    .map(|(_, timeout)| (handle, timeout))
            })
            .collect()
    }
}

/// Converts a daemon resolution into the primitive's view of it.
fn resolved_from_info(
    info: &ServiceInfo,
    service_type: &str,
    domain: &str,
) -> Option<ResolvedService> {
    let handle = ServiceHandle::from_fullname(info.get_fullname(), service_type, domain)?;

    let host_name = Some(info.get_hostname())
        .filter(|h| !h.is_empty())
        .map(str::to_string);

    let txt = txt::encode(
        info.get_properties()
            .iter()
            .map(|property| (property.key(), property.val())),
    );

    Some(ResolvedService {
        handle,
        host_name,
        port: info.get_port(),
        addresses: info.get_addresses().iter().copied().collect(),
        txt: Some(txt),
    })
}

fn emit(events: &EventSink, event: DiscoveryEvent) {
    let kind = event.kind();
    if events.try_send(event).is_err() {
        debug!(event = kind, "Browser is gone, dropping discovery event");
    }
}
