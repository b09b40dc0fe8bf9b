#![allow(dead_code)]

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use slam_core::{NetworkId, NetworkMeta, NewNotification, ServiceTag};
use slam_discover::adapters::{
    DeviceProbe, HostnameSource, PortState, PortSweep, ProbeInfo, ScanSource, Sweep, SweepHost,
};
use slam_discover::mdns::MdnsCache;
use slam_discover::network::{NetworkContext, NetworkSource};
use slam_discover::notify::NotificationSink;
use slam_discover::reconcile::{EngineSettings, Reconciler};
use slam_discover::resolve::HostnameResolver;
use slam_inventory::MemoryStore;

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn ctx(identity: &str) -> NetworkContext {
    NetworkContext {
        identity: NetworkId::parse(identity).unwrap(),
        meta: NetworkMeta {
            cidr: "192.168.1.0/24".into(),
            netmask: "255.255.255.0".into(),
            interface: "wlan0".into(),
            broadcast: "192.168.1.255".into(),
        },
    }
}

/// Build a sweep of named hosts; an empty name means the scanner had none.
pub fn sweep(hosts: &[(&str, &str)]) -> Sweep {
    hosts
        .iter()
        .map(|(addr, name)| {
            let seen = if name.is_empty() {
                SweepHost::default()
            } else {
                SweepHost::named(*name)
            };
            (ip(addr), seen)
        })
        .collect()
}

#[derive(Default)]
pub struct FakeScanner {
    responding: Mutex<Option<Sweep>>,
    ports: Mutex<HashMap<IpAddr, PortSweep>>,
    pub port_sweeps: AtomicUsize,
}

impl FakeScanner {
    pub fn respond(&self, hosts: Sweep) {
        *self.responding.lock() = Some(hosts);
    }

    pub fn open_ports(&self, addr: &str, open: &[u16]) {
        let states = open.iter().map(|p| (*p, PortState::Open)).collect();
        self.ports.lock().insert(ip(addr), states);
    }

    pub fn set_ports(&self, addr: &str, states: &[(u16, PortState)]) {
        self.ports
            .lock()
            .insert(ip(addr), states.iter().copied().collect());
    }
}

#[async_trait]
impl ScanSource for FakeScanner {
    async fn liveness_sweep(&self, _cidr: &str) -> Option<Sweep> {
        self.responding.lock().clone()
    }

    async fn port_sweep(&self, ip: IpAddr, _top_ports: u16) -> Option<PortSweep> {
        self.port_sweeps.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.ports.lock().get(&ip).cloned()
    }
}

/// A direct probe that never learns anything.
pub struct SilentProbe;

#[async_trait]
impl DeviceProbe for SilentProbe {
    async fn probe(&self, _ip: IpAddr, _interface: &str) -> ProbeInfo {
        ProbeInfo::default()
    }
}

/// A direct probe that hands control back to the runtime before answering,
/// so passes joined on one task interleave between devices.
pub struct YieldingProbe;

#[async_trait]
impl DeviceProbe for YieldingProbe {
    async fn probe(&self, _ip: IpAddr, _interface: &str) -> ProbeInfo {
        tokio::task::yield_now().await;
        ProbeInfo::default()
    }
}

#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<NewNotification>>,
}

impl RecordingSink {
    pub fn all(&self) -> Vec<NewNotification> {
        self.sent.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().iter().map(|n| n.message.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn from_service(&self, service: ServiceTag) -> usize {
        self.sent.lock().iter().filter(|n| n.service == service).count()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn emit(&self, notification: NewNotification) {
        self.sent.lock().push(notification);
    }
}

/// Network source with a fixed answer that counts how often it is asked.
pub struct FixedNetwork {
    answer: Option<NetworkContext>,
    pub calls: AtomicUsize,
}

impl FixedNetwork {
    pub fn new(answer: Option<NetworkContext>) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkSource for FixedNetwork {
    async fn current(&self) -> Option<NetworkContext> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub scanner: Arc<FakeScanner>,
    pub sink: Arc<RecordingSink>,
    pub mdns: Arc<MdnsCache>,
    pub engine: Arc<Reconciler>,
}

pub fn harness() -> Harness {
    harness_with(EngineSettings::default())
}

pub fn harness_with(settings: EngineSettings) -> Harness {
    harness_with_probe(Arc::new(SilentProbe), settings)
}

pub fn harness_with_probe(probe: Arc<dyn DeviceProbe>, settings: EngineSettings) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let scanner = Arc::new(FakeScanner::default());
    let sink = Arc::new(RecordingSink::default());
    let mdns = Arc::new(MdnsCache::new(Vec::new()));

    let fallbacks: Vec<Arc<dyn HostnameSource>> = vec![mdns.clone()];
    let resolver = HostnameResolver::new(probe, fallbacks);
    let engine = Arc::new(Reconciler::new(
        store.clone(),
        scanner.clone(),
        resolver,
        sink.clone(),
        settings,
    ));

    Harness {
        store,
        scanner,
        sink,
        mdns,
        engine,
    }
}

impl Harness {
    /// A second engine sharing this harness's store, scanner and sink.
    pub fn sibling(&self, probe: Arc<dyn DeviceProbe>) -> Arc<Reconciler> {
        let fallbacks: Vec<Arc<dyn HostnameSource>> = vec![self.mdns.clone()];
        Arc::new(Reconciler::new(
            self.store.clone(),
            self.scanner.clone(),
            HostnameResolver::new(probe, fallbacks),
            self.sink.clone(),
            EngineSettings::default(),
        ))
    }
}

/// Two engines over one store whose probes yield between devices.
pub fn overlapping() -> (Harness, Arc<Reconciler>) {
    let h = harness_with_probe(Arc::new(YieldingProbe), EngineSettings::default());
    let other = h.sibling(Arc::new(YieldingProbe));
    (h, other)
}
