//! Asset reconciliation engine.
//!
//! Merges sweep observations into the per-network inventory. Every device
//! is written in its own transaction through the retry policy, and a
//! failure on one device never stops the pass. Notifications are raised
//! only after the write they describe has committed, and transitions are
//! read from the state that write replaced, so passes overlapping on one
//! network never report the same transition twice.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use slam_core::{
    is_unknown, Device, DeviceStatus, DeviceUpdate, HostReport, Network, NetworkId,
    NewNotification, PortSet, ScanEvent, ServiceTag,
};
use slam_inventory::{InventoryStore, StoreError, Upserted};

use crate::adapters::{PortState, ScanSource, Sweep};
use crate::config::{DiscoverConfig, NotificationToggles};
use crate::error::{DiscoverError, Result};
use crate::network::NetworkContext;
use crate::notify::NotificationSink;
use crate::resolve::HostnameResolver;
use crate::retry::RetryPolicy;

/// Provenance recorded on the network row by liveness passes.
pub const LIVENESS_PROVENANCE: &str = "Host Discovery Daemon";
/// Provenance recorded on the network row by port passes.
pub const PORT_PROVENANCE: &str = "Port Discovery Daemon";

/// Where per-device progress records go during interactive passes.
pub type Progress<'a> = Option<&'a mpsc::Sender<ScanEvent>>;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub notifications: NotificationToggles,
    /// Flip silent devices offline and report recoveries.
    pub track_offline: bool,
    pub top_ports: u16,
    pub retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            notifications: NotificationToggles::default(),
            track_offline: true,
            top_ports: 100,
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&DiscoverConfig> for EngineSettings {
    fn from(config: &DiscoverConfig) -> Self {
        Self {
            notifications: config.notifications,
            track_offline: config.host_updater,
            top_ports: config.port_scan_top_ports,
            retry: config.retry_policy(),
        }
    }
}

/// Counts from one pass, for logs and callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Progress records produced.
    pub reported: usize,
    pub discovered: usize,
    pub updated: usize,
    pub went_offline: usize,
    pub recovered: usize,
    /// Devices with at least one newly opened port.
    pub new_ports: usize,
    /// Devices skipped without a write.
    pub skipped: usize,
    /// Device writes given up after a store error.
    pub abandoned: usize,
}

pub struct Reconciler {
    store: Arc<dyn InventoryStore>,
    scanner: Arc<dyn ScanSource>,
    resolver: HostnameResolver,
    sink: Arc<dyn NotificationSink>,
    settings: EngineSettings,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        scanner: Arc<dyn ScanSource>,
        resolver: HostnameResolver,
        sink: Arc<dyn NotificationSink>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            scanner,
            resolver,
            sink,
            settings,
        }
    }

    /// Sweep the network's address range and reconcile the responders.
    ///
    /// A sweep that could not run leaves every record untouched.
    pub async fn liveness_pass(
        &self,
        ctx: &NetworkContext,
        progress: Progress<'_>,
    ) -> Result<PassSummary> {
        let network = self.prepare(ctx, LIVENESS_PROVENANCE).await?;

        // The range recorded when the network was first seen wins.
        let cidr = if is_unknown(&network.meta.cidr) {
            ctx.meta.cidr.as_str()
        } else {
            network.meta.cidr.as_str()
        };
        if is_unknown(cidr) {
            return Err(DiscoverError::Config(format!(
                "no address range known for network {}",
                ctx.identity
            )));
        }

        let Some(sweep) = self.scanner.liveness_sweep(cidr).await else {
            tracing::warn!(network = %ctx.identity, cidr, "Liveness sweep did not run, records untouched");
            return Ok(PassSummary::default());
        };
        self.merge_liveness(ctx, &sweep, progress).await
    }

    /// Reconcile an already collected liveness observation.
    pub async fn reconcile_liveness(
        &self,
        ctx: &NetworkContext,
        sweep: &Sweep,
        progress: Progress<'_>,
    ) -> Result<PassSummary> {
        self.prepare(ctx, LIVENESS_PROVENANCE).await?;
        self.merge_liveness(ctx, sweep, progress).await
    }

    async fn merge_liveness(
        &self,
        ctx: &NetworkContext,
        sweep: &Sweep,
        progress: Progress<'_>,
    ) -> Result<PassSummary> {
        let pass_id = Uuid::new_v4();
        let network = &ctx.identity;
        let toggles = self.settings.notifications;
        let now = Utc::now();

        tracing::info!(
            pass_id = %pass_id,
            network = %network,
            responding = sweep.len(),
            "Starting liveness reconciliation"
        );

        // Only used to pick offline candidates; transitions come from the writes.
        let existing = self.records(network).await?;
        let mut summary = PassSummary::default();

        for (&ip, seen) in sweep {
            let resolution = self.resolver.resolve(ip, &ctx.meta.interface, seen).await;
            let update = DeviceUpdate::new()
                .hostname(resolution.hostname.clone())
                .mac(resolution.mac.clone())
                .vendor(resolution.vendor.clone())
                .status(DeviceStatus::Online)
                .last_seen(now);

            match self.write(network, ip, &update).await {
                Ok(written) if written.inserted() => {
                    summary.discovered += 1;
                    if toggles.host_discovery {
                        self.emit(NewNotification::host_discovered(
                            network,
                            ip,
                            &written.device.hostname,
                            now,
                        ))
                        .await;
                    }
                }
                Ok(written) if written.recovered() => {
                    summary.recovered += 1;
                    if self.settings.track_offline && toggles.host_update {
                        self.emit(NewNotification::host_back_online(
                            network,
                            ip,
                            &written.device.hostname,
                            ServiceTag::HostUpdater,
                            now,
                        ))
                        .await;
                    }
                }
                Ok(_) => summary.updated += 1,
                Err(e) => self.abandon(&mut summary, network, ip, &e),
            }

            send(
                progress,
                HostReport {
                    ip,
                    hostname: resolution.hostname,
                    mac: resolution.mac,
                    vendor: resolution.vendor,
                    status: DeviceStatus::Online,
                    last_seen: now,
                    ports: Vec::new(),
                },
            )
            .await;
            summary.reported += 1;
        }

        if self.settings.track_offline {
            self.mark_silent_offline(network, &existing, sweep, now, &mut summary)
                .await;
        }

        self.touch(ctx, LIVENESS_PROVENANCE).await;
        tracing::info!(pass_id = %pass_id, network = %network, ?summary, "Liveness reconciliation complete");
        Ok(summary)
    }

    /// Devices on file that were online and did not answer go offline.
    async fn mark_silent_offline(
        &self,
        network: &NetworkId,
        existing: &[Device],
        sweep: &Sweep,
        now: DateTime<Utc>,
        summary: &mut PassSummary,
    ) {
        let silent = existing
            .iter()
            .filter(|d| !sweep.contains_key(&d.ip) && !d.is_offline());

        for device in silent {
            if !device.has_hostname() {
                tracing::debug!(ip = %device.ip, "Silent device without hostname, not tracked");
                summary.skipped += 1;
                continue;
            }
            match self.flip_offline(network, device.ip, now).await {
                Ok(Some(stored)) => {
                    summary.went_offline += 1;
                    if self.settings.notifications.host_update {
                        self.emit(NewNotification::host_offline(
                            network,
                            stored.ip,
                            &stored.hostname,
                            now,
                        ))
                        .await;
                    }
                }
                Ok(None) => {
                    tracing::debug!(ip = %device.ip, "Already offline, another pass got there first");
                }
                Err(e) => self.abandon(summary, network, device.ip, &e),
            }
        }
    }

    /// Port-sweep every device on file and record its open ports.
    ///
    /// Devices the sweep reports down are skipped. Ports that closed since
    /// the last pass are dropped from the record without a notification.
    pub async fn port_pass(
        &self,
        ctx: &NetworkContext,
        progress: Progress<'_>,
    ) -> Result<PassSummary> {
        self.prepare(ctx, PORT_PROVENANCE).await?;

        let pass_id = Uuid::new_v4();
        let network = &ctx.identity;
        let toggles = self.settings.notifications;
        let now = Utc::now();
        let devices = self.records(network).await?;
        let mut summary = PassSummary::default();

        tracing::info!(
            pass_id = %pass_id,
            network = %network,
            devices = devices.len(),
            top_ports = self.settings.top_ports,
            "Starting port pass"
        );

        for device in devices {
            let ip = device.ip;
            let Some(states) = self.scanner.port_sweep(ip, self.settings.top_ports).await else {
                tracing::debug!(ip = %ip, "No port sweep result, skipping");
                summary.skipped += 1;
                continue;
            };
            let open: PortSet = states
                .iter()
                .filter(|(_, state)| **state == PortState::Open)
                .map(|(port, _)| *port)
                .collect();

            // Status, ports and last_seen land in one record transaction.
            let update = DeviceUpdate::new()
                .status(DeviceStatus::Online)
                .last_seen(now)
                .ports(open.clone());

            let report = match self.write(network, ip, &update).await {
                Ok(written) => {
                    let new_ports = newly_open(&written, &open);
                    let stored = &written.device;
                    if written.recovered() {
                        summary.recovered += 1;
                        if toggles.host_update {
                            self.emit(NewNotification::host_back_online(
                                network,
                                ip,
                                &stored.hostname,
                                ServiceTag::HostUpdater,
                                now,
                            ))
                            .await;
                        }
                    }
                    if new_ports.is_empty() {
                        summary.updated += 1;
                    } else {
                        summary.new_ports += 1;
                        if toggles.port_discovery {
                            self.emit(NewNotification::new_open_ports(
                                network,
                                ip,
                                &stored.hostname,
                                &new_ports,
                                now,
                            ))
                            .await;
                        }
                    }
                    HostReport::from(stored)
                }
                Err(e) => {
                    self.abandon(&mut summary, network, ip, &e);
                    HostReport {
                        status: DeviceStatus::Online,
                        last_seen: now,
                        ports: open.into_iter().collect(),
                        ..HostReport::from(&device)
                    }
                }
            };

            send(progress, report).await;
            summary.reported += 1;
        }

        self.touch(ctx, PORT_PROVENANCE).await;
        tracing::info!(pass_id = %pass_id, network = %network, ?summary, "Port pass complete");
        Ok(summary)
    }

    /// Ensure the network row and its partition exist.
    async fn prepare(&self, ctx: &NetworkContext, provenance: &str) -> Result<Network> {
        let store = &self.store;
        let retry = &self.settings.retry;
        let network = retry
            .run("ensure_network", move || {
                store.ensure_network(&ctx.identity, &ctx.meta, provenance)
            })
            .await?;
        retry
            .run("ensure_partition", move || store.ensure_partition(&ctx.identity))
            .await?;
        Ok(network)
    }

    async fn records(&self, network: &NetworkId) -> Result<Vec<Device>> {
        let store = &self.store;
        Ok(self
            .settings
            .retry
            .run("list_records", move || store.list_records(network))
            .await?)
    }

    async fn write(
        &self,
        network: &NetworkId,
        ip: IpAddr,
        update: &DeviceUpdate,
    ) -> std::result::Result<Upserted, StoreError> {
        let store = &self.store;
        self.settings
            .retry
            .run("upsert_record", move || store.upsert_record(network, ip, update))
            .await
    }

    async fn flip_offline(
        &self,
        network: &NetworkId,
        ip: IpAddr,
        now: DateTime<Utc>,
    ) -> std::result::Result<Option<Device>, StoreError> {
        let store = &self.store;
        self.settings
            .retry
            .run("mark_offline", move || store.mark_offline(network, ip, now))
            .await
    }

    /// Record the pass on the network row. Failure here does not fail the pass.
    async fn touch(&self, ctx: &NetworkContext, provenance: &str) {
        let store = &self.store;
        let touched = self
            .settings
            .retry
            .run("touch_network", move || {
                store.touch_network(&ctx.identity, &ctx.meta, provenance)
            })
            .await;
        if let Err(e) = touched {
            tracing::warn!(network = %ctx.identity, error = %e, "Failed to update network activity");
        }
    }

    async fn emit(&self, notification: NewNotification) {
        self.sink.emit(notification).await;
    }

    fn abandon(&self, summary: &mut PassSummary, network: &NetworkId, ip: IpAddr, e: &StoreError) {
        summary.abandoned += 1;
        tracing::warn!(network = %network, ip = %ip, error = %e, "Abandoning device update for this pass");
    }
}

/// Open ports absent from the record the write replaced.
fn newly_open(written: &Upserted, open: &PortSet) -> PortSet {
    match &written.prior {
        Some(prior) => open.difference(&prior.ports).copied().collect(),
        None => open.clone(),
    }
}

async fn send(progress: Progress<'_>, report: HostReport) {
    if let Some(tx) = progress {
        // A consumer that went away does not stop the pass.
        let _ = tx.send(ScanEvent::host(report)).await;
    }
}
