//! In-memory inventory backend.
//!
//! Applies the same partition and merge rules as the SQLite client. Write
//! faults can be scheduled ahead of time so callers can exercise their
//! contention handling without a real competing writer.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use slam_core::{
    Device, DeviceStatus, DeviceUpdate, Network, NetworkId, NetworkMeta, NewNotification,
    Notification,
};

use crate::error::{Result, StoreError};
use crate::registry::{Partition, PartitionRegistry};
use crate::store::{InventoryStore, Upserted};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Locked,
    Failed,
}

#[derive(Default)]
struct State {
    networks: BTreeMap<NetworkId, Network>,
    partitions: HashMap<NetworkId, BTreeMap<IpAddr, Device>>,
    notifications: Vec<Notification>,
    next_notification_id: i64,
    faults: Vec<Fault>,
    notification_locks: usize,
    upsert_attempts: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    registry: PartitionRegistry,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` record upserts fail with `Locked`.
    pub fn lock_next_upserts(&self, count: usize) {
        self.state
            .lock()
            .faults
            .extend(std::iter::repeat(Fault::Locked).take(count));
    }

    /// Make the next `count` record upserts fail with a non-transient error.
    pub fn fail_next_upserts(&self, count: usize) {
        self.state
            .lock()
            .faults
            .extend(std::iter::repeat(Fault::Failed).take(count));
    }

    /// Make the next `count` bulk notification writes fail with `Locked`.
    pub fn lock_next_notification_writes(&self, count: usize) {
        self.state.lock().notification_locks += count;
    }

    /// Number of record upserts attempted so far, failed ones included.
    pub fn upsert_attempts(&self) -> usize {
        self.state.lock().upsert_attempts
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn ensure_network(
        &self,
        network: &NetworkId,
        meta: &NetworkMeta,
        updated_by: &str,
    ) -> Result<Network> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let row = state
            .networks
            .entry(network.clone())
            .or_insert_with(|| Network {
                identity: network.clone(),
                meta: meta.clone(),
                created_at: now,
                last_activity: now,
                updated_by: Some(updated_by.to_string()),
            });
        Ok(row.clone())
    }

    async fn touch_network(
        &self,
        network: &NetworkId,
        meta: &NetworkMeta,
        updated_by: &str,
    ) -> Result<()> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let row = state
            .networks
            .entry(network.clone())
            .or_insert_with(|| Network {
                identity: network.clone(),
                meta: meta.clone(),
                created_at: now,
                last_activity: now,
                updated_by: None,
            });
        row.meta.netmask = meta.netmask.clone();
        row.meta.interface = meta.interface.clone();
        row.meta.broadcast = meta.broadcast.clone();
        row.last_activity = now;
        row.updated_by = Some(updated_by.to_string());
        Ok(())
    }

    async fn ensure_partition(&self, network: &NetworkId) -> Result<Partition> {
        if let Some(partition) = self.registry.get(network) {
            return Ok(partition);
        }
        let partition = self.registry.insert(PartitionRegistry::derive(network)?);
        self.state
            .lock()
            .partitions
            .entry(network.clone())
            .or_default();
        Ok(partition)
    }

    async fn list_networks(&self) -> Result<Vec<Network>> {
        let mut networks: Vec<Network> = self.state.lock().networks.values().cloned().collect();
        networks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(networks)
    }

    async fn get_network(&self, network: &NetworkId) -> Result<Option<Network>> {
        Ok(self.state.lock().networks.get(network).cloned())
    }

    async fn list_ips(&self, network: &NetworkId) -> Result<BTreeSet<IpAddr>> {
        let state = self.state.lock();
        let partition = partition(&state, network)?;
        Ok(partition.keys().copied().collect())
    }

    async fn get_record(&self, network: &NetworkId, ip: IpAddr) -> Result<Option<Device>> {
        let state = self.state.lock();
        Ok(partition(&state, network)?.get(&ip).cloned())
    }

    async fn upsert_record(
        &self,
        network: &NetworkId,
        ip: IpAddr,
        update: &DeviceUpdate,
    ) -> Result<Upserted> {
        let mut state = self.state.lock();
        state.upsert_attempts += 1;
        if !state.faults.is_empty() {
            let fault = state.faults.remove(0);
            return Err(match fault {
                Fault::Locked => StoreError::Locked("database is locked".into()),
                Fault::Failed => StoreError::Database(sqlx::Error::Protocol(
                    "simulated write failure".into(),
                )),
            });
        }

        let records = state
            .partitions
            .get_mut(network)
            .ok_or_else(|| StoreError::UnknownNetwork(network.to_string()))?;
        let upserted = match records.get_mut(&ip) {
            Some(existing) => {
                let prior = existing.clone();
                update.apply(existing);
                Upserted {
                    prior: Some(prior),
                    device: existing.clone(),
                }
            }
            None => {
                let device = update.clone().into_device(ip, Utc::now());
                records.insert(ip, device.clone());
                Upserted {
                    prior: None,
                    device,
                }
            }
        };
        Ok(upserted)
    }

    async fn mark_offline(
        &self,
        network: &NetworkId,
        ip: IpAddr,
        last_seen: DateTime<Utc>,
    ) -> Result<Option<Device>> {
        let mut state = self.state.lock();
        let records = state
            .partitions
            .get_mut(network)
            .ok_or_else(|| StoreError::UnknownNetwork(network.to_string()))?;
        match records.get_mut(&ip) {
            Some(device) if !device.is_offline() => {
                device.status = DeviceStatus::Offline;
                device.last_seen = last_seen;
                Ok(Some(device.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_records(&self, network: &NetworkId) -> Result<Vec<Device>> {
        let state = self.state.lock();
        Ok(partition(&state, network)?.values().cloned().collect())
    }

    async fn insert_notification(&self, notification: &NewNotification) -> Result<i64> {
        let mut state = self.state.lock();
        state.next_notification_id += 1;
        let id = state.next_notification_id;
        state.notifications.push(Notification {
            id,
            network: notification.network.clone(),
            ip: notification.ip,
            hostname: notification.hostname.clone(),
            message: notification.message.clone(),
            service: notification.service.as_str().to_string(),
            timestamp: notification.timestamp,
            read: false,
        });
        Ok(id)
    }

    async fn list_notifications(&self) -> Result<Vec<Notification>> {
        let mut notifications = self.state.lock().notifications.clone();
        notifications.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(notifications)
    }

    async fn mark_all_read(&self) -> Result<u64> {
        let mut state = self.state.lock();
        take_notification_lock(&mut state)?;
        let mut changed = 0;
        for n in state.notifications.iter_mut().filter(|n| !n.read) {
            n.read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn delete_all_notifications(&self) -> Result<u64> {
        let mut state = self.state.lock();
        take_notification_lock(&mut state)?;
        let deleted = state.notifications.len() as u64;
        state.notifications.clear();
        Ok(deleted)
    }
}

fn take_notification_lock(state: &mut State) -> Result<()> {
    if state.notification_locks > 0 {
        state.notification_locks -= 1;
        return Err(StoreError::Locked("database is locked".into()));
    }
    Ok(())
}

fn partition<'a>(state: &'a State, network: &NetworkId) -> Result<&'a BTreeMap<IpAddr, Device>> {
    state
        .partitions
        .get(network)
        .ok_or_else(|| StoreError::UnknownNetwork(network.to_string()))
}
