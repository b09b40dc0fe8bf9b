//! Inventory storage trait and its SQLite-backed implementation.
//!
//! The reconciliation engine and the CLI only see [`InventoryStore`], so
//! tests and alternative backends can be substituted freely.

use std::collections::BTreeSet;
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use slam_core::{Device, DeviceUpdate, Network, NetworkId, NetworkMeta, NewNotification, Notification};

use crate::client::InventoryClient;
use crate::error::Result;
use crate::registry::Partition;

/// Outcome of a record upsert: the row the write replaced and the row it left.
///
/// Both are read inside the write's transaction, so a transition derived
/// from `prior` is seen by exactly one of several concurrent writers.
#[derive(Debug, Clone, PartialEq)]
pub struct Upserted {
    /// `None` when the write created the record.
    pub prior: Option<Device>,
    pub device: Device,
}

impl Upserted {
    pub fn inserted(&self) -> bool {
        self.prior.is_none()
    }

    /// The write brought an offline record back online.
    pub fn recovered(&self) -> bool {
        self.prior.as_ref().is_some_and(Device::is_offline) && !self.device.is_offline()
    }
}

/// Trait for device inventory backends.
///
/// Writes may fail with [`StoreError::Locked`](crate::StoreError::Locked)
/// when another writer holds the store; callers are expected to retry
/// those and treat any other error as permanent for that operation.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Create the network row with the given metadata if absent; return the stored row.
    async fn ensure_network(
        &self,
        network: &NetworkId,
        meta: &NetworkMeta,
        updated_by: &str,
    ) -> Result<Network>;

    /// Update last activity, interface metadata, and provenance.
    async fn touch_network(
        &self,
        network: &NetworkId,
        meta: &NetworkMeta,
        updated_by: &str,
    ) -> Result<()>;

    /// Create the network's isolated device partition if absent.
    async fn ensure_partition(&self, network: &NetworkId) -> Result<Partition>;

    async fn list_networks(&self) -> Result<Vec<Network>>;

    async fn get_network(&self, network: &NetworkId) -> Result<Option<Network>>;

    async fn list_ips(&self, network: &NetworkId) -> Result<BTreeSet<IpAddr>>;

    async fn get_record(&self, network: &NetworkId, ip: IpAddr) -> Result<Option<Device>>;

    /// Apply `update` to the record for `ip` in one transaction, inserting it if absent.
    async fn upsert_record(
        &self,
        network: &NetworkId,
        ip: IpAddr,
        update: &DeviceUpdate,
    ) -> Result<Upserted>;

    /// Flip the record for `ip` offline unless it already is.
    ///
    /// Returns the stored record only when this call changed it; `None`
    /// when the record is missing or was already offline.
    async fn mark_offline(
        &self,
        network: &NetworkId,
        ip: IpAddr,
        last_seen: DateTime<Utc>,
    ) -> Result<Option<Device>>;

    async fn list_records(&self, network: &NetworkId) -> Result<Vec<Device>>;

    async fn insert_notification(&self, notification: &NewNotification) -> Result<i64>;

    async fn list_notifications(&self) -> Result<Vec<Notification>>;

    async fn mark_all_read(&self) -> Result<u64>;

    async fn delete_all_notifications(&self) -> Result<u64>;
}

#[async_trait]
impl InventoryStore for InventoryClient {
    async fn ensure_network(
        &self,
        network: &NetworkId,
        meta: &NetworkMeta,
        updated_by: &str,
    ) -> Result<Network> {
        InventoryClient::ensure_network(self, network, meta, updated_by).await
    }

    async fn touch_network(
        &self,
        network: &NetworkId,
        meta: &NetworkMeta,
        updated_by: &str,
    ) -> Result<()> {
        InventoryClient::touch_network(self, network, meta, updated_by).await
    }

    async fn ensure_partition(&self, network: &NetworkId) -> Result<Partition> {
        InventoryClient::ensure_partition(self, network).await
    }

    async fn list_networks(&self) -> Result<Vec<Network>> {
        InventoryClient::list_networks(self).await
    }

    async fn get_network(&self, network: &NetworkId) -> Result<Option<Network>> {
        InventoryClient::get_network(self, network).await
    }

    async fn list_ips(&self, network: &NetworkId) -> Result<BTreeSet<IpAddr>> {
        InventoryClient::list_ips(self, network).await
    }

    async fn get_record(&self, network: &NetworkId, ip: IpAddr) -> Result<Option<Device>> {
        InventoryClient::get_record(self, network, ip).await
    }

    async fn upsert_record(
        &self,
        network: &NetworkId,
        ip: IpAddr,
        update: &DeviceUpdate,
    ) -> Result<Upserted> {
        InventoryClient::upsert_record(self, network, ip, update).await
    }

    async fn mark_offline(
        &self,
        network: &NetworkId,
        ip: IpAddr,
        last_seen: DateTime<Utc>,
    ) -> Result<Option<Device>> {
        InventoryClient::mark_offline(self, network, ip, last_seen).await
    }

    async fn list_records(&self, network: &NetworkId) -> Result<Vec<Device>> {
        InventoryClient::list_records(self, network).await
    }

    async fn insert_notification(&self, notification: &NewNotification) -> Result<i64> {
        InventoryClient::insert_notification(self, notification).await
    }

    async fn list_notifications(&self) -> Result<Vec<Notification>> {
        InventoryClient::list_notifications(self).await
    }

    async fn mark_all_read(&self) -> Result<u64> {
        InventoryClient::mark_all_read(self).await
    }

    async fn delete_all_notifications(&self) -> Result<u64> {
        InventoryClient::delete_all_notifications(self).await
    }
}
