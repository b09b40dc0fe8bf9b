//! Write operations for the device inventory.
//!
//! Every write is its own transaction. A record upsert reads the stored
//! row, merges the [`DeviceUpdate`] into it, and writes it back before
//! committing; if any step fails the transaction is rolled back on drop
//! and the previously stored row is left intact.
//!
//! Under WAL a transaction that read a row another connection has since
//! rewritten cannot take the write lock (`SQLITE_BUSY_SNAPSHOT`). That
//! surfaces as `Locked`, so the retried upsert re-reads the newer row and
//! the prior state it reports is always the one it replaced.

use std::net::IpAddr;

use chrono::{DateTime, Utc};

use slam_core::{
    Device, DeviceStatus, DeviceUpdate, Network, NetworkId, NetworkMeta, NewNotification,
};

use crate::client::InventoryClient;
use crate::error::Result;
use crate::queries::{device_from_row, network_from_row, DEVICE_COLUMNS, NETWORK_COLUMNS};
use crate::registry::{Partition, PartitionRegistry};
use crate::store::Upserted;

impl InventoryClient {
    // ── Networks ─────────────────────────────────────────────────

    /// Insert the network row if it is not on file yet and return the stored row.
    pub async fn ensure_network(
        &self,
        network: &NetworkId,
        meta: &NetworkMeta,
        updated_by: &str,
    ) -> Result<Network> {
        let partition = PartitionRegistry::derive(network)?;
        let now = Utc::now();

        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "INSERT INTO networks
               (identity, partition, cidr, netmask, interface, broadcast,
                created_at, last_activity, updated_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(identity) DO NOTHING",
        )
        .bind(network.as_str())
        .bind(&partition.table)
        .bind(&meta.cidr)
        .bind(&meta.netmask)
        .bind(&meta.interface)
        .bind(&meta.broadcast)
        .bind(now)
        .bind(now)
        .bind(updated_by)
        .execute(&mut *tx)
        .await?;

        let select = format!("SELECT {NETWORK_COLUMNS} FROM networks WHERE identity = ?");
        let row = sqlx::query(&select)
            .bind(network.as_str())
            .fetch_one(&mut *tx)
            .await?;
        let stored = network_from_row(&row)?;
        tx.commit().await?;

        Ok(stored)
    }

    /// Record pass activity on a network: interface metadata, last
    /// activity and provenance. The stored CIDR is kept as first observed.
    pub async fn touch_network(
        &self,
        network: &NetworkId,
        meta: &NetworkMeta,
        updated_by: &str,
    ) -> Result<()> {
        let partition = PartitionRegistry::derive(network)?;
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO networks
               (identity, partition, cidr, netmask, interface, broadcast,
                created_at, last_activity, updated_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(identity) DO UPDATE SET
               netmask = excluded.netmask, interface = excluded.interface,
               broadcast = excluded.broadcast,
               last_activity = excluded.last_activity,
               updated_by = excluded.updated_by",
        )
        .bind(network.as_str())
        .bind(&partition.table)
        .bind(&meta.cidr)
        .bind(&meta.netmask)
        .bind(&meta.interface)
        .bind(&meta.broadcast)
        .bind(now)
        .bind(now)
        .bind(updated_by)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Create the network's device partition if needed.
    pub async fn ensure_partition(&self, network: &NetworkId) -> Result<Partition> {
        self.create_partition(network).await
    }

    // ── Device records ───────────────────────────────────────────

    /// Apply an update to one device record, inserting it if absent.
    /// Returns the replaced row alongside the stored one.
    pub async fn upsert_record(
        &self,
        network: &NetworkId,
        ip: IpAddr,
        update: &DeviceUpdate,
    ) -> Result<Upserted> {
        let partition = self.registry().require(network)?;
        let key = ip.to_string();

        let mut tx = self.pool().begin().await?;

        let select = format!(
            "SELECT {DEVICE_COLUMNS} FROM {} WHERE ip_address = ?",
            partition.table
        );
        let existing = sqlx::query(&select)
            .bind(&key)
            .fetch_optional(&mut *tx)
            .await?;

        let prior = existing
            .map(|row| device_from_row(&partition, &row))
            .transpose()?;
        let device = match &prior {
            Some(prior) => {
                let mut device = prior.clone();
                update.apply(&mut device);
                device
            }
            None => update.clone().into_device(ip, Utc::now()),
        };
        let ports = serde_json::to_string(&device.ports)?;

        let upsert = format!(
            "INSERT INTO {} ({DEVICE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(ip_address) DO UPDATE SET
               hostname = excluded.hostname, mac_address = excluded.mac_address,
               vendor = excluded.vendor, status = excluded.status,
               last_seen = excluded.last_seen, ports = excluded.ports",
            partition.table
        );
        sqlx::query(&upsert)
            .bind(&key)
            .bind(&device.hostname)
            .bind(&device.mac)
            .bind(&device.vendor)
            .bind(device.status.as_str())
            .bind(device.first_seen)
            .bind(device.last_seen)
            .bind(ports)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Upserted { prior, device })
    }

    /// Flip one record offline unless it already is. Returns the stored
    /// record when this call made the change.
    pub async fn mark_offline(
        &self,
        network: &NetworkId,
        ip: IpAddr,
        last_seen: DateTime<Utc>,
    ) -> Result<Option<Device>> {
        let partition = self.registry().require(network)?;
        let key = ip.to_string();
        let offline = DeviceStatus::Offline.as_str();

        let mut tx = self.pool().begin().await?;

        let flip = format!(
            "UPDATE {} SET status = ?, last_seen = ? WHERE ip_address = ? AND status != ?",
            partition.table
        );
        let changed = sqlx::query(&flip)
            .bind(offline)
            .bind(last_seen)
            .bind(&key)
            .bind(offline)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if changed == 0 {
            return Ok(None);
        }

        let select = format!(
            "SELECT {DEVICE_COLUMNS} FROM {} WHERE ip_address = ?",
            partition.table
        );
        let row = sqlx::query(&select).bind(&key).fetch_one(&mut *tx).await?;
        let device = device_from_row(&partition, &row)?;
        tx.commit().await?;

        Ok(Some(device))
    }

    // ── Notifications ────────────────────────────────────────────

    /// Store a notification, returning its id.
    pub async fn insert_notification(&self, notification: &NewNotification) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO notifications
               (network, ip_address, hostname, message, service, timestamp, read)
             VALUES (?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(notification.network.as_str())
        .bind(notification.ip.to_string())
        .bind(&notification.hostname)
        .bind(&notification.message)
        .bind(notification.service.as_str())
        .bind(notification.timestamp)
        .execute(self.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Flag every unread notification as read. Returns the number changed.
    pub async fn mark_all_read(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE read = 0")
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete every notification. Returns the number deleted.
    pub async fn delete_all_notifications(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications")
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
