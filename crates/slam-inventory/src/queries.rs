//! Read operations and row decoding for the device inventory.

use std::collections::BTreeSet;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use slam_core::{Device, DeviceStatus, Network, NetworkId, NetworkMeta, Notification, PortSet};

use crate::client::InventoryClient;
use crate::error::{Result, StoreError};
use crate::registry::Partition;

pub(crate) const DEVICE_COLUMNS: &str =
    "ip_address, hostname, mac_address, vendor, status, first_seen, last_seen, ports";

pub(crate) const NETWORK_COLUMNS: &str =
    "identity, cidr, netmask, interface, broadcast, created_at, last_activity, updated_by";

impl InventoryClient {
    // ── Networks ─────────────────────────────────────────────────

    /// Every network ever observed, newest first.
    pub async fn list_networks(&self) -> Result<Vec<Network>> {
        let select =
            format!("SELECT {NETWORK_COLUMNS} FROM networks ORDER BY created_at DESC, identity");
        let rows = sqlx::query(&select).fetch_all(self.pool()).await?;
        rows.iter().map(network_from_row).collect()
    }

    pub async fn get_network(&self, network: &NetworkId) -> Result<Option<Network>> {
        let select = format!("SELECT {NETWORK_COLUMNS} FROM networks WHERE identity = ?");
        let row = sqlx::query(&select)
            .bind(network.as_str())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(network_from_row).transpose()
    }

    // ── Device records ───────────────────────────────────────────

    /// IPs of every record in the network's partition.
    pub async fn list_ips(&self, network: &NetworkId) -> Result<BTreeSet<IpAddr>> {
        let partition = self.registry().require(network)?;
        let select = format!("SELECT ip_address FROM {}", partition.table);
        let rows = sqlx::query(&select).fetch_all(self.pool()).await?;

        rows.iter()
            .map(|row| {
                let raw: String = row.try_get("ip_address")?;
                parse_ip(&partition, &raw)
            })
            .collect()
    }

    pub async fn get_record(&self, network: &NetworkId, ip: IpAddr) -> Result<Option<Device>> {
        let partition = self.registry().require(network)?;
        let select = format!(
            "SELECT {DEVICE_COLUMNS} FROM {} WHERE ip_address = ?",
            partition.table
        );
        let row = sqlx::query(&select)
            .bind(ip.to_string())
            .fetch_optional(self.pool())
            .await?;
        row.map(|r| device_from_row(&partition, &r)).transpose()
    }

    /// Every record in the network's partition, ordered by IP.
    pub async fn list_records(&self, network: &NetworkId) -> Result<Vec<Device>> {
        let partition = self.registry().require(network)?;
        let select = format!("SELECT {DEVICE_COLUMNS} FROM {}", partition.table);
        let rows = sqlx::query(&select).fetch_all(self.pool()).await?;

        let mut devices = rows
            .iter()
            .map(|row| device_from_row(&partition, row))
            .collect::<Result<Vec<_>>>()?;
        devices.sort_by_key(|d| d.ip);
        Ok(devices)
    }

    // ── Notifications ────────────────────────────────────────────

    /// Every stored notification, newest first.
    pub async fn list_notifications(&self) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT id, network, ip_address, hostname, message, service, timestamp, read
             FROM notifications ORDER BY timestamp DESC, id DESC",
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(notification_from_row).collect()
    }
}

// ── Row decoding ─────────────────────────────────────────────────

pub(crate) fn device_from_row(partition: &Partition, row: &SqliteRow) -> Result<Device> {
    let raw_ip: String = row.try_get("ip_address")?;
    let ip = parse_ip(partition, &raw_ip)?;

    let raw_status: String = row.try_get("status")?;
    let status = raw_status
        .parse::<DeviceStatus>()
        .map_err(|e| corrupt(partition, &raw_ip, "status", e.to_string()))?;

    let raw_ports: String = row.try_get("ports")?;
    let ports: PortSet = serde_json::from_str(&raw_ports)
        .map_err(|e| corrupt(partition, &raw_ip, "ports", e.to_string()))?;

    Ok(Device {
        ip,
        hostname: row.try_get("hostname")?,
        mac: row.try_get("mac_address")?,
        vendor: row.try_get("vendor")?,
        status,
        first_seen: row.try_get::<DateTime<Utc>, _>("first_seen")?,
        last_seen: row.try_get::<DateTime<Utc>, _>("last_seen")?,
        ports,
    })
}

pub(crate) fn network_from_row(row: &SqliteRow) -> Result<Network> {
    let raw: String = row.try_get("identity")?;
    let identity = NetworkId::parse(&raw).map_err(|e| StoreError::Corrupt {
        key: raw.clone(),
        field: "identity",
        detail: e.to_string(),
    })?;

    Ok(Network {
        identity,
        meta: NetworkMeta {
            cidr: row.try_get("cidr")?,
            netmask: row.try_get("netmask")?,
            interface: row.try_get("interface")?,
            broadcast: row.try_get("broadcast")?,
        },
        created_at: row.try_get("created_at")?,
        last_activity: row.try_get("last_activity")?,
        updated_by: row.try_get("updated_by")?,
    })
}

fn notification_from_row(row: &SqliteRow) -> Result<Notification> {
    let id: i64 = row.try_get("id")?;
    let key = format!("notification {id}");

    let raw_network: String = row.try_get("network")?;
    let network = NetworkId::parse(&raw_network).map_err(|e| StoreError::Corrupt {
        key: key.clone(),
        field: "network",
        detail: e.to_string(),
    })?;
    let raw_ip: String = row.try_get("ip_address")?;
    let ip = raw_ip.parse::<IpAddr>().map_err(|e| StoreError::Corrupt {
        key,
        field: "ip_address",
        detail: e.to_string(),
    })?;

    Ok(Notification {
        id,
        network,
        ip,
        hostname: row.try_get("hostname")?,
        message: row.try_get("message")?,
        service: row.try_get("service")?,
        timestamp: row.try_get("timestamp")?,
        read: row.try_get("read")?,
    })
}

fn parse_ip(partition: &Partition, raw: &str) -> Result<IpAddr> {
    raw.parse::<IpAddr>()
        .map_err(|e| corrupt(partition, raw, "ip_address", e.to_string()))
}

fn corrupt(partition: &Partition, ip: &str, field: &'static str, detail: String) -> StoreError {
    StoreError::Corrupt {
        key: format!("{}/{ip}", partition.table),
        field,
        detail,
    }
}
