//! Core domain types for the SLAM device inventory.
//!
//! A monitored network is identified by a [`NetworkId`] (typically a Wi-Fi
//! SSID). Every network owns an isolated partition of [`Device`] records
//! keyed by IP address. [`DeviceUpdate`] is the single merge rule that all
//! inventory backends apply, so that an update behaves the same whether it
//! lands on an existing record or creates a new one.

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Placeholder reported by every source that could not determine a field.
pub const UNKNOWN: &str = "Unknown";

/// Longest sanitized stem kept in a partition name.
const MAX_PARTITION_STEM: usize = 40;

/// Whether a source value carries no information.
pub fn is_unknown(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == UNKNOWN
}

/// A set of open TCP ports, ordered for stable output.
pub type PortSet = BTreeSet<u16>;

// ── Network ───────────────────────────────────────────────────────

/// Normalized identity of a monitored network.
///
/// Validated once on construction: surrounding whitespace is trimmed and
/// the empty string or the `Unknown` placeholder is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NetworkId(String);

impl NetworkId {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        if is_unknown(trimmed) {
            return Err(CoreError::InvalidIdentity(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic storage name for this network's device partition.
    ///
    /// Non-alphanumeric runs collapse to a single `_`, and the first eight
    /// hex digits of the identity's BLAKE3 hash are appended so that
    /// identities with equal sanitized forms (`home-1` / `home.1`) never
    /// share a partition.
    pub fn partition_name(&self) -> String {
        let mut stem = String::with_capacity(self.0.len());
        for c in self.0.chars() {
            if c.is_ascii_alphanumeric() {
                stem.push(c.to_ascii_lowercase());
            } else if !stem.is_empty() && !stem.ends_with('_') {
                stem.push('_');
            }
        }
        stem.truncate(MAX_PARTITION_STEM);
        while stem.ends_with('_') {
            stem.pop();
        }

        let digest = blake3::hash(self.0.as_bytes()).to_hex();
        if stem.is_empty() {
            format!("devices_{}", &digest[..8])
        } else {
            format!("devices_{stem}_{}", &digest[..8])
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NetworkId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NetworkId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NetworkId> for String {
    fn from(id: NetworkId) -> Self {
        id.0
    }
}

/// Interface metadata observed for a network on each pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMeta {
    pub cidr: String,
    pub netmask: String,
    pub interface: String,
    pub broadcast: String,
}

impl Default for NetworkMeta {
    fn default() -> Self {
        Self {
            cidr: UNKNOWN.to_string(),
            netmask: UNKNOWN.to_string(),
            interface: UNKNOWN.to_string(),
            broadcast: UNKNOWN.to_string(),
        }
    }
}

/// One row per distinct network identity. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub identity: NetworkId,
    #[serde(flatten)]
    pub meta: NetworkMeta,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Provenance tag of the last pass that touched this row.
    pub updated_by: Option<String>,
}

// ── Device ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            other => Err(CoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// A device record inside one network partition, keyed by IP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub ip: IpAddr,
    /// Empty when no pass has written a hostname for this record yet.
    pub hostname: String,
    pub mac: String,
    pub vendor: String,
    pub status: DeviceStatus,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub ports: PortSet,
}

impl Device {
    /// Whether a hostname has ever been written for this record.
    pub fn has_hostname(&self) -> bool {
        !self.hostname.trim().is_empty()
    }

    pub fn is_offline(&self) -> bool {
        self.status == DeviceStatus::Offline
    }
}

/// A partial write against one device record.
///
/// Fields left as `None` keep their stored value on update. On insert,
/// missing fields take their defaults: an empty hostname, `Unknown`
/// MAC/vendor, `online` status, no ports, and `now` for both timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceUpdate {
    pub hostname: Option<String>,
    pub mac: Option<String>,
    pub vendor: Option<String>,
    pub status: Option<DeviceStatus>,
    pub last_seen: Option<DateTime<Utc>>,
    pub ports: Option<PortSet>,
}

impl DeviceUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }

    pub fn vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    pub fn status(mut self, status: DeviceStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn last_seen(mut self, at: DateTime<Utc>) -> Self {
        self.last_seen = Some(at);
        self
    }

    pub fn ports(mut self, ports: PortSet) -> Self {
        self.ports = Some(ports);
        self
    }

    /// Merge this update into an existing record. `first_seen` is never touched.
    pub fn apply(&self, device: &mut Device) {
        if let Some(hostname) = &self.hostname {
            device.hostname = hostname.clone();
        }
        if let Some(mac) = &self.mac {
            device.mac = mac.clone();
        }
        if let Some(vendor) = &self.vendor {
            device.vendor = vendor.clone();
        }
        if let Some(status) = self.status {
            device.status = status;
        }
        if let Some(last_seen) = self.last_seen {
            device.last_seen = last_seen;
        }
        if let Some(ports) = &self.ports {
            device.ports = ports.clone();
        }
    }

    /// Build a fresh record for an IP that is not yet on file.
    pub fn into_device(self, ip: IpAddr, now: DateTime<Utc>) -> Device {
        Device {
            ip,
            hostname: self.hostname.unwrap_or_default(),
            mac: self.mac.unwrap_or_else(|| UNKNOWN.to_string()),
            vendor: self.vendor.unwrap_or_else(|| UNKNOWN.to_string()),
            status: self.status.unwrap_or(DeviceStatus::Online),
            first_seen: now,
            last_seen: self.last_seen.unwrap_or(now),
            ports: self.ports.unwrap_or_default(),
        }
    }
}

// ── Notifications ─────────────────────────────────────────────────

/// The service a notification originates from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceTag {
    HostDiscovery,
    HostUpdater,
    PortDiscovery,
}

impl ServiceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HostDiscovery => "Host Discovery Service",
            Self::HostUpdater => "Host Updater Service",
            Self::PortDiscovery => "Port Discovery Service",
        }
    }
}

impl fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transition notification about to be handed to a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewNotification {
    pub network: NetworkId,
    pub ip: IpAddr,
    pub hostname: String,
    pub message: String,
    pub service: ServiceTag,
    pub timestamp: DateTime<Utc>,
}

impl NewNotification {
    pub fn host_discovered(
        network: &NetworkId,
        ip: IpAddr,
        hostname: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self::build(
            network,
            ip,
            hostname,
            format!("New host discovered: {hostname} ({ip})"),
            ServiceTag::HostDiscovery,
            at,
        )
    }

    pub fn host_offline(network: &NetworkId, ip: IpAddr, hostname: &str, at: DateTime<Utc>) -> Self {
        Self::build(
            network,
            ip,
            hostname,
            format!("Host {hostname} ({ip}) is offline."),
            ServiceTag::HostUpdater,
            at,
        )
    }

    pub fn host_back_online(
        network: &NetworkId,
        ip: IpAddr,
        hostname: &str,
        service: ServiceTag,
        at: DateTime<Utc>,
    ) -> Self {
        Self::build(
            network,
            ip,
            hostname,
            format!("Host {hostname} ({ip}) is back online."),
            service,
            at,
        )
    }

    /// Lists exactly the newly opened ports, not the full current set.
    pub fn new_open_ports(
        network: &NetworkId,
        ip: IpAddr,
        hostname: &str,
        new_ports: &PortSet,
        at: DateTime<Utc>,
    ) -> Self {
        let ports = new_ports
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        Self::build(
            network,
            ip,
            hostname,
            format!("New open ports discovered: {hostname} ({ip}) [{ports}]"),
            ServiceTag::PortDiscovery,
            at,
        )
    }

    fn build(
        network: &NetworkId,
        ip: IpAddr,
        hostname: &str,
        message: String,
        service: ServiceTag,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            network: network.clone(),
            ip,
            hostname: hostname.to_string(),
            message,
            service,
            timestamp: at,
        }
    }
}

/// A stored notification. Immutable apart from the bulk read flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub network: NetworkId,
    pub ip: IpAddr,
    pub hostname: String,
    pub message: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn network_id_rejects_unknown_and_blank() {
        assert!(NetworkId::parse("").is_err());
        assert!(NetworkId::parse("   ").is_err());
        assert!(NetworkId::parse("Unknown").is_err());
        assert_eq!(NetworkId::parse("  Home WiFi ").unwrap().as_str(), "Home WiFi");
    }

    #[test]
    fn partition_name_is_sanitized_and_stable() {
        let id = NetworkId::parse("Home-WiFi 5G").unwrap();
        let name = id.partition_name();
        assert!(name.starts_with("devices_home_wifi_5g_"));
        assert_eq!(name.len(), "devices_home_wifi_5g_".len() + 8);
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        assert_eq!(name, NetworkId::parse("Home-WiFi 5G").unwrap().partition_name());
    }

    #[test]
    fn partition_names_do_not_collide_on_sanitized_form() {
        let dash = NetworkId::parse("home-1").unwrap().partition_name();
        let dot = NetworkId::parse("home.1").unwrap().partition_name();
        assert_ne!(dash, dot);
    }

    #[test]
    fn partition_name_for_symbol_only_identity() {
        let name = NetworkId::parse("☕☕").unwrap().partition_name();
        assert!(name.starts_with("devices_"));
        assert_eq!(name.len(), "devices_".len() + 8);
    }

    #[test]
    fn network_id_serde_validates() {
        let ok: NetworkId = serde_json::from_str("\"Office\"").unwrap();
        assert_eq!(ok.as_str(), "Office");
        assert!(serde_json::from_str::<NetworkId>("\"Unknown\"").is_err());
    }

    #[test]
    fn device_status_parse() {
        assert_eq!("online".parse::<DeviceStatus>().unwrap(), DeviceStatus::Online);
        assert_eq!("offline".parse::<DeviceStatus>().unwrap(), DeviceStatus::Offline);
        assert!("asleep".parse::<DeviceStatus>().is_err());
    }

    #[test]
    fn update_into_device_uses_defaults() {
        let now = Utc::now();
        let device = DeviceUpdate::new().into_device(ip("10.0.0.5"), now);
        assert_eq!(device.hostname, "");
        assert!(!device.has_hostname());
        assert_eq!(device.mac, UNKNOWN);
        assert_eq!(device.status, DeviceStatus::Online);
        assert_eq!(device.first_seen, now);
        assert_eq!(device.last_seen, now);
        assert!(device.ports.is_empty());
    }

    #[test]
    fn update_apply_keeps_unset_fields() {
        let first = Utc::now() - chrono::TimeDelta::hours(2);
        let mut device = DeviceUpdate::new()
            .hostname("nas")
            .mac("aa:bb:cc:dd:ee:ff")
            .ports(PortSet::from([22, 445]))
            .into_device(ip("10.0.0.9"), first);

        let later = Utc::now();
        DeviceUpdate::new()
            .status(DeviceStatus::Offline)
            .last_seen(later)
            .apply(&mut device);

        assert_eq!(device.hostname, "nas");
        assert_eq!(device.mac, "aa:bb:cc:dd:ee:ff");
        assert_eq!(device.ports, PortSet::from([22, 445]));
        assert_eq!(device.status, DeviceStatus::Offline);
        assert_eq!(device.first_seen, first);
        assert_eq!(device.last_seen, later);
    }

    #[test]
    fn new_ports_message_lists_only_given_ports() {
        let net = NetworkId::parse("Home").unwrap();
        let n = NewNotification::new_open_ports(
            &net,
            ip("10.0.0.2"),
            "printer",
            &PortSet::from([443, 8443]),
            Utc::now(),
        );
        assert_eq!(n.service, ServiceTag::PortDiscovery);
        assert!(n.message.ends_with("[443, 8443]"));
    }

    #[test]
    fn service_tag_display() {
        assert_eq!(ServiceTag::HostUpdater.to_string(), "Host Updater Service");
    }
}
