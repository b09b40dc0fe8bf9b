//! Configuration for the slam-discover engine and daemon.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;
use slam_inventory::StoreConfig;

use crate::retry::RetryPolicy;

/// Top-level discover configuration.
///
/// Loaded from `slam.toml` `[discover]` section or
/// `SLAM_DISCOVER__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Path to the nmap binary (default: "nmap").
    #[serde(default = "default_nmap_path")]
    pub nmap_path: String,

    /// Path to the arp-scan binary (default: "arp-scan").
    #[serde(default = "default_arp_scan_path")]
    pub arp_scan_path: String,

    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Record newly discovered hosts during liveness passes.
    #[serde(default = "default_true")]
    pub host_discovery: bool,

    /// Track online/offline transitions during liveness passes.
    #[serde(default = "default_true")]
    pub host_updater: bool,

    #[serde(default = "default_discovery_interval")]
    pub host_discovery_interval_mins: u64,

    #[serde(default = "default_true")]
    pub port_scan: bool,

    #[serde(default = "default_port_interval")]
    pub port_discovery_interval_mins: u64,

    /// Number of most common TCP ports probed per device.
    #[serde(default = "default_top_ports")]
    pub port_scan_top_ports: u16,

    #[serde(default)]
    pub notifications: NotificationToggles,

    #[serde(default)]
    pub retry: RetrySettings,

    /// Upper bound on a single NetBIOS probe.
    #[serde(default = "default_netbios_timeout")]
    pub netbios_timeout_secs: u64,

    #[serde(default)]
    pub mdns: MdnsSettings,

    #[serde(default)]
    pub network: NetworkOverrides,

    /// Passes allowed to run at once across the background loops.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_passes: usize,
}

/// Which transition kinds produce notifications.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct NotificationToggles {
    /// "New host discovered".
    #[serde(default = "default_true")]
    pub host_discovery: bool,
    /// "offline" and "back online".
    #[serde(default = "default_true")]
    pub host_update: bool,
    /// "New open ports discovered".
    #[serde(default = "default_true")]
    pub port_discovery: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MdnsSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_service_types")]
    pub service_types: Vec<String>,
}

/// Field-by-field overrides of the probed network context.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkOverrides {
    pub identity: Option<String>,
    pub cidr: Option<String>,
    pub interface: Option<String>,
}

/// Service types browsed by the passive mDNS listener.
const SERVICE_TYPES: &[&str] = &[
    "_smb._tcp.local.",
    "_ms-sql._tcp.local.",
    "_microsoft-ds._tcp.local.",
    "_rdp._tcp.local.",
    "_vnc._tcp.local.",
    "_ipp._tcp.local.",
    "_printer._tcp.local.",
    "_nfs._tcp.local.",
    "_ftp._tcp.local.",
    "_ssh._tcp.local.",
    "_afp._tcp.local.",
    "_http._tcp.local.",
    "_https._tcp.local.",
    "_airplay._tcp.local.",
    "_homekit._tcp.local.",
    "_airdrop._tcp.local.",
    "_mdns._udp.local.",
    "_services._dns-sd._udp.local.",
    "_googlecast._tcp.local.",
    "_cast._tcp.local.",
    "_dhcp._udp.local.",
    "_dns._udp.local.",
    "_upnp._udp.local.",
    "_nb._tcp.local.",
    "_nbns._udp.local.",
    "_mysql._tcp.local.",
    "_postgresql._tcp.local.",
    "_sip._tcp.local.",
    "_stun._tcp.local.",
    "_ntp._udp.local.",
    "_http-alt._tcp.local.",
    "_dns-sd._udp.local.",
];

fn default_nmap_path() -> String {
    "nmap".to_string()
}

fn default_arp_scan_path() -> String {
    "arp-scan".to_string()
}

fn default_database_url() -> String {
    "sqlite://slam.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    250
}

fn default_max_connections() -> u32 {
    4
}

fn default_discovery_interval() -> u64 {
    15
}

fn default_port_interval() -> u64 {
    30
}

fn default_top_ports() -> u16 {
    100
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_netbios_timeout() -> u64 {
    30
}

fn default_service_types() -> Vec<String> {
    SERVICE_TYPES.iter().map(|s| s.to_string()).collect()
}

fn default_max_concurrent() -> usize {
    2
}

fn default_true() -> bool {
    true
}

impl Default for NotificationToggles {
    fn default() -> Self {
        Self {
            host_discovery: true,
            host_update: true,
            port_discovery: true,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for MdnsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            service_types: default_service_types(),
        }
    }
}

impl MdnsSettings {
    /// Configured service types with duplicates removed, in stable order.
    pub fn unique_service_types(&self) -> Vec<String> {
        let unique: BTreeSet<&str> = self.service_types.iter().map(String::as_str).collect();
        unique.into_iter().map(str::to_string).collect()
    }
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            nmap_path: default_nmap_path(),
            arp_scan_path: default_arp_scan_path(),
            database_url: default_database_url(),
            busy_timeout_ms: default_busy_timeout_ms(),
            max_connections: default_max_connections(),
            host_discovery: true,
            host_updater: true,
            host_discovery_interval_mins: default_discovery_interval(),
            port_scan: true,
            port_discovery_interval_mins: default_port_interval(),
            port_scan_top_ports: default_top_ports(),
            notifications: NotificationToggles::default(),
            retry: RetrySettings::default(),
            netbios_timeout_secs: default_netbios_timeout(),
            mdns: MdnsSettings::default(),
            network: NetworkOverrides::default(),
            max_concurrent_passes: default_max_concurrent(),
        }
    }
}

impl DiscoverConfig {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            url: self.database_url.clone(),
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            max_connections: self.max_connections,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry.attempts,
            backoff: Duration::from_millis(self.retry.backoff_ms),
        }
    }

    /// The liveness loop runs when either of its halves is enabled.
    pub fn liveness_enabled(&self) -> bool {
        self.host_discovery || self.host_updater
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.host_discovery_interval_mins.max(1) * 60)
    }

    pub fn port_interval(&self) -> Duration {
        Duration::from_secs(self.port_discovery_interval_mins.max(1) * 60)
    }

    pub fn netbios_timeout(&self) -> Duration {
        Duration::from_secs(self.netbios_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DiscoverConfig::default();
        assert_eq!(config.nmap_path, "nmap");
        assert_eq!(config.host_discovery_interval_mins, 15);
        assert_eq!(config.port_discovery_interval_mins, 30);
        assert_eq!(config.port_scan_top_ports, 100);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert!(config.liveness_enabled());
        assert_eq!(config.liveness_interval(), Duration::from_secs(900));
    }

    #[test]
    fn test_service_types_deduplicated() {
        let mut settings = MdnsSettings::default();
        assert_eq!(settings.unique_service_types().len(), 32);

        settings.service_types.push("_ssh._tcp.local.".to_string());
        let unique = settings.unique_service_types();
        assert_eq!(unique.len(), 32);
        assert!(unique.contains(&"_googlecast._tcp.local.".to_string()));
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(
                "[discover]\nport_scan = false\n[discover.notifications]\nport_discovery = false\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let parsed: DiscoverConfig = cfg.get("discover").unwrap();
        assert!(!parsed.port_scan);
        assert!(!parsed.notifications.port_discovery);
        assert!(parsed.notifications.host_discovery);
        assert_eq!(parsed.retry.attempts, 5);
        assert_eq!(parsed.nmap_path, "nmap");
    }
}
