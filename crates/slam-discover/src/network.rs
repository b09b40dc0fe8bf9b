//! Detection of the network the host is currently attached to.

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use ipnet::Ipv4Net;
use slam_core::{is_unknown, NetworkId, NetworkMeta, UNKNOWN};

use crate::config::NetworkOverrides;
use crate::scanner::run_tool;

/// Identity and addressing of the attached network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkContext {
    pub identity: NetworkId,
    pub meta: NetworkMeta,
}

#[async_trait]
pub trait NetworkSource: Send + Sync {
    /// The attached network, or `None` when its identity is unknown.
    async fn current(&self) -> Option<NetworkContext>;
}

/// Probes the SSID and interface table of this machine.
pub struct NetworkProbe {
    overrides: NetworkOverrides,
}

impl NetworkProbe {
    pub fn new(overrides: NetworkOverrides) -> Self {
        Self { overrides }
    }
}

#[async_trait]
impl NetworkSource for NetworkProbe {
    async fn current(&self) -> Option<NetworkContext> {
        let raw = match &self.overrides.identity {
            Some(identity) => identity.clone(),
            None => read_ssid().await.unwrap_or_else(|| UNKNOWN.to_string()),
        };
        let identity = match NetworkId::parse(&raw) {
            Ok(identity) => identity,
            Err(_) => {
                tracing::debug!("No network identity available");
                return None;
            }
        };

        let mut meta = interface_meta(self.overrides.interface.as_deref());
        if let Some(cidr) = &self.overrides.cidr {
            meta.cidr = cidr.clone();
        }
        if let Some(interface) = &self.overrides.interface {
            meta.interface = interface.clone();
        }
        Some(NetworkContext { identity, meta })
    }
}

/// SSID of the wireless network, if any.
async fn read_ssid() -> Option<String> {
    let ssid = if cfg!(target_os = "macos") {
        let output = run_tool("ipconfig", &["getsummary", "en0"]).await.ok()?;
        parse_getsummary_ssid(&String::from_utf8_lossy(&output.stdout))
    } else {
        let output = run_tool("iwgetid", &["-r"]).await.ok()?;
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    };
    ssid.filter(|s| !is_unknown(s))
}

/// Pull the `SSID : <name>` value out of `ipconfig getsummary` output.
pub fn parse_getsummary_ssid(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (_, ssid) = line.split_once(" SSID : ")?;
        let ssid = ssid.trim();
        (!ssid.is_empty()).then(|| ssid.to_string())
    })
}

/// Addressing of `preferred`, or of the first non-loopback IPv4 interface.
fn interface_meta(preferred: Option<&str>) -> NetworkMeta {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read interface table");
            return NetworkMeta::default();
        }
    };

    let candidates: Vec<(String, if_addrs::Ifv4Addr)> = interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.addr {
            if_addrs::IfAddr::V4(v4) => Some((iface.name, v4)),
            _ => None,
        })
        .collect();

    let chosen = match preferred {
        Some(name) => candidates.iter().find(|(n, _)| n == name),
        None => candidates
            .iter()
            .find(|(n, _)| n.starts_with("wl") || n.starts_with("en") || n.starts_with("eth"))
            .or(candidates.first()),
    };

    match chosen {
        Some((name, addr)) => meta_for(name, addr.ip, addr.netmask, addr.broadcast),
        None => NetworkMeta::default(),
    }
}

/// Network metadata for one interface address; the CIDR is truncated to
/// the network address.
pub fn meta_for(
    interface: &str,
    ip: Ipv4Addr,
    netmask: Ipv4Addr,
    broadcast: Option<Ipv4Addr>,
) -> NetworkMeta {
    let cidr = ipnet::ipv4_mask_to_prefix(netmask)
        .ok()
        .and_then(|prefix| Ipv4Net::new(ip, prefix).ok())
        .map(|net| net.trunc().to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());

    NetworkMeta {
        cidr,
        netmask: netmask.to_string(),
        interface: interface.to_string(),
        broadcast: broadcast
            .map(|b| IpAddr::V4(b).to_string())
            .unwrap_or_else(|| UNKNOWN.to_string()),
    }
}
