//! Direct probe of one host: arp-scan for MAC/vendor, reverse DNS for a name.

use std::net::IpAddr;

use async_trait::async_trait;

use crate::adapters::{DeviceProbe, ProbeInfo};
use crate::scanner::run_tool;

pub struct ArpProbe {
    arp_scan_path: String,
}

impl ArpProbe {
    pub fn new(arp_scan_path: &str) -> Self {
        Self {
            arp_scan_path: arp_scan_path.to_string(),
        }
    }

    async fn arp_lookup(&self, ip: IpAddr, interface: &str) -> Option<(String, String)> {
        if ip.is_ipv6() {
            return None;
        }
        let target = ip.to_string();
        let mut args = vec![target.as_str(), "-x", "-d"];
        if !slam_core::is_unknown(interface) {
            args.extend(["-I", interface]);
        }
        match run_tool(&self.arp_scan_path, &args).await {
            Ok(output) => parse_arp_scan(&String::from_utf8_lossy(&output.stdout), ip),
            Err(e) => {
                tracing::debug!(ip = %ip, error = %e, "arp-scan unavailable");
                None
            }
        }
    }
}

#[async_trait]
impl DeviceProbe for ArpProbe {
    async fn probe(&self, ip: IpAddr, interface: &str) -> ProbeInfo {
        let mut info = ProbeInfo::default();
        if let Some((mac, vendor)) = self.arp_lookup(ip, interface).await {
            info.mac = mac;
            info.vendor = vendor;
        }
        if let Some(name) = reverse_dns(ip).await {
            info.hostname = name;
        }
        info
    }
}

/// Find the MAC and vendor columns of `ip` in `arp-scan -x` output.
///
/// Lines are tab separated: `ip`, `mac`, `vendor`.
pub fn parse_arp_scan(output: &str, ip: IpAddr) -> Option<(String, String)> {
    output.lines().find_map(|line| {
        let mut cols = line.split('\t');
        let addr: IpAddr = cols.next()?.trim().parse().ok()?;
        if addr != ip {
            return None;
        }
        let mac = cols.next()?.trim();
        let vendor = cols.next()?.trim();
        if mac.is_empty() {
            return None;
        }
        Some((mac.to_string(), vendor.to_string()))
    })
}

/// PTR lookup through the system resolver, run off the async workers.
async fn reverse_dns(ip: IpAddr) -> Option<String> {
    let name = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip))
        .await
        .ok()?
        .ok()?;
    // Some resolvers echo the numeric address back when no PTR exists.
    if name.is_empty() || name.parse::<IpAddr>().is_ok() {
        return None;
    }
    Some(name)
}
