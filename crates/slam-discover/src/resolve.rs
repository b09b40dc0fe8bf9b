//! Hostname resolution chain.
//!
//! Sources are consulted in a fixed order and the first informative answer
//! wins: the scanner's own name from the sweep, the direct probe's reverse
//! DNS name, then each fallback source (NetBIOS, the passive mDNS cache).
//! Costly fallbacks only run when every earlier step came back empty.

use std::net::IpAddr;
use std::sync::Arc;

use slam_core::UNKNOWN;

use crate::adapters::{known, DeviceProbe, HostnameSource, SweepHost};

/// Everything learned about one responding host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub hostname: String,
    pub mac: String,
    pub vendor: String,
    /// Which step produced the hostname; "none" when nothing did.
    pub source: &'static str,
}

pub struct HostnameResolver {
    probe: Arc<dyn DeviceProbe>,
    fallbacks: Vec<Arc<dyn HostnameSource>>,
}

impl HostnameResolver {
    /// `fallbacks` are tried in the order given.
    pub fn new(probe: Arc<dyn DeviceProbe>, fallbacks: Vec<Arc<dyn HostnameSource>>) -> Self {
        Self { probe, fallbacks }
    }

    /// Resolve `ip` observed on `interface` with the sweep's own findings.
    pub async fn resolve(&self, ip: IpAddr, interface: &str, seen: &SweepHost) -> Resolution {
        let probe = self.probe.probe(ip, interface).await;

        let mac = known(Some(probe.mac.as_str()))
            .or(known(seen.mac.as_deref()))
            .unwrap_or(UNKNOWN)
            .to_string();
        let vendor = known(Some(probe.vendor.as_str()))
            .or(known(seen.vendor.as_deref()))
            .unwrap_or(UNKNOWN)
            .to_string();

        let (hostname, source) = if let Some(name) = known(seen.hostname.as_deref()) {
            (name.to_string(), "scanner")
        } else if let Some(name) = known(Some(probe.hostname.as_str())) {
            (name.to_string(), "probe")
        } else {
            self.fallback(ip).await
        };

        tracing::debug!(ip = %ip, hostname = %hostname, source, "Resolved host");
        Resolution {
            hostname,
            mac,
            vendor,
            source,
        }
    }

    async fn fallback(&self, ip: IpAddr) -> (String, &'static str) {
        for source in &self.fallbacks {
            if let Some(name) = source.lookup(ip).await {
                if let Some(name) = known(Some(name.as_str())) {
                    return (name.to_string(), source.name());
                }
            }
        }
        (UNKNOWN.to_string(), "none")
    }
}
