//! Seams between the engine and the scanning tools.
//!
//! Every adapter degrades instead of failing: a missing binary, a timeout
//! or unparseable output is logged and reported as "nothing observed".

use std::collections::BTreeMap;
use std::net::IpAddr;

use async_trait::async_trait;
use slam_core::{is_unknown, UNKNOWN};

/// What a liveness sweep knows about one responding host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepHost {
    /// Hostname reported by the scanner itself (PTR lookup during the sweep).
    pub hostname: Option<String>,
    pub mac: Option<String>,
    pub vendor: Option<String>,
}

impl SweepHost {
    pub fn named(hostname: impl Into<String>) -> Self {
        Self {
            hostname: Some(hostname.into()),
            ..Self::default()
        }
    }
}

/// Responding hosts of one liveness sweep.
pub type Sweep = BTreeMap<IpAddr, SweepHost>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Open,
    Closed,
    Filtered,
    Other,
}

impl PortState {
    pub fn parse(s: &str) -> Self {
        match s {
            "open" => Self::Open,
            "closed" => Self::Closed,
            "filtered" | "open|filtered" | "closed|filtered" => Self::Filtered,
            _ => Self::Other,
        }
    }
}

/// Per-port states of one host, TCP only.
pub type PortSweep = BTreeMap<u16, PortState>;

/// MAC, vendor and reverse-DNS name from the direct probe of one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeInfo {
    pub mac: String,
    pub vendor: String,
    pub hostname: String,
}

impl Default for ProbeInfo {
    fn default() -> Self {
        Self {
            mac: UNKNOWN.to_string(),
            vendor: UNKNOWN.to_string(),
            hostname: UNKNOWN.to_string(),
        }
    }
}

#[async_trait]
pub trait ScanSource: Send + Sync {
    /// Hosts that answered a liveness sweep of `cidr`, or `None` when the
    /// sweep could not run.
    async fn liveness_sweep(&self, cidr: &str) -> Option<Sweep>;

    /// Port states of `ip`, or `None` when the host did not answer the
    /// sweep or the sweep could not run.
    async fn port_sweep(&self, ip: IpAddr, top_ports: u16) -> Option<PortSweep>;
}

#[async_trait]
pub trait DeviceProbe: Send + Sync {
    async fn probe(&self, ip: IpAddr, interface: &str) -> ProbeInfo;
}

/// A fallback hostname lookup in the resolution chain.
#[async_trait]
pub trait HostnameSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// A hostname for `ip`, or `None` when this source knows nothing.
    async fn lookup(&self, ip: IpAddr) -> Option<String>;
}

/// `Some(value)` when `value` carries information.
pub fn known(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !is_unknown(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_state_parse() {
        assert_eq!(PortState::parse("open"), PortState::Open);
        assert_eq!(PortState::parse("closed"), PortState::Closed);
        assert_eq!(PortState::parse("open|filtered"), PortState::Filtered);
        assert_eq!(PortState::parse("unfiltered"), PortState::Other);
    }

    #[test]
    fn test_known_filters_placeholders() {
        assert_eq!(known(Some(" nas.lan ")), Some("nas.lan"));
        assert_eq!(known(Some("Unknown")), None);
        assert_eq!(known(Some("")), None);
        assert_eq!(known(None), None);
    }
}
