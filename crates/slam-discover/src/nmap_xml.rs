//! Nmap XML output deserialization.
//!
//! Every nmap invocation runs with `-oX -`; this module maps that XML onto
//! typed structs with `quick-xml` + serde and exposes the few accessors the
//! sweeps and the NetBIOS probe need.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::Deserialize;

use crate::adapters::PortState;
use crate::error::{DiscoverError, Result};

/// Root element: `<nmaprun>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "nmaprun")]
pub struct NmapRun {
    #[serde(rename = "@args")]
    pub args: Option<String>,
    #[serde(rename = "host", default)]
    pub hosts: Vec<NmapHost>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapHost {
    pub status: Option<HostStatus>,
    #[serde(rename = "address", default)]
    pub addresses: Vec<Address>,
    pub hostnames: Option<Hostnames>,
    pub ports: Option<Ports>,
    pub hostscript: Option<HostScript>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostStatus {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Address {
    #[serde(rename = "@addr")]
    pub addr: String,
    #[serde(rename = "@addrtype")]
    pub addr_type: String,
    #[serde(rename = "@vendor")]
    pub vendor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostnames {
    #[serde(rename = "hostname", default)]
    pub hostnames: Vec<Hostname>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostname {
    #[serde(rename = "@name")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ports {
    #[serde(rename = "port", default)]
    pub ports: Vec<NmapPort>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapPort {
    #[serde(rename = "@protocol")]
    pub protocol: String,
    #[serde(rename = "@portid")]
    pub port_id: u16,
    pub state: PortStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortStatus {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostScript {
    #[serde(rename = "script", default)]
    pub scripts: Vec<Script>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@output", default)]
    pub output: String,
}

impl NmapHost {
    /// The host's IP address (IPv4 preferred).
    pub fn ip(&self) -> Option<IpAddr> {
        ["ipv4", "ipv6"].iter().find_map(|kind| {
            self.addresses
                .iter()
                .find(|a| a.addr_type == *kind)
                .and_then(|a| a.addr.parse().ok())
        })
    }

    pub fn mac(&self) -> Option<&str> {
        self.mac_address().map(|a| a.addr.as_str())
    }

    /// Vendor nmap attached to the MAC address, if any.
    pub fn vendor(&self) -> Option<&str> {
        self.mac_address().and_then(|a| a.vendor.as_deref())
    }

    fn mac_address(&self) -> Option<&Address> {
        self.addresses.iter().find(|a| a.addr_type == "mac")
    }

    /// Extract the first hostname, if present.
    pub fn hostname(&self) -> Option<&str> {
        self.hostnames
            .as_ref()
            .and_then(|hn| hn.hostnames.first())
            .map(|h| h.name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Check if the host is up.
    pub fn is_up(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.state == "up")
    }

    /// TCP port states reported for this host.
    pub fn tcp_ports(&self) -> BTreeMap<u16, PortState> {
        self.ports
            .iter()
            .flat_map(|p| p.ports.iter())
            .filter(|p| p.protocol == "tcp")
            .map(|p| (p.port_id, PortState::parse(&p.state.state)))
            .collect()
    }

    /// Output of a host script such as `nbstat`.
    pub fn script_output(&self, id: &str) -> Option<&str> {
        self.hostscript
            .as_ref()
            .and_then(|hs| hs.scripts.iter().find(|s| s.id == id))
            .map(|s| s.output.as_str())
    }
}

impl NmapRun {
    /// The host entry for `ip`, when nmap reported one.
    pub fn host(&self, ip: IpAddr) -> Option<&NmapHost> {
        self.hosts.iter().find(|h| h.ip() == Some(ip))
    }
}

/// Parse nmap XML bytes into a structured `NmapRun`.
pub fn parse_nmap_xml(xml: &[u8]) -> Result<NmapRun> {
    quick_xml::de::from_reader(xml).map_err(|e| DiscoverError::Parse(format!("nmap XML: {e}")))
}
