//! Records produced by interactive passes for streaming consumers.
//!
//! A pass emits one [`ScanEvent::Host`] per processed device, then exactly
//! one [`ScanEvent::Total`] followed by [`ScanEvent::Done`], even when no
//! device was processed.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Device, DeviceStatus};

/// Per-device progress record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostReport {
    pub ip: IpAddr,
    pub hostname: String,
    pub mac: String,
    pub vendor: String,
    pub status: DeviceStatus,
    pub last_seen: DateTime<Utc>,
    pub ports: Vec<u16>,
}

impl From<&Device> for HostReport {
    fn from(device: &Device) -> Self {
        Self {
            ip: device.ip,
            hostname: device.hostname.clone(),
            mac: device.mac.clone(),
            vendor: device.vendor.clone(),
            status: device.status,
            last_seen: device.last_seen,
            ports: device.ports.iter().copied().collect(),
        }
    }
}

/// One item of an interactive pass stream.
///
/// Serializes as `{"host": {...}}`, `{"total": n}` and `{"done": true}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScanEvent {
    Host { host: HostReport },
    Total { total: usize },
    Done { done: bool },
}

impl ScanEvent {
    pub fn host(report: HostReport) -> Self {
        Self::Host { host: report }
    }

    pub fn total(total: usize) -> Self {
        Self::Total { total }
    }

    pub fn done() -> Self {
        Self::Done { done: true }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PortSet;

    #[test]
    fn host_event_wraps_report() {
        let now = Utc::now();
        let device = Device {
            ip: "192.168.1.20".parse().unwrap(),
            hostname: "tv.local".to_string(),
            mac: "AA:BB:CC:00:11:22".to_string(),
            vendor: "Acme".to_string(),
            status: DeviceStatus::Online,
            first_seen: now,
            last_seen: now,
            ports: PortSet::from([8009, 80]),
        };

        let json = serde_json::to_value(ScanEvent::host(HostReport::from(&device))).unwrap();
        assert_eq!(json["host"]["ip"], "192.168.1.20");
        assert_eq!(json["host"]["status"], "online");
        assert_eq!(json["host"]["ports"], serde_json::json!([80, 8009]));
    }

    #[test]
    fn terminal_events_shape() {
        assert_eq!(
            serde_json::to_string(&ScanEvent::total(3)).unwrap(),
            r#"{"total":3}"#
        );
        assert_eq!(
            serde_json::to_string(&ScanEvent::done()).unwrap(),
            r#"{"done":true}"#
        );
        assert!(ScanEvent::done().is_done());
        assert!(!ScanEvent::total(0).is_done());
    }
}
