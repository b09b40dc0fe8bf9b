//! slam-core: Shared types for the SLAM local-area monitor.
//!
//! This crate provides the vocabulary used across all SLAM components:
//! - Network identities and their per-network partition names
//! - Device records, status, and the merge rule every store applies
//! - Notifications and the services that originate them
//! - Streaming records produced by interactive passes

pub mod error;
pub mod events;
pub mod types;

pub use error::CoreError;
pub use events::{HostReport, ScanEvent};
pub use types::{
    is_unknown, Device, DeviceStatus, DeviceUpdate, Network, NetworkId, NetworkMeta,
    NewNotification, Notification, PortSet, ServiceTag, UNKNOWN,
};
