//! slam-discover: Device discovery and asset reconciliation for SLAM.
//!
//! Wraps nmap, arp-scan, reverse DNS, NetBIOS and a passive mDNS cache to
//! observe the local network, then merges each observation into the
//! per-network device inventory, emitting notifications on state changes.

pub mod adapters;
pub mod arp;
pub mod config;
pub mod error;
pub mod mdns;
pub mod netbios;
pub mod network;
pub mod nmap_xml;
pub mod notify;
pub mod reconcile;
pub mod resolve;
pub mod retry;
pub mod scanner;
pub mod scheduler;
pub mod stream;
