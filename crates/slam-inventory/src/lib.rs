//! SLAM Inventory: durable device inventory partitioned per network.
//!
//! This crate is the single mutation point for stored state. Every read
//! and write of networks, device records, and notifications flows through
//! an [`InventoryStore`], so per-network isolation and the distinction
//! between transient lock contention and real storage failures are
//! enforced in one place.

pub mod client;
pub mod error;
pub mod memory;
pub mod mutations;
pub mod queries;
pub mod registry;
pub mod store;

pub use client::{InventoryClient, StoreConfig};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use registry::{Partition, PartitionRegistry};
pub use store::{InventoryStore, Upserted};
