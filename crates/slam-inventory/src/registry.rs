//! Registry of per-network device partitions.
//!
//! Maps a normalized [`NetworkId`] to the storage handle of its partition.
//! A partition name is derived and validated exactly once, when the
//! network is registered; every later lookup reuses the stored handle.

use std::collections::HashMap;

use parking_lot::RwLock;
use slam_core::NetworkId;

use crate::error::{Result, StoreError};

/// Handle to one network's isolated device partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub network: NetworkId,
    /// Table name, safe to interpolate into SQL once validated.
    pub table: String,
}

#[derive(Debug, Default)]
pub struct PartitionRegistry {
    partitions: RwLock<HashMap<NetworkId, Partition>>,
}

impl PartitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a registered partition.
    pub fn get(&self, network: &NetworkId) -> Option<Partition> {
        self.partitions.read().get(network).cloned()
    }

    /// Look up a partition, failing with `UnknownNetwork` when unregistered.
    pub fn require(&self, network: &NetworkId) -> Result<Partition> {
        self.get(network)
            .ok_or_else(|| StoreError::UnknownNetwork(network.to_string()))
    }

    /// Build and validate the partition handle for a network without registering it.
    pub fn derive(network: &NetworkId) -> Result<Partition> {
        let table = network.partition_name();
        if !is_valid_table_name(&table) {
            return Err(StoreError::InvalidPartition {
                network: network.to_string(),
                name: table,
            });
        }
        Ok(Partition {
            network: network.clone(),
            table,
        })
    }

    /// Record a partition handle. Re-registering the same network is a no-op.
    pub fn insert(&self, partition: Partition) -> Partition {
        self.partitions
            .write()
            .entry(partition.network.clone())
            .or_insert(partition)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.partitions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_valid_table_name(name: &str) -> bool {
    name.starts_with("devices_")
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
