//! SQLite connection management and shared inventory client.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use slam_core::NetworkId;

use crate::error::{Result, StoreError};
use crate::registry::{Partition, PartitionRegistry};

/// Configuration for opening the inventory database.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// SQLite URL, e.g. `sqlite://slam.db`.
    pub url: String,
    /// How long SQLite itself waits on a held lock before reporting it.
    pub busy_timeout: Duration,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://slam.db".to_string(),
            busy_timeout: Duration::from_millis(250),
            max_connections: 4,
        }
    }
}

/// Thread-safe SQLite inventory client with connection pooling.
///
/// Clone is cheap (inner Arc); the partition registry is shared between
/// clones so a partition is validated once per process.
#[derive(Clone)]
pub struct InventoryClient {
    pool: SqlitePool,
    registry: std::sync::Arc<PartitionRegistry>,
}

const CREATE_NETWORKS: &str = "CREATE TABLE IF NOT EXISTS networks (
    identity      TEXT PRIMARY KEY,
    partition     TEXT NOT NULL UNIQUE,
    cidr          TEXT NOT NULL,
    netmask       TEXT NOT NULL,
    interface     TEXT NOT NULL,
    broadcast     TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    last_activity TEXT NOT NULL,
    updated_by    TEXT
)";

const CREATE_NOTIFICATIONS: &str = "CREATE TABLE IF NOT EXISTS notifications (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    network     TEXT NOT NULL,
    ip_address  TEXT NOT NULL,
    hostname    TEXT NOT NULL,
    message     TEXT NOT NULL,
    service     TEXT NOT NULL,
    timestamp   TEXT NOT NULL,
    read        INTEGER NOT NULL DEFAULT 0
)";

impl InventoryClient {
    /// Open (creating if missing) the inventory database and load the
    /// partitions of every network already on file.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(StoreError::from)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let client = Self {
            pool,
            registry: std::sync::Arc::new(PartitionRegistry::new()),
        };
        client.migrate().await?;

        tracing::info!(
            url = %config.url,
            partitions = client.registry.len(),
            "Opened device inventory"
        );
        Ok(client)
    }

    /// Get a reference to the underlying pool for direct operations.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn registry(&self) -> &PartitionRegistry {
        &self.registry
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(CREATE_NETWORKS).execute(&self.pool).await?;
        sqlx::query(CREATE_NOTIFICATIONS).execute(&self.pool).await?;

        let rows = sqlx::query("SELECT identity FROM networks")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let raw: String = row.try_get("identity")?;
            match NetworkId::parse(&raw) {
                Ok(network) => {
                    self.create_partition(&network).await?;
                }
                Err(e) => tracing::warn!(identity = %raw, error = %e, "Skipping invalid network row"),
            }
        }
        Ok(())
    }

    /// Create the partition table if needed and register its handle.
    pub(crate) async fn create_partition(&self, network: &NetworkId) -> Result<Partition> {
        if let Some(partition) = self.registry.get(network) {
            return Ok(partition);
        }

        let partition = PartitionRegistry::derive(network)?;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                ip_address  TEXT PRIMARY KEY,
                hostname    TEXT NOT NULL,
                mac_address TEXT NOT NULL,
                vendor      TEXT NOT NULL,
                status      TEXT NOT NULL,
                first_seen  TEXT NOT NULL,
                last_seen   TEXT NOT NULL,
                ports       TEXT NOT NULL DEFAULT '[]'
            )",
            partition.table
        );
        sqlx::query(&ddl).execute(&self.pool).await?;

        tracing::debug!(network = %network, table = %partition.table, "Partition ready");
        Ok(self.registry.insert(partition))
    }
}
