//! Error types for the slam-discover crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("{tool} not found or not executable: {detail}")]
    ToolUnavailable { tool: String, detail: String },

    #[error("{tool} did not finish within {seconds}s")]
    ToolTimeout { tool: String, seconds: u64 },

    #[error("{tool} exited with code {code}: {stderr}")]
    ToolFailed {
        tool: String,
        code: i32,
        stderr: String,
    },

    #[error("Failed to parse tool output: {0}")]
    Parse(String),

    #[error("Inventory error: {0}")]
    Store(#[from] slam_inventory::StoreError),

    #[error("mDNS listener error: {0}")]
    Mdns(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
