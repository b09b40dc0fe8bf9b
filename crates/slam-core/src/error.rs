use thiserror::Error;

/// Errors raised while constructing or parsing core domain values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid network identity: {0:?}")]
    InvalidIdentity(String),

    #[error("Invalid device status: {0:?}")]
    InvalidStatus(String),
}
