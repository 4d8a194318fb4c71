use thiserror::Error;

use crate::backend::BackendError;

/// Rejected [`crate::BridgeConfig`] values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid unit {0} (expected 0 or 1)")]
    InvalidUnit(u8),
    #[error("staging capacity {0} is out of range")]
    StagingCapacity(usize),
}

/// Errors returned by the bridge entry points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("a request is already in flight")]
    Busy,
    #[error("empty command descriptor block")]
    EmptyCommand,
    #[error("command descriptor block of {0} bytes is too long")]
    CommandTooLong(usize),
    #[error("no bulk transfer is pending")]
    NoBulkTransfer,
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
