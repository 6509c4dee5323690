//! Engine error type.

use tsbridge_client::{RpcError, SpawnError};
use tsbridge_config::ConfigError;
use tsbridge_editor::HostError;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// No server session. Start one first.
    #[error("analysis server is not running")]
    NotRunning,
    #[error("current buffer has no file name")]
    NoFile,
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("buffer snapshot failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BridgeError {
    /// Whether the server connection is gone (never started, or lost).
    #[must_use]
    pub fn is_not_running(&self) -> bool {
        matches!(self, Self::NotRunning | Self::Rpc(RpcError::Disconnected))
    }
}
