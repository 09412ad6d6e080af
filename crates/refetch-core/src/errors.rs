use std::io;

/// Errors surfaced by the poll path or a snapshot's checksum accessor.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("checksum resolution failed: {0}")]
    Checksum(String),

    #[error("poll failed: {0}")]
    Poll(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors raised by the polling controller itself.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("poll interval must be greater than zero")]
    ZeroInterval,

    #[error("controller is no longer running")]
    Stopped,
}
