//! Error types for libvirt-dns.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while resolving guests or running the server.
#[derive(Debug, Error)]
pub enum GuestDnsError {
    /// The state directory is missing or cannot be enumerated.
    #[error("state directory {} unavailable: {source}", path.display())]
    DirectoryUnavailable {
        /// Directory that was being enumerated.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A classified state file could not be read.
    #[error("couldn't read state file {}: {source}", path.display())]
    ReadState {
        /// File that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A classified state file does not contain the expected JSON records.
    #[error("couldn't decode state file {}: {source}", path.display())]
    RecordDecode {
        /// File that failed to decode.
        path: PathBuf,
        /// Underlying decode error.
        source: serde_json::Error,
    },

    /// Resolution was cancelled before it completed.
    #[error("guest resolution cancelled")]
    Cancelled,

    /// Resolution did not complete within the per-query deadline.
    #[error("guest resolution exceeded the {0:?} deadline")]
    DeadlineExceeded(std::time::Duration),

    /// The blocking resolution task panicked or was aborted.
    #[error("resolution task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),
}

impl GuestDnsError {
    /// Returns `true` if the error came from reading or decoding the state directory.
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            Self::DirectoryUnavailable { .. } | Self::ReadState { .. } | Self::RecordDecode { .. }
        )
    }
}
