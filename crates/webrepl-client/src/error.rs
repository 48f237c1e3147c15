//! Error types for device operations.
//!
//! Discovery and liveness checks never produce these: they answer with
//! `None` or `false` instead.  Everything that moves bytes to or from a
//! connected board reports a [`DeviceError`].

use std::path::PathBuf;

use thiserror::Error;

/// Which step of a file transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    /// Sending the request frame or reading its acknowledgement.
    Request,
    /// Streaming file content.
    Payload,
    /// Reading the final acknowledgement.
    Completion,
}

impl std::fmt::Display for TransferStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferStage::Request => f.write_str("request"),
            TransferStage::Payload => f.write_str("payload"),
            TransferStage::Completion => f.write_str("completion"),
        }
    }
}

/// What went wrong in the binary protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolFailure {
    /// The device answered with a nonzero status code.
    #[error("device rejected the operation with code {0}")]
    Rejected(u16),

    /// No `"WB"` signature appeared within the allowed number of reads.
    #[error("no acknowledgement signature within {0} reads")]
    SignatureNotFound(u32),

    /// The device stopped sending before a complete record arrived.
    #[error("stream ended unexpectedly")]
    UnexpectedEnd,
}

#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device could not be reached or the connection dropped.
    #[error("cannot reach {endpoint}: {reason}")]
    Connectivity { endpoint: String, reason: String },

    /// The device did not accept the password.
    #[error("authentication failed for {endpoint}")]
    Authentication { endpoint: String },

    /// The binary transfer protocol failed.
    #[error("protocol error during {stage}: {failure}")]
    Protocol {
        stage: TransferStage,
        failure: ProtocolFailure,
    },

    /// The local file is larger than the upload limit.  Raised before any
    /// network I/O.
    #[error("{} is {size} bytes, limit is {limit}", .path.display())]
    SizeLimit { path: PathBuf, size: u64, limit: u64 },

    /// The local file could not be read or written.
    #[error("local file {}: {source}", .path.display())]
    LocalFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The device did not come back after a reset.
    #[error("device did not come back after reset ({attempts} attempts)")]
    DeviceReset { attempts: u32 },

    /// An operation needed an open session and there was none.
    #[error("session is not connected")]
    NotConnected,
}

impl DeviceError {
    pub(crate) fn protocol(stage: TransferStage, failure: ProtocolFailure) -> Self {
        DeviceError::Protocol { stage, failure }
    }

    pub(crate) fn local_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DeviceError::LocalFile {
            path: path.into(),
            source,
        }
    }
}
