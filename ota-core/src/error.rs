//! Error taxonomy for the update pipeline.
//!
//! Every failure below the receiver ends up as one `UpdateError`, which knows
//! the HTTP status it maps to. Display strings are what the client sees.

use std::fmt;

use thiserror::Error;

use crate::digest::Digest;

/// Malformed or inconsistent request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Content length {content_length} is smaller than the {header_size} byte header")]
    ContentTooShort {
        content_length: usize,
        header_size: usize,
    },

    #[error("Header truncated: got {got} of {expected} bytes")]
    Truncated { got: usize, expected: usize },

    #[error("Malformed header: {0}")]
    Malformed(&'static str),

    #[error("Size mismatch: header declares {declared} bytes, request carries {content_length}")]
    SizeMismatch {
        declared: u64,
        content_length: usize,
    },

    #[error("Firmware version '{0}' rejected")]
    VersionRejected(String),
}

/// Receive-side failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Receive timed out {attempts} times in a row")]
    TimeoutBudgetExhausted { attempts: u32 },

    #[error("Connection closed after {received} of {expected} bytes")]
    ConnectionClosed { received: usize, expected: usize },

    #[error("Transport failure: {0}")]
    Transport(String),
}

/// What the storage layer was doing when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Lookup,
    Erase,
    Write,
    Read,
    Info,
}

impl IoOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            IoOp::Lookup => "lookup",
            IoOp::Erase => "erase",
            IoOp::Write => "write",
            IoOp::Read => "read",
            IoOp::Info => "info",
        }
    }
}

impl fmt::Display for IoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage-layer failure, carrying the backend's own error string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to {op} region '{region}': {detail}")]
pub struct IoError {
    pub op: IoOp,
    pub region: String,
    pub detail: String,
}

impl IoError {
    pub fn new(op: IoOp, region: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            op,
            region: region.into(),
            detail: detail.into(),
        }
    }
}

/// Persisting the next boot label failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to set boot partition '{label}': {detail}")]
pub struct CommitError {
    pub label: String,
    pub detail: String,
}

/// Settings the pipeline cannot run with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("buffer_size must be greater than zero")]
    ZeroBufferSize,

    #[error("receive_timeout_ms must be greater than zero")]
    ZeroReceiveTimeout,

    #[error("post_path '{0}' must start with '/'")]
    PostPath(String),

    #[error("restart_delay_ms is {delay_ms}, the minimum is {min_ms}")]
    RestartDelayTooShort { delay_ms: u32, min_ms: u32 },
}

/// Startup failures; escalated to the lifecycle host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MountError {
    #[error("Unknown boot partition label: {0}")]
    UnknownBootLabel(String),

    #[error("Failed to read running boot label: {0}")]
    BootLabel(#[source] IoError),

    #[error("Failed to mount '{label}' at {mount_point}: {detail}")]
    Mount {
        label: String,
        mount_point: String,
        detail: String,
    },
}

/// Anything that can terminate an update request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("{region} image is {size} bytes but the region holds only {capacity}")]
    Capacity {
        region: String,
        size: usize,
        capacity: usize,
    },

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error("SHA256 mismatch on '{region}': expected {expected}, got {actual}")]
    Integrity {
        region: String,
        expected: Digest,
        actual: Digest,
    },

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl UpdateError {
    /// HTTP status sent back to the uploader.
    pub fn status_code(&self) -> u16 {
        match self {
            UpdateError::Protocol(_) | UpdateError::Capacity { .. } => 400,
            _ => 500,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            UpdateError::Protocol(_) => "protocol",
            UpdateError::Capacity { .. } => "capacity",
            UpdateError::Network(_) => "network",
            UpdateError::Io(_) => "io",
            UpdateError::Integrity { .. } => "integrity",
            UpdateError::Commit(_) => "commit",
            UpdateError::Config(_) => "config",
        }
    }
}
