//! Error types shared across the opm workspace.

use thiserror::Error;

/// Errors raised by the scan engine and its callers (§7).
#[derive(Error, Debug)]
pub enum OpmError {
    #[error("unknown scanset {0}")]
    UnknownSet(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("{0} did not resolve")]
    UnresolvedHost(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("DNS error: {0}")]
    Dns(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type OpmResult<T> = Result<T, OpmError>;

/// Errors a single probe attempt can fail with.
///
/// `Cancelled` is swallowed by the engine (§7); anything else is
/// reported to the owning [`Scan`](crate::Scan)'s error sinks and the
/// probe is treated as clean for that attempt.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProbeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProbeError::Cancelled)
    }
}
