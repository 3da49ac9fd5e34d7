//! Error types used by this lib.
use thiserror::Error;

/// Errors raised while turning a CTE capture into an angle estimate.
///
/// Every variant is local to a single event: callers drop the offending packet
/// and carry on with the next one.
#[derive(Debug, Error)]
pub enum DfeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Received packet of insufficient sample number: {available} (required: {required})")]
    TruncatedPacket { required: usize, available: usize },
    #[error("Degenerate signal: {0}")]
    DegenerateSignal(&'static str),
    #[error("IO error while reading packets: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Error in writing parquet file: {0}")]
    Parquet(String),
    #[cfg(feature = "parquet")]
    #[error("Error in building arrow batch: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("IO error in file persistence: {0}")]
    Io(#[from] std::io::Error),
}
