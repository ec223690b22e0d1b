//! Error types for Pulseframe

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum TemporalError {
    #[error("bar time is not a legal map time domain")]
    BarTimeDomain,

    #[error("unsupported tempo map state version: {0}")]
    UnsupportedStateVersion(u32),

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias
pub type TemporalResult<T> = Result<T, TemporalError>;
