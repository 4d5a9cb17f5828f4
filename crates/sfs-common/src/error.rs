//! Error types for SFS
//!
//! This module defines the common error types used throughout the system.

use thiserror::Error;

/// Common result type for SFS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for SFS
#[derive(Debug, Error)]
pub enum Error {
    // Storage errors
    #[error("volume I/O error: {0}")]
    VolumeIo(#[from] std::io::Error),

    #[error("no blob at {volume_id}@{position}")]
    BlobNotFound { volume_id: String, position: u64 },

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    // Cluster errors
    #[error("no node hosts volume: {0}")]
    VolumeUnresolved(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    // Network/RPC errors
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("request timeout")]
    Timeout,

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this is a retryable error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ServiceUnavailable(_) | Self::ConnectionFailed(_)
        )
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::BlobNotFound { .. } | Self::NodeNotFound(_) | Self::VolumeUnresolved(_)
        )
    }
}
