//! Application error types for registry-admission
//!
//! This module defines common error types used throughout the application.
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Errors talking to the content trust (Notary) service
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrustError {
    /// Request to the trust service timed out
    #[error("Trust service timeout")]
    Timeout,

    /// Could not connect to the trust service
    #[error("Trust service connection failed: {0}")]
    Connection(String),

    /// Trust service or its token service rejected the principal
    #[error("Trust service unauthorized")]
    Unauthorized,

    /// Unexpected HTTP status from the trust service
    #[error("Trust service error: HTTP {0}")]
    Status(u16),

    /// Signed target metadata could not be decoded
    #[error("Invalid trust data: {0}")]
    InvalidData(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DbError {
    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Async connection error
    #[error("Database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),
}

/// Request parsing errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Repository path has no project component
    #[error("Bad repository name: {0}")]
    BadRepositoryName(String),
}

/// Errors while forwarding a request to the registry backend
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Backend request failed
    #[error("Upstream error: {0}")]
    Upstream(#[from] reqwest::Error),

    /// Backend did not answer in time
    #[error("Upstream timeout after {0} seconds")]
    Timeout(u64),

    /// Buffered manifest exceeded the configured cap
    #[error("Manifest exceeds {limit} bytes")]
    TooLarge {
        /// Configured maximum
        limit: usize,
    },
}

/// Errors raised while a policy stage consults a collaborator
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PolicyError {
    /// Collaborator did not answer within the configured bound
    #[error("{collaborator} did not answer within {secs} seconds")]
    Timeout {
        /// Which collaborator timed out
        collaborator: &'static str,
        /// Configured bound
        secs: u64,
    },

    /// Trust service failure
    #[error("Trust service failure: {0}")]
    Trust(#[from] TrustError),
}

/// OpenTelemetry-related errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OtelError {
    /// Failed to initialize tracer
    #[error("Failed to initialize tracer: {0}")]
    TracerInit(String),

    /// Failed to initialize meter
    #[error("Failed to initialize meter: {0}")]
    MeterInit(String),

    /// Failed to shutdown
    #[error("Failed to shutdown: {0}")]
    Shutdown(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
