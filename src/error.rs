//! Error types for the proxy core.
//!
//! Every per-connection failure is represented here so handlers can log a
//! full trace without propagating panics into the supervisor. Only
//! [`ProxyError::Config`] is fatal to the process.

use std::io;
use thiserror::Error;

/// Errors produced anywhere in the proxy core.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Startup configuration is invalid, e.g. the blacklist file is missing.
    ///
    /// # Examples
    ///
    /// ```
    /// use nodpi_proxy::error::ProxyError;
    /// let err = ProxyError::Config("blacklist file not found: blocked.txt".to_string());
    /// assert!(matches!(err, ProxyError::Config(_)));
    /// ```
    #[error("configuration error: {0}")]
    Config(String),

    /// The client sent a request preamble that could not be parsed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The origin host could not be reached.
    #[error("origin unreachable: {0}")]
    OriginUnreachable(String),

    /// A mid-stream read or write failed after the tunnel was established.
    #[error("transfer error: {0}")]
    Transfer(String),

    /// The connection registry was asked to register a key that is already
    /// present. Indicates a bug in the accept loop rather than a transient
    /// condition.
    #[error("registry inconsistency: duplicate key {0}")]
    RegistryInconsistency(String),

    /// Catch-all conversion from [`std::io::Error`] for call sites that
    /// propagate raw I/O failures via `?` before they are classified.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ProxyError>;
