//! MemShare error types

use thiserror::Error;

/// MemShare error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Target record absent — a distinct status, not a fatal fault
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed policy or strategy value
    #[error("Validation error: {0}")]
    Validation(String),

    /// Durable record store unavailable or failing; surfaced to the
    /// caller, never silently retried inside the core
    #[error("Store error: {0}")]
    Store(String),

    /// Optimistic-concurrency failure: the record version moved under us
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Publish/subscribe channel error
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for MemShare operations
pub type Result<T> = std::result::Result<T, Error>;
