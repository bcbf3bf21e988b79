//! Uniform result envelope for exposed operations
//!
//! Every caller-facing operation returns `Outcome<T>`: a tagged
//! success / not-found / error triple that serializes to
//! `{"status": ..., "data": ...}` or `{"status": ..., "error": ...}`.
//! `NotFound` is deliberately its own variant — an absent record is a
//! normal outcome for several operations (a broadcast racing a delete,
//! for one), and callers branch on it rather than unwrapping an error.

use crate::error::Error;
use serde::Serialize;

/// Caller-facing operation result
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    Success { data: T },
    NotFound { error: String },
    Error { error: String },
}

impl<T> Outcome<T> {
    pub fn success(data: T) -> Self {
        Self::Success { data }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            error: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// Fold an internal `Result` into the envelope, routing
    /// `Error::NotFound` to the dedicated variant.
    pub fn from_result(result: crate::Result<T>) -> Self {
        match result {
            Ok(data) => Self::Success { data },
            Err(Error::NotFound(msg)) => Self::NotFound { error: msg },
            Err(e) => Self::Error {
                error: e.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The payload, if the operation succeeded.
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data } => Some(data),
            _ => None,
        }
    }

    /// The error message, for the non-success variants.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::NotFound { error } | Self::Error { error } => Some(error),
            Self::Success { .. } => None,
        }
    }
}
