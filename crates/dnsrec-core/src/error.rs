//! Error types for the record synchronizer
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for synchronizer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the record synchronizer
///
/// Worker failures travel through the per-attempt result channel to the
/// retry decorator, which consults [`Error::is_retryable`] before deciding
/// whether another attempt is allowed.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure talking to the provider (retryable)
    #[error("Network error: {0}")]
    TransientNetwork(String),

    /// Provider answered with a non-success status (retryable)
    #[error("Provider rejected request: {0}")]
    ProviderRejected(String),

    /// Provider returned zero matching records (not retryable)
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Submission rejected because the pipeline is stopped
    #[error("Unable to enqueue request: pipeline is not running")]
    NotRunning,

    /// Request drained at shutdown
    #[error("Request cancelled")]
    Cancelled,

    /// Entity proxy was closed or the entity is no longer registered
    #[error("Entity unavailable: {0}")]
    EntityUnavailable(String),

    /// Owner-thread dispatch failed (owner loop stopped)
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// One or more records could not be refreshed during a poll pass
    #[error("Errors encountered during refresh of {} record(s): {}", .0.len(), .0.join("; "))]
    Refresh(Vec<String>),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a transient network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::TransientNetwork(msg.into())
    }

    /// Create a provider rejection error
    pub fn provider_rejected(msg: impl Into<String>) -> Self {
        Self::ProviderRejected(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an "entity unavailable" error
    pub fn entity_unavailable(msg: impl Into<String>) -> Self {
        Self::EntityUnavailable(msg.into())
    }

    /// Create a dispatch error
    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::Dispatch(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether another attempt may succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork(_) | Self::ProviderRejected(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
