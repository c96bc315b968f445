//! Error types for docrag.
//!
//! This module defines a unified error enum covering every error class the
//! retrieval engine can surface: configuration, embedding provider, lookup,
//! consistency, storage, and the ambient I/O and serialization failures.

use thiserror::Error;

/// Unified error type for docrag.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic: errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid configuration (chunk size, overlap, provider settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A vector does not match the configured dimensionality
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding provider still failing after all retries
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Embedding provider credentials missing or refused
    #[error("Embedding provider unauthenticated: {0}")]
    ProviderUnauthenticated(String),

    /// Embedding provider refused the request for a non-transient reason
    #[error("Embedding provider rejected request: {0}")]
    ProviderRejected(String),

    /// Unknown document id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Index and registry disagree
    #[error("Inconsistent state: {0}")]
    InconsistentState(String),

    /// Caller supplied malformed input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Durable storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Whether the error belongs to the configuration class.
    pub fn is_configuration(&self) -> bool {
        matches!(self, AppError::Config(_) | AppError::DimensionMismatch { .. })
    }

    /// Whether a caller may reasonably retry the whole operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ProviderUnavailable(_) | AppError::Storage(_))
    }

    /// Stable machine-readable error code, used by the RPC adapter.
    pub fn code(&self) -> i64 {
        match self {
            AppError::Config(_) | AppError::DimensionMismatch { .. } => -32001,
            AppError::NotFound(_) => -32004,
            AppError::ProviderUnavailable(_) => -32010,
            AppError::ProviderUnauthenticated(_) => -32011,
            AppError::ProviderRejected(_) => -32012,
            AppError::InconsistentState(_) => -32020,
            AppError::Storage(_) => -32030,
            AppError::InvalidInput(_) => -32602,
            AppError::Io(_) | AppError::Serialization(_) => -32603,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
