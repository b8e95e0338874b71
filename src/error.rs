//! Error types for Tootherd
//!
//! `AppError` covers initialization and application-level failures.
//! Per-operation remote API errors use `client::ClientError` so the
//! reconciliation engine can tell retryable from terminal conditions.

use thiserror::Error;

use crate::client::ClientError;
use crate::data::StoreError;

/// Application-wide error type
///
/// Errors inside a reconciliation or ingestion pass never surface here;
/// those are recorded per handle/item in the pass report. `AppError` is
/// for the failures that are allowed to stop startup.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Remote API error
    #[error("Remote API error: {0}")]
    Client(#[from] ClientError),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
