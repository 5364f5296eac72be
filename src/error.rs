//! Error types for the job search pipeline.
//!
//! The taxonomy matters for orchestration: fetch errors are caught per
//! watchlist entry, inference errors per job description. Unparseable
//! scores are not errors at all (the scorer absorbs them as 0).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid or malformed URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Page navigation or render timeout
    #[error("Fetch error: {0}")]
    FetchError(String),

    /// Inference backend returned a non-success status or a malformed reply
    #[error("Inference error: {0}")]
    InferenceError(String),

    /// Generic error with context
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Create a fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::FetchError(msg.into())
    }

    /// Create an inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::InferenceError(msg.into())
    }
}

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;
