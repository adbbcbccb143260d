//! Error types for the pipeline

use thiserror::Error;

/// Pipeline error types
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] topowatch_core::Error),

    #[error("Subscription error for {resource}: {reason}")]
    Subscription { resource: String, reason: String },

    #[error("Relay queue '{0}' already has a consumer")]
    AlreadyRunning(String),

    #[error("Nothing to deliver: {0}")]
    MissingObject(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;
