//! Error types for the freightflow-core crate.

use thiserror::Error;

/// Top-level error type for simulation, feature and modeling operations.
#[derive(Debug, Error)]
pub enum FreightError {
    /// Invalid simulation or pipeline parameters. Never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or malformed attributes flowing between stages.
    #[error("Data error: {0}")]
    Data(String),

    #[error("Dataflow error: {0}")]
    Dataflow(String),

    #[error("Feature store error: {0}")]
    FeatureStore(String),

    /// Degenerate or insufficient training data.
    #[error("Training error: {0}")]
    Training(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl FreightError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn dataflow(msg: impl Into<String>) -> Self {
        Self::Dataflow(msg.into())
    }

    pub fn feature_store(msg: impl Into<String>) -> Self {
        Self::FeatureStore(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = FreightError> = std::result::Result<T, E>;
