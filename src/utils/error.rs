//! Errors surfaced by the tracker, the config layer, and the CLI.

use concept_visualizer_api::ApiError;
use concept_visualizer_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or unusable settings, or a component used before it was wired
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading or writing config.json
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// REST or realtime transport errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// Caller input rejected before any request is made
    #[error("Validation error: {0}")]
    Validation(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
