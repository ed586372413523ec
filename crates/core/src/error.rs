//! Task model errors.
//!
//! Raised while turning backend JSON into a [`TaskDocument`](crate::TaskDocument).
//! The API and application crates wrap these through `#[from]`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Well-formed JSON that is not a usable task document
    #[error("Parse error: {0}")]
    Parse(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
