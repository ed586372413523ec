//! Utilities
//!
//! Application error types and filesystem locations.

pub mod error;
pub mod paths;

pub use error::{AppError, AppResult};
pub use paths::{app_dir, config_path, ensure_dir, home_dir};
