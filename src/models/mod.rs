//! Data Models
//!
//! Persisted client settings. Task documents live in the core crate.

pub mod settings;

pub use settings::{AppConfig, SettingsUpdate};
