//! Storage Layer
//!
//! Persistence for the JSON client configuration.

pub mod config;

pub use config::ConfigService;
