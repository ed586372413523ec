//! HTTP Client Factory
//!
//! Builds the shared `reqwest::Client` used for all REST calls.

use std::time::Duration;

use crate::error::{ApiError, ApiResult};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Build a `reqwest::Client` with the given request timeout.
///
/// Environment proxy variables are ignored so behaviour does not depend on
/// the shell the client was started from.
pub fn build_http_client(timeout: Duration) -> ApiResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .no_proxy()
        .build()
        .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {}", e)))
}
