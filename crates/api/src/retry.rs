//! Fixed-Delay Retry
//!
//! Status fetches are retried a bounded number of times with a constant
//! pause between attempts before the error is handed to the caller.

use std::future::Future;
use std::time::Duration;

use concept_visualizer_core::TaskDocument;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::task_api::TaskApi;

/// Retry behavior for status fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (default: 3)
    pub max_retries: u32,
    /// Pause between attempts in milliseconds (default: 1000)
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay_ms: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> ApiResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && err.is_transient() => {
                    debug!(attempt, error = %err, "retrying after transient error");
                    attempt += 1;
                    tokio::time::sleep(self.delay()).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Fetch a task's status, retrying transient failures per `policy`.
pub async fn fetch_with_retry(
    api: &dyn TaskApi,
    task_id: &str,
    policy: &RetryPolicy,
) -> Result<TaskDocument, ApiError> {
    policy.run(move |_| api.fetch_task(task_id)).await
}
