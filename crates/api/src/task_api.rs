//! Task REST API
//!
//! Traits for the backend's task endpoints plus the reqwest-backed
//! implementation:
//!
//! - `GET  {base}/tasks/{id}`         → task status document
//! - `POST {base}/tasks/{id}/cancel`  → cancellation acknowledgement
//! - `POST {base}/concepts/generate-with-palettes` → generation task
//! - `POST {base}/concepts/refine`    → refinement task
//!
//! Every payload passes through [`TaskDocument::from_value`] so consumers
//! only ever see the normalized shape.

use std::time::Duration;

use async_trait::async_trait;
use concept_visualizer_core::TaskDocument;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{ApiError, ApiResult};
use crate::http_client::{build_http_client, DEFAULT_TIMEOUT_SECS};

/// Status and cancellation endpoints for a single task.
#[async_trait]
pub trait TaskApi: Send + Sync {
    /// Fetch the latest status document for `task_id`.
    async fn fetch_task(&self, task_id: &str) -> ApiResult<TaskDocument>;

    /// Ask the backend to abort `task_id`.
    ///
    /// The acknowledgement is informational; tracking only ends when a
    /// terminal status is observed.
    async fn cancel_task(&self, task_id: &str) -> ApiResult<TaskDocument>;
}

/// Job-creation endpoints. Each returns the document of the started task.
#[async_trait]
pub trait ConceptApi: Send + Sync {
    async fn start_generation(&self, request: &GenerationRequest) -> ApiResult<TaskDocument>;

    async fn start_refinement(&self, request: &RefinementRequest) -> ApiResult<TaskDocument>;
}

/// Request body for a new concept generation job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    pub logo_description: String,
    pub theme_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_palettes: Option<u32>,
}

/// Request body for refining an existing concept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefinementRequest {
    pub original_image_url: String,
    pub refinement_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preserve_aspects: Vec<String>,
}

/// Configuration for [`HttpTaskApi`].
#[derive(Debug, Clone)]
pub struct TaskApiConfig {
    /// API root, e.g. `https://api.example.com/api`.
    pub base_url: String,
    /// Request timeout duration.
    pub timeout: Duration,
    /// Optional bearer token (Supabase session JWT).
    pub auth_token: Option<String>,
}

impl TaskApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            auth_token: None,
        }
    }
}

/// reqwest-backed implementation of [`TaskApi`] and [`ConceptApi`].
pub struct HttpTaskApi {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpTaskApi {
    pub fn new(config: TaskApiConfig) -> ApiResult<Self> {
        let client = build_http_client(config.timeout)?;
        Self::with_reqwest_client(client, config)
    }

    /// Wrap an existing client, e.g. one shared with other services.
    pub fn with_reqwest_client(client: reqwest::Client, config: TaskApiConfig) -> ApiResult<Self> {
        let base_url = Url::parse(config.base_url.trim())?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(format!(
                "{} cannot be used as an API root",
                config.base_url
            )));
        }
        Ok(Self {
            client,
            base_url,
            auth_token: config.auth_token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append percent-encoded path segments to the API root.
    fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_token {
            Some(ref token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn read_task(
        response: reqwest::Response,
        fallback_id: Option<&str>,
    ) -> ApiResult<TaskDocument> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = response.json().await.map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse task response: {}", e))
        })?;
        Ok(TaskDocument::from_value(value, fallback_id)?)
    }
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn fetch_task(&self, task_id: &str) -> ApiResult<TaskDocument> {
        let url = self.endpoint(&["tasks", task_id])?;
        let response = self.authorize(self.client.get(url)).send().await?;
        Self::read_task(response, Some(task_id)).await
    }

    async fn cancel_task(&self, task_id: &str) -> ApiResult<TaskDocument> {
        let url = self.endpoint(&["tasks", task_id, "cancel"])?;
        let response = self.authorize(self.client.post(url)).send().await?;
        Self::read_task(response, Some(task_id)).await
    }
}

#[async_trait]
impl ConceptApi for HttpTaskApi {
    async fn start_generation(&self, request: &GenerationRequest) -> ApiResult<TaskDocument> {
        let url = self.endpoint(&["concepts", "generate-with-palettes"])?;
        let response = self
            .authorize(self.client.post(url).json(request))
            .send()
            .await?;
        Self::read_task(response, None).await
    }

    async fn start_refinement(&self, request: &RefinementRequest) -> ApiResult<TaskDocument> {
        let url = self.endpoint(&["concepts", "refine"])?;
        let response = self
            .authorize(self.client.post(url).json(request))
            .send()
            .await?;
        Self::read_task(response, None).await
    }
}
