//! Concept Visualizer API
//!
//! Network transports for task tracking:
//!
//! - `task_api` - REST endpoints for task status, cancellation, and job creation
//! - `retry` - Fixed-delay retry for status fetches
//! - `realtime` - Push-channel abstraction and the Supabase Realtime transport
//! - `http_client` - Shared reqwest client factory
//! - `error` - Transport error types (`ApiError`, `ApiResult`)

pub mod error;
pub mod http_client;
pub mod realtime;
pub mod retry;
pub mod task_api;

pub use error::{ApiError, ApiResult};
pub use realtime::supabase::{SupabaseRealtime, SupabaseRealtimeConfig};
pub use realtime::{ChannelEvent, ChannelStatus, RealtimeChannel, RealtimeTransport};
pub use retry::{fetch_with_retry, RetryPolicy};
pub use task_api::{
    ConceptApi, GenerationRequest, HttpTaskApi, RefinementRequest, TaskApi, TaskApiConfig,
};
