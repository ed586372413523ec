//! Realtime Push Channel
//!
//! Transport abstraction for the push channel that delivers task row
//! updates. The subscription engine in the application crate only sees
//! [`RealtimeTransport`] / [`RealtimeChannel`]; the Supabase implementation
//! lives in [`supabase`].

pub mod protocol;
pub mod supabase;

use async_trait::async_trait;
use concept_visualizer_core::TaskDocument;
use tokio::sync::mpsc;

use crate::error::ApiResult;

/// Channel lifecycle notifications, as reported by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelStatus {
    /// The server acknowledged the join.
    Subscribed,
    /// The channel or socket was closed.
    Closed,
    /// The server or socket reported an error.
    Error(String),
    /// No join acknowledgement arrived in time.
    TimedOut,
    /// Informational server message. `ok` messages are benign.
    System { ok: bool, message: String },
}

/// One notification from an open channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Status(ChannelStatus),
    /// Full replacement document for the watched task.
    Update(TaskDocument),
}

/// Opens push channels scoped to a single task id.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Open a channel for `task_id`, delivering its events into `events`.
    ///
    /// An `Err` means the channel could not be opened at all; failures after
    /// that point arrive as [`ChannelStatus`] events.
    async fn open(
        &self,
        task_id: &str,
        events: mpsc::Sender<ChannelEvent>,
    ) -> ApiResult<Box<dyn RealtimeChannel>>;
}

/// Handle to an open channel.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Leave the channel and release the socket. Safe to call repeatedly.
    async fn close(&self);
}
