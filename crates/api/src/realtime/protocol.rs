//! Realtime Channel Protocol
//!
//! Supabase Realtime speaks the Phoenix channel protocol with the JSON
//! (`vsn=1.0.0`) serializer:
//!
//! ```text
//! {"topic":"realtime:task-t-1","event":"phx_join","payload":{...},"ref":"1"}
//! {"topic":"realtime:task-t-1","event":"phx_reply","payload":{"status":"ok","response":{}},"ref":"1"}
//! {"topic":"realtime:task-t-1","event":"postgres_changes","payload":{"data":{"type":"UPDATE","record":{...}}},"ref":null}
//! ```
//!
//! This module builds outgoing frames and maps incoming ones onto
//! [`ChannelEvent`]s for a single watched task.

use concept_visualizer_core::TaskDocument;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ChannelEvent, ChannelStatus};
use crate::error::ApiResult;

pub const PHX_JOIN: &str = "phx_join";
pub const PHX_LEAVE: &str = "phx_leave";
pub const PHX_REPLY: &str = "phx_reply";
pub const PHX_ERROR: &str = "phx_error";
pub const PHX_CLOSE: &str = "phx_close";
pub const HEARTBEAT: &str = "heartbeat";
pub const SYSTEM: &str = "system";
pub const POSTGRES_CHANGES: &str = "postgres_changes";

/// Topic used for socket-level messages such as heartbeats.
pub const PHOENIX_TOPIC: &str = "phoenix";

/// One frame on the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// What the channel filters on when joining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub schema: String,
    pub table: String,
}

impl Default for ChangeFilter {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            table: "tasks".to_string(),
        }
    }
}

/// Channel topic scoped to one task id.
pub fn channel_topic(task_id: &str) -> String {
    format!("realtime:task-{}", task_id)
}

/// Join request subscribing to UPDATEs of exactly one task row.
pub fn join_message(
    topic: &str,
    task_id: &str,
    filter: &ChangeFilter,
    access_token: Option<&str>,
    join_ref: &str,
) -> PhoenixMessage {
    let mut payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": [{
                "event": "UPDATE",
                "schema": filter.schema,
                "table": filter.table,
                "filter": format!("id=eq.{}", task_id),
            }]
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = Value::String(token.to_string());
    }

    PhoenixMessage {
        topic: topic.to_string(),
        event: PHX_JOIN.to_string(),
        payload,
        msg_ref: Some(join_ref.to_string()),
        join_ref: Some(join_ref.to_string()),
    }
}

pub fn leave_message(topic: &str, msg_ref: &str) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic.to_string(),
        event: PHX_LEAVE.to_string(),
        payload: json!({}),
        msg_ref: Some(msg_ref.to_string()),
        join_ref: None,
    }
}

pub fn heartbeat_message(msg_ref: &str) -> PhoenixMessage {
    PhoenixMessage {
        topic: PHOENIX_TOPIC.to_string(),
        event: HEARTBEAT.to_string(),
        payload: json!({}),
        msg_ref: Some(msg_ref.to_string()),
        join_ref: None,
    }
}

/// Map an incoming frame to a channel event for `task_id`.
///
/// Frames for other topics, replies to heartbeats, presence traffic and
/// updates for other rows yield `Ok(None)`.
pub fn classify(
    message: &PhoenixMessage,
    topic: &str,
    join_ref: &str,
    task_id: &str,
) -> ApiResult<Option<ChannelEvent>> {
    if message.topic != topic {
        return Ok(None);
    }

    let event = match message.event.as_str() {
        PHX_REPLY => {
            if message.msg_ref.as_deref() != Some(join_ref) {
                return Ok(None);
            }
            if payload_status(&message.payload) == Some("ok") {
                ChannelEvent::Status(ChannelStatus::Subscribed)
            } else {
                ChannelEvent::Status(ChannelStatus::Error(reply_reason(&message.payload)))
            }
        }
        PHX_ERROR => ChannelEvent::Status(ChannelStatus::Error(
            message
                .payload
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("channel error")
                .to_string(),
        )),
        PHX_CLOSE => ChannelEvent::Status(ChannelStatus::Closed),
        SYSTEM => ChannelEvent::Status(ChannelStatus::System {
            ok: payload_status(&message.payload) == Some("ok"),
            message: message
                .payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }),
        POSTGRES_CHANGES => {
            let Some(record) = changed_record(&message.payload) else {
                return Ok(None);
            };
            let document = TaskDocument::from_value(record.clone(), Some(task_id))?;
            if document.id != task_id {
                return Ok(None);
            }
            ChannelEvent::Update(document)
        }
        _ => return Ok(None),
    };

    Ok(Some(event))
}

fn payload_status(payload: &Value) -> Option<&str> {
    payload.get("status").and_then(Value::as_str)
}

fn reply_reason(payload: &Value) -> String {
    payload
        .pointer("/response/reason")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!(
                "join rejected with status {}",
                payload_status(payload).unwrap_or("unknown")
            )
        })
}

/// The new row of a change event. Realtime v2 calls it `record`, older
/// servers `new`.
fn changed_record(payload: &Value) -> Option<&Value> {
    let data = payload.get("data").unwrap_or(payload);
    data.get("record")
        .or_else(|| data.get("new"))
        .filter(|record| record.is_object())
}
