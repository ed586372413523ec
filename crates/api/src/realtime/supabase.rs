//! Supabase Realtime Transport
//!
//! One WebSocket per channel: connect, join the task's topic, keep the
//! socket alive with heartbeats, and forward classified frames until the
//! channel ends or is closed locally.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use concept_visualizer_core::CoreError;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::protocol::{
    channel_topic, classify, heartbeat_message, join_message, leave_message, ChangeFilter,
    PhoenixMessage,
};
use super::{ChannelEvent, ChannelStatus, RealtimeChannel, RealtimeTransport};
use crate::error::{ApiError, ApiResult};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Phoenix serializer version requested on connect.
const PROTOCOL_VSN: &str = "1.0.0";

/// Configuration for [`SupabaseRealtime`].
#[derive(Debug, Clone)]
pub struct SupabaseRealtimeConfig {
    /// Realtime endpoint, e.g. `wss://<project>.supabase.co/realtime/v1`.
    pub url: String,
    /// Project anon key, sent as the `apikey` query parameter.
    pub api_key: String,
    /// User session token for row-level security, when signed in.
    pub access_token: Option<String>,
    /// Table and schema to watch.
    pub filter: ChangeFilter,
    /// Socket heartbeat period (default: 30s)
    pub heartbeat_interval: Duration,
    /// Time allowed for the join acknowledgement (default: 10s)
    pub join_timeout: Duration,
}

impl SupabaseRealtimeConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            access_token: None,
            filter: ChangeFilter::default(),
            heartbeat_interval: Duration::from_secs(30),
            join_timeout: Duration::from_secs(10),
        }
    }
}

/// [`RealtimeTransport`] backed by Supabase Realtime over tokio-tungstenite.
pub struct SupabaseRealtime {
    config: SupabaseRealtimeConfig,
    next_ref: Arc<AtomicU64>,
}

impl SupabaseRealtime {
    pub fn new(config: SupabaseRealtimeConfig) -> Self {
        Self {
            config,
            next_ref: Arc::new(AtomicU64::new(1)),
        }
    }

    /// WebSocket URL including `apikey` and `vsn` query parameters.
    pub fn socket_url(&self) -> ApiResult<Url> {
        let mut url = Url::parse(self.config.url.trim())?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ApiError::InvalidUrl(format!(
                    "unsupported realtime scheme: {}",
                    other
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ApiError::InvalidUrl(self.config.url.clone()))?;

        let has_websocket_segment = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .is_some_and(|last| last == "websocket");
        if !has_websocket_segment {
            url.path_segments_mut()
                .map_err(|_| ApiError::InvalidUrl(self.config.url.clone()))?
                .pop_if_empty()
                .push("websocket");
        }

        url.query_pairs_mut()
            .append_pair("apikey", &self.config.api_key)
            .append_pair("vsn", PROTOCOL_VSN);
        Ok(url)
    }

    fn allocate_ref(counter: &AtomicU64) -> String {
        counter.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

#[async_trait]
impl RealtimeTransport for SupabaseRealtime {
    async fn open(
        &self,
        task_id: &str,
        events: mpsc::Sender<ChannelEvent>,
    ) -> ApiResult<Box<dyn RealtimeChannel>> {
        let url = self.socket_url()?;
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut sink, source) = socket.split();

        let topic = channel_topic(task_id);
        let join_ref = Self::allocate_ref(&self.next_ref);
        let join = join_message(
            &topic,
            task_id,
            &self.config.filter,
            self.config.access_token.as_deref(),
            &join_ref,
        );
        send_frame(&mut sink, &join).await?;
        debug!(task_id, topic = %topic, "realtime join sent");

        let cancel = CancellationToken::new();
        let session = SocketSession {
            task_id: task_id.to_string(),
            topic,
            join_ref,
            events,
            cancel: cancel.clone(),
            next_ref: self.next_ref.clone(),
            heartbeat_interval: self.config.heartbeat_interval,
            join_timeout: self.config.join_timeout,
        };
        tokio::spawn(session.run(sink, source));

        Ok(Box::new(SupabaseChannel { cancel }))
    }
}

/// Local handle for one joined channel.
struct SupabaseChannel {
    cancel: CancellationToken,
}

#[async_trait]
impl RealtimeChannel for SupabaseChannel {
    async fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for SupabaseChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct SocketSession {
    task_id: String,
    topic: String,
    join_ref: String,
    events: mpsc::Sender<ChannelEvent>,
    cancel: CancellationToken,
    next_ref: Arc<AtomicU64>,
    heartbeat_interval: Duration,
    join_timeout: Duration,
}

impl SocketSession {
    async fn run(self, mut sink: SplitSink<Socket, Message>, mut source: SplitStream<Socket>) {
        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        let join_deadline = tokio::time::sleep(self.join_timeout);
        tokio::pin!(join_deadline);
        let mut joined = false;

        // Status that ended the session, reported after the socket is closed.
        let ending: Option<ChannelStatus> = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let leave = leave_message(&self.topic, &SupabaseRealtime::allocate_ref(&self.next_ref));
                    if let Err(e) = send_frame(&mut sink, &leave).await {
                        debug!(task_id = %self.task_id, error = %e, "failed to send leave");
                    }
                    break None;
                }
                _ = &mut join_deadline, if !joined => {
                    break Some(ChannelStatus::TimedOut);
                }
                _ = heartbeat.tick() => {
                    let beat = heartbeat_message(&SupabaseRealtime::allocate_ref(&self.next_ref));
                    if let Err(e) = send_frame(&mut sink, &beat).await {
                        break Some(ChannelStatus::Error(e.to_string()));
                    }
                }
                frame = source.next() => match frame {
                    None => break Some(ChannelStatus::Closed),
                    Some(Err(e)) => break Some(ChannelStatus::Error(e.to_string())),
                    Some(Ok(Message::Close(_))) => break Some(ChannelStatus::Closed),
                    Some(Ok(Message::Text(text))) => {
                        match self.handle_text(&text) {
                            Some(ChannelEvent::Status(status)) if ends_channel(&status) => {
                                break Some(status);
                            }
                            Some(event) => {
                                if matches!(event, ChannelEvent::Status(ChannelStatus::Subscribed)) {
                                    joined = true;
                                }
                                if self.events.send(event).await.is_err() {
                                    break None;
                                }
                            }
                            None => {}
                        }
                    }
                    Some(Ok(_)) => {}
                },
            }
        };

        if let Err(e) = sink.close().await {
            debug!(task_id = %self.task_id, error = %e, "socket close failed");
        }
        if let Some(status) = ending {
            if !self.cancel.is_cancelled() {
                let _ = self.events.send(ChannelEvent::Status(status)).await;
            }
        }
    }

    fn handle_text(&self, text: &str) -> Option<ChannelEvent> {
        let message: PhoenixMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(task_id = %self.task_id, error = %e, "unparseable realtime frame");
                return None;
            }
        };
        match classify(&message, &self.topic, &self.join_ref, &self.task_id) {
            Ok(event) => event,
            Err(e) => {
                warn!(task_id = %self.task_id, error = %e, "dropping malformed task update");
                None
            }
        }
    }
}

fn ends_channel(status: &ChannelStatus) -> bool {
    matches!(
        status,
        ChannelStatus::Closed | ChannelStatus::Error(_) | ChannelStatus::TimedOut
    )
}

async fn send_frame(
    sink: &mut SplitSink<Socket, Message>,
    message: &PhoenixMessage,
) -> ApiResult<()> {
    let text = serde_json::to_string(message).map_err(CoreError::from)?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}
