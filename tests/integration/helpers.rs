//! Test fixtures: mock task endpoints and a scriptable push transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use concept_visualizer::{PollConfig, ReconnectConfig, TaskTracker};
use concept_visualizer_api::{
    ApiResult, ChannelEvent, ChannelStatus, HttpTaskApi, RealtimeChannel, RealtimeTransport,
    RetryPolicy, TaskApiConfig,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn fast_poll_config() -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(50),
        backstop_interval: Duration::from_secs(5),
        retry: RetryPolicy {
            max_retries: 3,
            delay_ms: 10,
        },
    }
}

pub fn fast_reconnect_config() -> ReconnectConfig {
    ReconnectConfig {
        max_attempts: 5,
        delay: Duration::from_millis(20),
    }
}

pub fn http_api(server: &MockServer) -> Arc<HttpTaskApi> {
    let config = TaskApiConfig::new(format!("{}/api", server.uri()));
    Arc::new(HttpTaskApi::new(config).unwrap())
}

pub fn http_tracker(server: &MockServer) -> TaskTracker {
    let api = http_api(server);
    TaskTracker::new(api.clone(), fast_poll_config()).with_concepts(api)
}

pub fn task_body(id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "status": status,
        "type": "concept_generation",
        "updated_at": "2026-10-14T12:00:00Z"
    })
}

/// Serve `statuses` in order for `GET /api/tasks/{id}`; the last one repeats.
pub async fn mount_status_sequence(server: &MockServer, id: &str, statuses: &[&str]) {
    let route = format!("/api/tasks/{id}");
    let (last, rest) = statuses.split_last().expect("at least one status");
    for status in rest {
        Mock::given(method("GET"))
            .and(path(route.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(task_body(id, status)))
            .up_to_n_times(1)
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_body(id, last)))
        .mount(server)
        .await;
}

pub async fn status_requests(server: &MockServer, id: &str) -> usize {
    let route = format!("/api/tasks/{id}");
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.method.as_str() == "GET" && request.url.path() == route)
        .count()
}

/// Poll `condition` every few milliseconds until it holds or `WAIT` passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within {WAIT:?}");
}

/// Push transport driven by the test body.
#[derive(Default)]
pub struct ScriptedPush {
    opens: AtomicUsize,
    closes: Arc<AtomicUsize>,
    senders: Mutex<HashMap<String, mpsc::Sender<ChannelEvent>>>,
}

impl ScriptedPush {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub async fn send(&self, task_id: &str, event: ChannelEvent) {
        let sender = self.senders.lock().unwrap().get(task_id).cloned();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    pub async fn send_status(&self, task_id: &str, status: ChannelStatus) {
        self.send(task_id, ChannelEvent::Status(status)).await;
    }
}

#[async_trait]
impl RealtimeTransport for ScriptedPush {
    async fn open(
        &self,
        task_id: &str,
        events: mpsc::Sender<ChannelEvent>,
    ) -> ApiResult<Box<dyn RealtimeChannel>> {
        self.senders
            .lock()
            .unwrap()
            .insert(task_id.to_string(), events);
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedChannel {
            closes: self.closes.clone(),
        }))
    }
}

struct ScriptedChannel {
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl RealtimeChannel for ScriptedChannel {
    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
