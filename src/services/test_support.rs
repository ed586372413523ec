//! In-memory doubles for the task API and the push transport.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use concept_visualizer_api::{
    ApiError, ApiResult, ChannelEvent, ChannelStatus, ConceptApi, GenerationRequest,
    RealtimeChannel, RealtimeTransport, RefinementRequest, TaskApi,
};
use concept_visualizer_core::{TaskDocument, TaskStatus};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
enum Step {
    Document(TaskDocument),
    Fail(String),
}

/// Task API that replays a per-task script. Once the script runs dry the
/// last document is repeated.
#[derive(Default)]
pub struct ScriptedTaskApi {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    last: Mutex<HashMap<String, TaskDocument>>,
    fetches: Mutex<HashMap<String, usize>>,
    cancels: Mutex<Vec<String>>,
    started: AtomicUsize,
}

impl ScriptedTaskApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, document: TaskDocument) {
        self.scripts
            .lock()
            .unwrap()
            .entry(document.id.clone())
            .or_default()
            .push_back(Step::Document(document));
    }

    pub fn push_status(&self, task_id: &str, status: TaskStatus) {
        let document = match status {
            TaskStatus::Failed => TaskDocument::failed(task_id, "generation failed"),
            other => TaskDocument::new(task_id, other),
        };
        self.push(document);
    }

    pub fn push_error(&self, task_id: &str, message: &str) {
        self.scripts
            .lock()
            .unwrap()
            .entry(task_id.to_string())
            .or_default()
            .push_back(Step::Fail(message.to_string()));
    }

    pub fn fetches(&self, task_id: &str) -> usize {
        self.fetches.lock().unwrap().get(task_id).copied().unwrap_or(0)
    }

    pub fn cancels(&self) -> Vec<String> {
        self.cancels.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskApi for ScriptedTaskApi {
    async fn fetch_task(&self, task_id: &str) -> ApiResult<TaskDocument> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(task_id.to_string())
            .or_default() += 1;

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(task_id)
            .and_then(|script| script.pop_front());
        match step {
            Some(Step::Document(document)) => {
                self.last
                    .lock()
                    .unwrap()
                    .insert(task_id.to_string(), document.clone());
                Ok(document)
            }
            Some(Step::Fail(message)) => Err(ApiError::Network(message)),
            None => self
                .last
                .lock()
                .unwrap()
                .get(task_id)
                .cloned()
                .ok_or_else(|| ApiError::HttpError {
                    status: 404,
                    body: format!("task {task_id} not found"),
                }),
        }
    }

    async fn cancel_task(&self, task_id: &str) -> ApiResult<TaskDocument> {
        self.cancels.lock().unwrap().push(task_id.to_string());
        Ok(TaskDocument::new(task_id, TaskStatus::Processing).with_field("cancel_requested", true))
    }
}

#[async_trait]
impl ConceptApi for ScriptedTaskApi {
    async fn start_generation(&self, _request: &GenerationRequest) -> ApiResult<TaskDocument> {
        let n = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TaskDocument::new(format!("gen-{n}"), TaskStatus::Pending))
    }

    async fn start_refinement(&self, _request: &RefinementRequest) -> ApiResult<TaskDocument> {
        let n = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TaskDocument::new(format!("ref-{n}"), TaskStatus::Pending))
    }
}

/// Push transport whose channels are driven by the test.
#[derive(Default)]
pub struct FakeTransport {
    opens: AtomicUsize,
    closes: Arc<AtomicUsize>,
    opened_ids: Mutex<Vec<String>>,
    senders: Mutex<HashMap<String, mpsc::Sender<ChannelEvent>>>,
    refuse: AtomicBool,
    auto_subscribe: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Acknowledge every join as soon as the channel opens.
    pub fn auto_subscribing() -> Arc<Self> {
        let transport = Self::default();
        transport.auto_subscribe.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn opened_ids(&self) -> Vec<String> {
        self.opened_ids.lock().unwrap().clone()
    }

    /// Deliver an event on the most recent channel for `task_id`.
    pub async fn emit(&self, task_id: &str, event: ChannelEvent) -> bool {
        let sender = self.senders.lock().unwrap().get(task_id).cloned();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    pub async fn emit_status(&self, task_id: &str, status: ChannelStatus) -> bool {
        self.emit(task_id, ChannelEvent::Status(status)).await
    }

    pub async fn emit_update(&self, document: TaskDocument) -> bool {
        let task_id = document.id.clone();
        self.emit(&task_id, ChannelEvent::Update(document)).await
    }
}

#[async_trait]
impl RealtimeTransport for FakeTransport {
    async fn open(
        &self,
        task_id: &str,
        events: mpsc::Sender<ChannelEvent>,
    ) -> ApiResult<Box<dyn RealtimeChannel>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ApiError::Realtime("connection refused".to_string()));
        }
        if self.auto_subscribe.load(Ordering::SeqCst) {
            let _ = events
                .send(ChannelEvent::Status(ChannelStatus::Subscribed))
                .await;
        }
        self.senders
            .lock()
            .unwrap()
            .insert(task_id.to_string(), events);
        self.opened_ids.lock().unwrap().push(task_id.to_string());
        // Counted last so a test that saw the open can emit on it.
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeChannel {
            closes: self.closes.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct FakeChannel {
    closes: Arc<AtomicUsize>,
    closed: AtomicBool,
}

#[async_trait]
impl RealtimeChannel for FakeChannel {
    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Yield to spawned tasks until `condition` holds, advancing paused time
/// in small steps.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..6000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
