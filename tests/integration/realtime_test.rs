//! Realtime Integration Tests
//!
//! Push updates and polling share one cache:
//! - a pushed terminal document ends both engines, callbacks fire once
//! - repeated channel errors stop at the reconnect ceiling
//! - switching the tracked id tears down the previous channel and poller

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use concept_visualizer::{PollOptions, TaskDocument, TaskEvent, TaskStatus, UpdateSource};
use concept_visualizer_api::{ChannelEvent, ChannelStatus};
use wiremock::MockServer;

use crate::helpers::{
    eventually, fast_reconnect_config, http_tracker, mount_status_sequence, status_requests,
    ScriptedPush, WAIT,
};

#[tokio::test]
async fn test_push_completion_ends_tracking_once() {
    let server = MockServer::start().await;
    mount_status_sequence(&server, "t-1", &["processing"]).await;
    let push = ScriptedPush::new();
    let tracker = http_tracker(&server).with_realtime(push.clone(), fast_reconnect_config());

    let successes = Arc::new(AtomicU32::new(0));
    let s = successes.clone();
    let tracked = tracker.track(
        Some("t-1".to_string()),
        PollOptions::new().on_success(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        }),
    );
    eventually(|| push.opens() == 1).await;
    push.send_status("t-1", ChannelStatus::Subscribed).await;
    eventually(|| tracked.subscription().is_some_and(|v| v.status.is_subscribed())).await;

    push.send(
        "t-1",
        ChannelEvent::Update(TaskDocument::new("t-1", TaskStatus::Completed)),
    )
    .await;
    let outcome = tokio::time::timeout(WAIT, tracked.wait_for_outcome())
        .await
        .unwrap();
    assert!(matches!(outcome, Some(TaskEvent::Completed(_))));

    let subscriber = tracker.subscriber().unwrap();
    eventually(|| subscriber.active_sessions() == 0).await;
    assert_eq!(push.closes(), 1);
    assert_eq!(tracker.cache().get("t-1").unwrap().source, UpdateSource::Push);

    let requests = status_requests(&server, "t-1").await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(status_requests(&server, "t-1").await, requests);
    assert_eq!(successes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_channel_errors_stop_at_ceiling() {
    let server = MockServer::start().await;
    mount_status_sequence(&server, "t-2", &["processing"]).await;
    let push = ScriptedPush::new();
    let tracker = http_tracker(&server).with_realtime(push.clone(), fast_reconnect_config());
    let tracked = tracker.track(Some("t-2".to_string()), PollOptions::new());

    for opened in 1..=5 {
        eventually(|| push.opens() == opened).await;
        push.send_status("t-2", ChannelStatus::Error("CHANNEL_ERROR".to_string()))
            .await;
    }
    eventually(|| push.opens() == 6).await;
    let view = tracked.subscription().unwrap();
    assert!(view.status.max_attempts_reached);
    assert_eq!(view.status.reconnect_attempts, 5);

    push.send_status("t-2", ChannelStatus::Error("CHANNEL_ERROR".to_string()))
        .await;
    let subscriber = tracker.subscriber().unwrap();
    eventually(|| subscriber.active_sessions() == 0).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(push.opens(), 6);

    // Polling is the fallback once push gives up.
    assert!(tracked.state().is_polling);
    assert!(tracked.state().flags.is_processing);
}

#[tokio::test]
async fn test_switching_ids_tears_down_previous_engines() {
    let server = MockServer::start().await;
    mount_status_sequence(&server, "t-1", &["processing"]).await;
    mount_status_sequence(&server, "t-2", &["processing"]).await;
    let push = ScriptedPush::new();
    let tracker = http_tracker(&server).with_realtime(push.clone(), fast_reconnect_config());

    let mut tracked = tracker.track(Some("t-1".to_string()), PollOptions::new());
    eventually(|| push.opens() == 1).await;

    tracked.set_task_id(Some("t-2".to_string()));
    eventually(|| push.opens() == 2 && push.closes() == 1).await;
    eventually(|| tracker.poller().active_sessions() == 1).await;

    let t1_requests = status_requests(&server, "t-1").await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(status_requests(&server, "t-1").await, t1_requests);
    assert!(status_requests(&server, "t-2").await >= 2);
    assert_eq!(tracker.subscriber().unwrap().active_sessions(), 1);
}
