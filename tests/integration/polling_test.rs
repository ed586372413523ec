//! Polling Integration Tests
//!
//! Drives the polling engine against mock task endpoints:
//! - pending -> processing -> completed fires the success callback once
//! - transient 5xx responses are retried
//! - cancellation is an acknowledgement only, tracking carries on

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use concept_visualizer::{PollOptions, TaskEvent, TaskStatus};
use concept_visualizer_api::GenerationRequest;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{http_tracker, mount_status_sequence, status_requests, task_body, WAIT};

#[tokio::test]
async fn test_status_sequence_completes_once() {
    let server = MockServer::start().await;
    mount_status_sequence(&server, "t-1", &["pending", "processing", "completed"]).await;
    let tracker = http_tracker(&server);

    let successes = Arc::new(AtomicU32::new(0));
    let failures = Arc::new(AtomicU32::new(0));
    let (s, f) = (successes.clone(), failures.clone());
    let tracked = tracker.track(
        Some("t-1".to_string()),
        PollOptions::new()
            .on_success(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            })
            .on_failure(move |_, _| {
                f.fetch_add(1, Ordering::SeqCst);
            }),
    );

    let outcome = tokio::time::timeout(WAIT, tracked.wait_for_outcome())
        .await
        .unwrap();
    match outcome {
        Some(TaskEvent::Completed(document)) => {
            assert_eq!(document.id, "t-1");
            assert_eq!(document.field("type"), Some(&json!("concept_generation")));
        }
        other => panic!("expected completion, got {other:?}"),
    }

    let requests = status_requests(&server, "t-1").await;
    assert_eq!(requests, 3);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(status_requests(&server, "t-1").await, requests);
    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(failures.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_status_reports_error_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks/t-4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "t-4",
            "status": "failed",
            "error_message": "image model unavailable"
        })))
        .mount(&server)
        .await;
    let tracker = http_tracker(&server);

    let tracked = tracker.track(Some("t-4".to_string()), PollOptions::new());
    let outcome = tokio::time::timeout(WAIT, tracked.wait_for_outcome())
        .await
        .unwrap();
    match outcome {
        Some(TaskEvent::Failed { error, .. }) => {
            assert_eq!(error.message, "image model unavailable");
            assert_eq!(error.to_string(), "Task t-4 failed: image model unavailable");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(tracked.state().flags.is_failed);
}

#[tokio::test]
async fn test_transient_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tasks/t-5"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_status_sequence(&server, "t-5", &["completed"]).await;
    let tracker = http_tracker(&server);

    let tracked = tracker.track(Some("t-5".to_string()), PollOptions::new());
    let outcome = tokio::time::timeout(WAIT, tracked.wait_for_outcome())
        .await
        .unwrap();

    assert!(matches!(outcome, Some(TaskEvent::Completed(_))));
    assert_eq!(status_requests(&server, "t-5").await, 3);
    assert!(tracked.state().error.is_none());
}

#[tokio::test]
async fn test_cancel_leaves_polling_untouched() {
    let server = MockServer::start().await;
    mount_status_sequence(&server, "t-3", &["processing"]).await;
    Mock::given(method("POST"))
        .and(path("/api/tasks/t-3/cancel"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "t-3",
            "status": "processing",
            "message": "cancellation requested"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let tracker = http_tracker(&server);
    let tracked = tracker.track(Some("t-3".to_string()), PollOptions::new());

    tokio::time::sleep(Duration::from_millis(120)).await;
    let ack = tracker.cancel("t-3").await.unwrap();
    assert_eq!(ack.status, TaskStatus::Processing);

    let before = status_requests(&server, "t-3").await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(status_requests(&server, "t-3").await > before);
    assert!(tracked.state().is_polling);
    assert!(tracker
        .cache()
        .document("t-3")
        .and_then(|d| d.field("message").cloned())
        .is_none());
}

#[tokio::test]
async fn test_generation_becomes_active_task() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/concepts/generate-with-palettes"))
        .and(body_json(json!({
            "logo_description": "a lighthouse",
            "theme_description": "nautical",
            "num_palettes": 3
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_body("gen-7", "pending")))
        .mount(&server)
        .await;
    mount_status_sequence(&server, "gen-7", &["processing", "completed"]).await;
    let tracker = http_tracker(&server);

    let document = tracker
        .start_generation(&GenerationRequest {
            logo_description: "a lighthouse".to_string(),
            theme_description: "nautical".to_string(),
            num_palettes: Some(3),
        })
        .await
        .unwrap();
    assert_eq!(document.id, "gen-7");
    assert!(tracker.active_tasks().is_task_pending());

    let tracked = tracker.track_active(PollOptions::new());
    tokio::time::timeout(WAIT, tracked.wait_for_outcome())
        .await
        .unwrap();
    assert!(tracker.active_tasks().is_task_completed());
    assert_eq!(tracker.active_tasks().active_task_id().as_deref(), Some("gen-7"));
}
