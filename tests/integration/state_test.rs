//! Client State Integration Tests
//!
//! Config file on disk through to a tracker talking to the mock API.

use concept_visualizer::{AppState, PollOptions, SettingsUpdate, TaskEvent};
use wiremock::MockServer;

use crate::helpers::{mount_status_sequence, WAIT};

#[tokio::test]
async fn test_config_file_drives_tracker() {
    let server = MockServer::start().await;
    mount_status_sequence(&server, "t-8", &["processing", "completed"]).await;

    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("config.json");
    let state = AppState::new();
    state.initialize(Some(path.clone())).await.unwrap();

    state
        .update_config(SettingsUpdate {
            api_base_url: Some(format!("{}/api", server.uri())),
            realtime_enabled: Some(false),
            poll_interval_ms: Some(100),
            backstop_interval_ms: Some(5000),
            ..Default::default()
        })
        .await
        .unwrap();

    let tracker = state.tracker().await.unwrap();
    assert!(tracker.subscriber().is_none());
    let tracked = tracker.track(Some("t-8".to_string()), PollOptions::new());
    let outcome = tokio::time::timeout(WAIT, tracked.wait_for_outcome())
        .await
        .unwrap();
    assert!(matches!(outcome, Some(TaskEvent::Completed(_))));

    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.contains(&server.uri()));
}

#[tokio::test]
async fn test_invalid_update_keeps_previous_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let state = AppState::new();
    state
        .initialize(Some(temp_dir.path().join("config.json")))
        .await
        .unwrap();

    let result = state
        .update_config(SettingsUpdate {
            poll_interval_ms: Some(5),
            ..Default::default()
        })
        .await;
    assert!(result.is_err());
    assert_eq!(state.get_config().await.unwrap().poll_interval_ms, 2000);
}
