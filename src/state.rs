//! Application State
//!
//! Holds the configuration service and the task tracker built from it.

use std::path::PathBuf;
use std::sync::Arc;

use concept_visualizer_api::{HttpTaskApi, SupabaseRealtime};
use tokio::sync::RwLock;
use tracing::info;

use crate::models::settings::{AppConfig, SettingsUpdate};
use crate::services::TaskTracker;
use crate::storage::ConfigService;
use crate::utils::error::{AppError, AppResult};

/// Long-lived client state
pub struct AppState {
    /// Configuration service for client settings
    config: Arc<RwLock<Option<ConfigService>>>,
    /// Tracker wired from the current configuration
    tracker: Arc<RwLock<Option<Arc<TaskTracker>>>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Create a new uninitialized app state
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(None)),
            tracker: Arc::new(RwLock::new(None)),
        }
    }

    /// Load configuration (from `config_path`, or the default location)
    /// and build the tracker. Calling it again is a no-op.
    pub async fn initialize(&self, config_path: Option<PathBuf>) -> AppResult<()> {
        let mut config_lock = self.config.write().await;
        if config_lock.is_some() {
            return Ok(());
        }

        let service = match config_path {
            Some(path) => ConfigService::open(path)?,
            None => ConfigService::new()?,
        };
        let tracker = build_tracker(service.get_config())?;
        info!(
            path = %service.path().display(),
            realtime = service.get_config().realtime_enabled,
            "client state initialized"
        );

        *self.tracker.write().await = Some(Arc::new(tracker));
        *config_lock = Some(service);
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.config.read().await.is_some()
    }

    /// Get the current configuration
    pub async fn get_config(&self) -> AppResult<AppConfig> {
        let guard = self.config.read().await;
        match &*guard {
            Some(config) => Ok(config.get_config().clone()),
            None => Err(AppError::config("Config service not initialized")),
        }
    }

    /// Update the configuration and rebuild the tracker from it.
    ///
    /// Watches started from the previous tracker keep running until their
    /// handles are dropped.
    pub async fn update_config(&self, update: SettingsUpdate) -> AppResult<AppConfig> {
        let mut guard = self.config.write().await;
        let config = match &mut *guard {
            Some(config) => config.update_config(update)?,
            None => return Err(AppError::config("Config service not initialized")),
        };
        let tracker = build_tracker(&config)?;
        *self.tracker.write().await = Some(Arc::new(tracker));
        Ok(config)
    }

    pub async fn tracker(&self) -> AppResult<Arc<TaskTracker>> {
        let guard = self.tracker.read().await;
        guard
            .clone()
            .ok_or_else(|| AppError::config("Task tracker not initialized"))
    }
}

/// Wire the HTTP API, and the realtime transport when enabled.
pub fn build_tracker(config: &AppConfig) -> AppResult<TaskTracker> {
    config.validate().map_err(AppError::validation)?;

    let api = Arc::new(HttpTaskApi::new(config.task_api_config())?);
    let mut tracker = TaskTracker::new(api.clone(), config.poll_config()).with_concepts(api);
    if config.realtime_enabled {
        let transport = Arc::new(SupabaseRealtime::new(config.realtime_config()));
        tracker = tracker.with_realtime(transport, config.reconnect_config());
    }
    Ok(tracker)
}
