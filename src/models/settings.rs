//! Settings Models
//!
//! Client configuration stored in config.json.

use std::time::Duration;

use concept_visualizer_api::realtime::protocol::ChangeFilter;
use concept_visualizer_api::{RetryPolicy, SupabaseRealtimeConfig, TaskApiConfig};
use serde::{Deserialize, Serialize};

use crate::services::polling::PollConfig;
use crate::services::reconnect::ReconnectConfig;

/// Application configuration stored in config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// REST API root (e.g., "http://localhost:8000/api")
    pub api_base_url: String,
    /// Supabase Realtime endpoint (e.g., "wss://<project>.supabase.co/realtime/v1")
    pub realtime_url: String,
    /// Supabase anon key for the realtime socket
    #[serde(default)]
    pub supabase_anon_key: String,
    /// Optional user session token sent to both REST and realtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Table holding task rows
    #[serde(default = "default_tasks_table")]
    pub tasks_table: String,
    /// Whether to subscribe to push updates alongside polling
    #[serde(default = "default_true")]
    pub realtime_enabled: bool,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Back-stop refresh interval in milliseconds
    pub backstop_interval_ms: u64,
    /// Retries for a failing status fetch
    pub fetch_retries: u32,
    /// Delay between fetch retries in milliseconds
    pub fetch_retry_delay_ms: u64,
    /// Maximum realtime reconnect attempts
    pub max_reconnect_attempts: u32,
    /// Delay before a realtime reconnect in milliseconds
    pub reconnect_delay_ms: u64,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
}

fn default_tasks_table() -> String {
    "tasks".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            realtime_url: "ws://localhost:54321/realtime/v1".to_string(),
            supabase_anon_key: String::new(),
            access_token: None,
            tasks_table: default_tasks_table(),
            realtime_enabled: true,
            poll_interval_ms: 2000,
            backstop_interval_ms: 10_000,
            fetch_retries: 3,
            fetch_retry_delay_ms: 1000,
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 5000,
            request_timeout_secs: 30,
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    pub api_base_url: Option<String>,
    pub realtime_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub access_token: Option<String>,
    pub tasks_table: Option<String>,
    pub realtime_enabled: Option<bool>,
    pub poll_interval_ms: Option<u64>,
    pub backstop_interval_ms: Option<u64>,
    pub fetch_retries: Option<u32>,
    pub fetch_retry_delay_ms: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
    pub reconnect_delay_ms: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

impl AppConfig {
    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(url) = update.api_base_url {
            self.api_base_url = url;
        }
        if let Some(url) = update.realtime_url {
            self.realtime_url = url;
        }
        if let Some(key) = update.supabase_anon_key {
            self.supabase_anon_key = key;
        }
        if let Some(token) = update.access_token {
            self.access_token = if token.is_empty() { None } else { Some(token) };
        }
        if let Some(table) = update.tasks_table {
            self.tasks_table = table;
        }
        if let Some(enabled) = update.realtime_enabled {
            self.realtime_enabled = enabled;
        }
        if let Some(ms) = update.poll_interval_ms {
            self.poll_interval_ms = ms;
        }
        if let Some(ms) = update.backstop_interval_ms {
            self.backstop_interval_ms = ms;
        }
        if let Some(retries) = update.fetch_retries {
            self.fetch_retries = retries;
        }
        if let Some(ms) = update.fetch_retry_delay_ms {
            self.fetch_retry_delay_ms = ms;
        }
        if let Some(max) = update.max_reconnect_attempts {
            self.max_reconnect_attempts = max;
        }
        if let Some(ms) = update.reconnect_delay_ms {
            self.reconnect_delay_ms = ms;
        }
        if let Some(secs) = update.request_timeout_secs {
            self.request_timeout_secs = secs;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.api_base_url.trim().is_empty() {
            return Err("api_base_url must not be empty".to_string());
        }
        if self.realtime_enabled && self.realtime_url.trim().is_empty() {
            return Err("realtime_url must not be empty when realtime is enabled".to_string());
        }
        if self.tasks_table.trim().is_empty() {
            return Err("tasks_table must not be empty".to_string());
        }
        if self.poll_interval_ms < 100 {
            return Err(format!(
                "poll_interval_ms must be at least 100, got {}",
                self.poll_interval_ms
            ));
        }
        if self.backstop_interval_ms <= self.poll_interval_ms {
            return Err(format!(
                "backstop_interval_ms ({}) must be longer than poll_interval_ms ({})",
                self.backstop_interval_ms, self.poll_interval_ms
            ));
        }
        if self.fetch_retries > 10 {
            return Err(format!("fetch_retries must be at most 10, got {}", self.fetch_retries));
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be positive".to_string());
        }
        Ok(())
    }

    pub fn task_api_config(&self) -> TaskApiConfig {
        TaskApiConfig {
            base_url: self.api_base_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            auth_token: self.access_token.clone(),
        }
    }

    pub fn realtime_config(&self) -> SupabaseRealtimeConfig {
        let mut config =
            SupabaseRealtimeConfig::new(self.realtime_url.clone(), self.supabase_anon_key.clone());
        config.access_token = self.access_token.clone();
        config.filter = ChangeFilter {
            table: self.tasks_table.clone(),
            ..ChangeFilter::default()
        };
        config
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            backstop_interval: Duration::from_millis(self.backstop_interval_ms),
            retry: RetryPolicy {
                max_retries: self.fetch_retries,
                delay_ms: self.fetch_retry_delay_ms,
            },
        }
    }

    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: self.max_reconnect_attempts,
            delay: Duration::from_millis(self.reconnect_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval_ms, 2000);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.reconnect_delay_ms, 5000);
        assert_eq!(config.fetch_retries, 3);
    }

    #[test]
    fn test_backstop_must_exceed_poll_interval() {
        let config = AppConfig {
            backstop_interval_ms: 2000,
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("backstop_interval_ms"));
    }

    #[test]
    fn test_realtime_url_only_required_when_enabled() {
        let mut config = AppConfig {
            realtime_url: String::new(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
        config.realtime_enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_update() {
        let mut config = AppConfig::default();
        config.apply_update(SettingsUpdate {
            poll_interval_ms: Some(1500),
            access_token: Some("jwt".to_string()),
            ..Default::default()
        });
        assert_eq!(config.poll_interval_ms, 1500);
        assert_eq!(config.access_token.as_deref(), Some("jwt"));

        config.apply_update(SettingsUpdate {
            access_token: Some(String::new()),
            ..Default::default()
        });
        assert!(config.access_token.is_none());
    }

    #[test]
    fn test_derived_engine_configs() {
        let config = AppConfig::default();
        let poll = config.poll_config();
        assert_eq!(poll.interval, Duration::from_secs(2));
        assert_eq!(poll.retry.max_retries, 3);

        let reconnect = config.reconnect_config();
        assert_eq!(reconnect.max_attempts, 5);
        assert_eq!(reconnect.delay, Duration::from_secs(5));

        let realtime = config.realtime_config();
        assert_eq!(realtime.filter.table, "tasks");
        assert_eq!(realtime.filter.schema, "public");
    }

    #[test]
    fn test_missing_optional_fields_use_defaults() {
        let json = r#"{
            "api_base_url": "https://api.example.com",
            "realtime_url": "wss://x.supabase.co/realtime/v1",
            "poll_interval_ms": 2000,
            "backstop_interval_ms": 10000,
            "fetch_retries": 3,
            "fetch_retry_delay_ms": 1000,
            "max_reconnect_attempts": 5,
            "reconnect_delay_ms": 5000,
            "request_timeout_secs": 30
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.tasks_table, "tasks");
        assert!(config.realtime_enabled);
        assert!(config.supabase_anon_key.is_empty());
    }
}
