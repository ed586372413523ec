//! Realtime Reconnect State Machine
//!
//! Pure bookkeeping for a single task subscription: channel lifecycle,
//! consecutive failure count, and the decision whether to reconnect. The
//! subscription session drives it and performs the actual timers and I/O.

use std::time::Duration;

use chrono::Utc;
use concept_visualizer_api::ChannelStatus;
use serde::{Deserialize, Serialize};

/// Configuration for reconnect behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Maximum number of reconnects before giving up (default: 5)
    pub max_attempts: u32,
    /// Fixed delay before each reconnect (default: 5s)
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

/// Lifecycle of the push channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    #[default]
    Disconnected,
    Subscribing,
    Subscribed,
    Closed,
    Errored,
    TimedOut,
}

/// What the session should do after a channel failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectAction {
    Reconnect { attempt: u32, delay: Duration },
    GiveUp,
}

/// Observable subscription status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubscriptionStatus {
    pub state: ChannelState,
    /// Reconnects scheduled since the last successful subscribe
    pub reconnect_attempts: u32,
    /// Whether a reconnect is pending
    pub should_reconnect: bool,
    pub last_error: Option<String>,
    /// RFC 3339 timestamp of `last_error`
    pub last_error_at: Option<String>,
    pub max_attempts_reached: bool,
}

impl SubscriptionStatus {
    pub fn is_subscribed(&self) -> bool {
        self.state == ChannelState::Subscribed
    }
}

#[derive(Debug, Clone)]
pub struct ReconnectMachine {
    config: ReconnectConfig,
    status: SubscriptionStatus,
}

impl ReconnectMachine {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            status: SubscriptionStatus::default(),
        }
    }

    pub fn status(&self) -> &SubscriptionStatus {
        &self.status
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    pub fn begin_subscribe(&mut self) {
        self.status.state = ChannelState::Subscribing;
        self.status.should_reconnect = false;
    }

    /// The session is no longer attached to a channel (torn down, waiting
    /// for a reconnect, or given up). Error history is kept.
    pub fn mark_disconnected(&mut self) {
        self.status.state = ChannelState::Disconnected;
    }

    /// Apply a channel status. Returns an action only for failures.
    pub fn on_status(&mut self, status: &ChannelStatus) -> Option<ReconnectAction> {
        match status {
            ChannelStatus::Subscribed => {
                self.status = SubscriptionStatus {
                    state: ChannelState::Subscribed,
                    ..SubscriptionStatus::default()
                };
                None
            }
            ChannelStatus::System { ok: true, .. } => None,
            ChannelStatus::System { ok: false, message } => {
                Some(self.fail(ChannelState::Errored, Some(message.clone())))
            }
            ChannelStatus::Error(message) => {
                Some(self.fail(ChannelState::Errored, Some(message.clone())))
            }
            ChannelStatus::Closed => Some(self.fail(ChannelState::Closed, None)),
            ChannelStatus::TimedOut => Some(self.fail(
                ChannelState::TimedOut,
                Some("subscription timed out".to_string()),
            )),
        }
    }

    /// The transport could not open a channel at all.
    pub fn on_open_failed(&mut self, error: impl Into<String>) -> ReconnectAction {
        self.fail(ChannelState::Errored, Some(error.into()))
    }

    fn fail(&mut self, state: ChannelState, error: Option<String>) -> ReconnectAction {
        self.status.state = state;
        if let Some(error) = error {
            self.status.last_error = Some(error);
            self.status.last_error_at = Some(Utc::now().to_rfc3339());
        }

        if self.status.reconnect_attempts >= self.config.max_attempts {
            self.status.should_reconnect = false;
            self.status.max_attempts_reached = true;
            return ReconnectAction::GiveUp;
        }

        self.status.reconnect_attempts += 1;
        self.status.should_reconnect = true;
        self.status.max_attempts_reached =
            self.status.reconnect_attempts >= self.config.max_attempts;
        ReconnectAction::Reconnect {
            attempt: self.status.reconnect_attempts,
            delay: self.config.delay,
        }
    }
}
