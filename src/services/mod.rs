//! Services
//!
//! Task-tracking engines and the facade that wires them together.

pub mod active_task;
pub mod polling;
pub mod realtime;
pub mod reconnect;
pub mod task_cache;
pub mod tracker;
pub mod transitions;

#[cfg(test)]
pub(crate) mod test_support;

pub use active_task::{ActiveTaskStore, TaskSelector};
pub use polling::{PollConfig, PollOptions, TaskPoller, TaskWatch, WatchState};
pub use realtime::{SubscriptionView, TaskSubscriber, TaskSubscription};
pub use reconnect::{ChannelState, ReconnectConfig, ReconnectMachine, SubscriptionStatus};
pub use task_cache::{CachedTask, TaskCache, UpdateSource};
pub use tracker::{TaskTracker, TrackedTask};
pub use transitions::TerminalTracker;
