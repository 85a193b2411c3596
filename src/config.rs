//! Configuration for the object model.
//!
//! # Example
//!
//! ```
//! use survey_model::ModelConfig;
//! use std::time::Duration;
//!
//! // Defaults
//! let config = ModelConfig::default();
//! assert_eq!(config.poll_interval(), Duration::from_millis(250));
//! assert_eq!(config.notify_interval(), Duration::from_millis(500));
//!
//! // Tuned for a slow backend
//! let config = ModelConfig::default()
//!     .with_poll_interval(Duration::from_secs(1))
//!     .with_reload_budget(Duration::from_secs(5));
//! assert_eq!(config.reload_budget_ms, 5000);
//! ```

use std::time::Duration;

use serde::Deserialize;

/// Timing knobs for the sync worker and change notifier.
///
/// All fields have defaults, so the struct can be embedded in an application
/// profile and deserialized from a partial section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelConfig {
    /// Maximum sleep between two reconciliation cycles when nothing wakes
    /// the worker.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Period of the change notifier.
    #[serde(default = "default_notify_interval_ms")]
    pub notify_interval_ms: u64,

    /// Wall-clock budget of one reload before an intermediate snapshot is
    /// published.
    #[serde(default = "default_reload_budget_ms")]
    pub reload_budget_ms: u64,

    /// Sleep after a cycle that left a source disconnected.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Name of the sync worker thread; the notifier uses it with a
    /// `-notify` suffix.
    #[serde(default = "default_worker_name")]
    pub worker_name: String,
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_notify_interval_ms() -> u64 {
    500
}

fn default_reload_budget_ms() -> u64 {
    2000
}

fn default_reconnect_delay_ms() -> u64 {
    500
}

fn default_worker_name() -> String {
    "model-sync".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            notify_interval_ms: default_notify_interval_ms(),
            reload_budget_ms: default_reload_budget_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            worker_name: default_worker_name(),
        }
    }
}

impl ModelConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn notify_interval(&self) -> Duration {
        Duration::from_millis(self.notify_interval_ms)
    }

    pub fn reload_budget(&self) -> Duration {
        Duration::from_millis(self.reload_budget_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_notify_interval(mut self, interval: Duration) -> Self {
        self.notify_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_reload_budget(mut self, budget: Duration) -> Self {
        self.reload_budget_ms = budget.as_millis() as u64;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }
}
