//! Controller configuration.
//!
//! All fields have defaults so a TOML file (or a caller) only needs to
//! name what it overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ControllerError;

/// Configuration for a [`PolledLoader`](crate::PolledLoader).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Milliseconds between poll invocations. Defaults to 5000.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Swap new data in silently instead of raising a notice.
    /// Defaults to false.
    #[serde(default)]
    pub immediate_update: bool,

    /// Master on/off switch. Re-enabling a disabled controller forces one
    /// immediate re-sync poll before the timer cadence resumes.
    /// Defaults to true.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Title of the notice raised when newer data is detected.
    #[serde(default = "default_notice_title")]
    pub notice_title: String,

    /// Body of the staleness notice.
    #[serde(default = "default_notice_description")]
    pub notice_description: String,

    /// Label of the notice action that accepts the pending snapshot.
    #[serde(default = "default_notice_action_title")]
    pub notice_action_title: String,
}

fn default_interval_ms() -> u64 {
    5000
}

fn default_enabled() -> bool {
    true
}

fn default_notice_title() -> String {
    "New data available".to_string()
}

fn default_notice_description() -> String {
    "The information on this screen has changed since it was loaded.".to_string()
}

fn default_notice_action_title() -> String {
    "Refresh screen".to_string()
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            immediate_update: false,
            enabled: default_enabled(),
            notice_title: default_notice_title(),
            notice_description: default_notice_description(),
            notice_action_title: default_notice_action_title(),
        }
    }
}

impl PollConfig {
    /// Spacing between poll invocations.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Fail fast on configurations the controller cannot run with.
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.interval_ms == 0 {
            return Err(ControllerError::ZeroInterval);
        }
        Ok(())
    }
}
