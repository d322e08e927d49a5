//! Timing configuration for worker channels and the dispatcher

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Timing knobs shared by the dispatcher and the worker channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Pause between drain attempts while waiting for a reply
    pub poll_interval: Duration,

    /// How long to wait for a definitive reply unless a call overrides it
    pub reply_timeout: Duration,

    /// Slack added after the reply timeout for the final poll
    pub deadline_slack: Duration,

    /// How long `terminate` waits for a killed worker to be reaped
    pub terminate_grace: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            reply_timeout: Duration::from_secs(10),
            deadline_slack: Duration::from_secs(1),
            terminate_grace: Duration::from_secs(5),
        }
    }
}

impl ChannelConfig {
    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the default reply timeout
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Set the deadline slack
    pub fn with_deadline_slack(mut self, slack: Duration) -> Self {
        self.deadline_slack = slack;
        self
    }

    /// Set the termination grace period
    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    /// Validate the timing knobs
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "poll interval must be positive".into(),
            ));
        }
        if self.reply_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "reply timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}
