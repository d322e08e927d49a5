//! Error types for canary-core

use std::time::Duration;

use thiserror::Error;

use crate::message::Mode;

/// Core error type
///
/// Every variant is caught at the per-unit boundary by the orchestrator and
/// turned into a recorded failure; none of them aborts the suite.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The worker process could not be started
    #[error("spawn failed: {0}")]
    Spawn(String),

    /// The worker channel is closed or rejected a write
    #[error("transport closed: {0}")]
    Transport(String),

    /// No definitive reply arrived before the deadline
    #[error("{mode} timed out after {elapsed:?}{}", closed_suffix(.channel_closed))]
    Timeout {
        /// Mode of the command that went unanswered
        mode: Mode,
        /// Time spent waiting before giving up
        elapsed: Duration,
        /// The wait ended early because a keep-alive probe was rejected
        channel_closed: bool,
    },

    /// A message could not be encoded or decoded
    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Configuration error with a message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// A required builder field was not provided
    pub fn missing_config(field: &str) -> Self {
        Self::Config(format!("missing required field: {field}"))
    }

    /// Transport error with a message
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Spawn error with a message
    pub fn spawn(msg: impl Into<String>) -> Self {
        Self::Spawn(msg.into())
    }

    /// Whether this error is a dispatcher deadline expiry
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether this error means the channel can no longer be used
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Io(_))
    }
}

fn closed_suffix(channel_closed: &bool) -> &'static str {
    if *channel_closed {
        " (channel closed)"
    } else {
        ""
    }
}

/// Result type alias
pub type HarnessResult<T> = std::result::Result<T, HarnessError>;
