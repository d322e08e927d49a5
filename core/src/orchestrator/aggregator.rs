//! Per-unit outcomes and the suite report built from them

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::HarnessError;
use crate::message::Response;

/// How a unit ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Definitive reply with `success: true`
    Passed,
    /// Definitive reply without `success: true`, or an unusable reply
    Failed,
    /// No definitive reply before the deadline
    TimedOut,
    /// The channel closed or rejected a write
    TransportFailed,
    /// The worker never started
    SpawnFailed,
}

impl UnitStatus {
    /// Status for an error that ended a unit
    pub fn from_error(error: &HarnessError) -> Self {
        match error {
            HarnessError::Timeout { .. } => Self::TimedOut,
            HarnessError::Spawn(_) => Self::SpawnFailed,
            HarnessError::Transport(_) | HarnessError::Io(_) => Self::TransportFailed,
            HarnessError::Config(_) | HarnessError::Protocol(_) => Self::Failed,
        }
    }

    /// Whether this counts as a pass
    pub fn is_pass(self) -> bool {
        self == Self::Passed
    }

    /// Label used in log lines
    pub fn label(self) -> &'static str {
        match self {
            Self::Passed => "SUCCESS",
            Self::Failed => "FAIL",
            Self::TimedOut => "TIMEOUT",
            Self::TransportFailed => "TRANSPORT",
            Self::SpawnFailed => "SPAWN",
        }
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything recorded about one unit
#[derive(Debug, Clone, Serialize)]
pub struct UnitOutcome {
    /// Unit name (script file name)
    pub name: String,

    /// Script path
    pub script: PathBuf,

    /// How the unit ended
    pub status: UnitStatus,

    /// Error that ended the unit, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// The definitive `run_test` reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Response>,

    /// The `get_worker_info` reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_info: Option<Response>,

    /// When the unit started
    pub started_at: DateTime<Utc>,

    /// Wall-clock time from launch to termination
    pub duration: Duration,
}

impl UnitOutcome {
    /// Whether the unit passed
    pub fn passed(&self) -> bool {
        self.status.is_pass()
    }
}

/// Counts over a set of outcomes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuiteSummary {
    /// Units run
    pub total: usize,

    /// Units that passed
    pub passed: usize,

    /// Units that failed for any reason
    pub failed: usize,

    /// Of the failures, how many timed out
    pub timed_out: usize,

    /// Sum of unit durations
    pub total_duration: Duration,
}

impl SuiteSummary {
    /// Pass rate (0.0 - 1.0); an empty suite counts as fully passing
    pub fn pass_rate(&self) -> f64 {
        if self.total > 0 {
            self.passed as f64 / self.total as f64
        } else {
            1.0
        }
    }
}

/// Summarize outcomes
pub fn aggregate_outcomes(outcomes: &[UnitOutcome]) -> SuiteSummary {
    let passed = outcomes.iter().filter(|o| o.passed()).count();
    let timed_out = outcomes
        .iter()
        .filter(|o| o.status == UnitStatus::TimedOut)
        .count();

    SuiteSummary {
        total: outcomes.len(),
        passed,
        failed: outcomes.len() - passed,
        timed_out,
        total_duration: outcomes.iter().map(|o| o.duration).sum(),
    }
}

/// Result of one suite run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SuiteReport {
    /// Outcomes in run order
    pub outcomes: Vec<UnitOutcome>,
}

impl SuiteReport {
    /// Report over `outcomes`
    pub fn new(outcomes: Vec<UnitOutcome>) -> Self {
        Self { outcomes }
    }

    /// Outcomes that passed
    pub fn passed(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.outcomes.iter().filter(|o| o.passed())
    }

    /// Outcomes that did not pass
    pub fn failed(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }

    /// True when no unit failed
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    /// Process exit code: 0 on success, 1 otherwise
    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// Counts over the outcomes
    pub fn summary(&self) -> SuiteSummary {
        aggregate_outcomes(&self.outcomes)
    }

    /// Names of the units that failed
    pub fn failed_names(&self) -> Vec<&str> {
        self.failed().map(|o| o.name.as_str()).collect()
    }
}
