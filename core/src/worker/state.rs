//! Worker lifecycle state

use crate::error::{HarnessError, HarnessResult};

/// Lifecycle of one worker channel
///
/// `Unspawned -> Running -> Terminated`, with no way back to `Running`.
/// Terminating an unspawned channel also lands in `Terminated`, so it can
/// never be spawned afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Created, process not started
    #[default]
    Unspawned,
    /// Process started and not yet terminated
    Running,
    /// Terminated (or failed to spawn)
    Terminated,
}

impl WorkerState {
    /// Check that a spawn may proceed from this state
    pub fn check_spawn(self) -> HarnessResult<()> {
        match self {
            WorkerState::Unspawned => Ok(()),
            other => Err(HarnessError::spawn(format!(
                "worker cannot be spawned while {other}"
            ))),
        }
    }

    /// Whether the channel is between spawn and terminate
    pub fn is_running(self) -> bool {
        self == WorkerState::Running
    }

    /// Whether the channel has reached its final state
    pub fn is_terminated(self) -> bool {
        self == WorkerState::Terminated
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Unspawned => write!(f, "unspawned"),
            WorkerState::Running => write!(f, "running"),
            WorkerState::Terminated => write!(f, "terminated"),
        }
    }
}
