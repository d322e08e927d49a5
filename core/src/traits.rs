//! Capability seams between the orchestrator and the outside world
//!
//! The orchestrator only talks to workers through [`WorkerChannel`], obtains
//! them from a [`WorkerLauncher`], and learns per-unit parameters from a
//! [`ParamsSource`]. Real implementations live in `worker` and `unit`; tests
//! substitute in-memory fakes.

use std::path::Path;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::error::HarnessResult;
use crate::message::{Command, Response};
use crate::unit::{TestUnit, UnitParams};
use crate::worker::WorkerState;

// ============================================================================
// Worker Channel Trait
// ============================================================================

/// Line-oriented, fire-and-forget channel to one worker process
///
/// Lifecycle is `Unspawned -> Running -> Terminated`. Sending never waits for
/// a reply; replies are picked up later with [`WorkerChannel::try_receive`].
#[async_trait]
pub trait WorkerChannel: Send {
    /// Name used in logs (usually the test unit name)
    fn name(&self) -> &str;

    /// Current lifecycle state
    fn state(&self) -> WorkerState;

    /// Start the worker; valid only once, from `Unspawned`
    async fn spawn(&mut self) -> HarnessResult<()>;

    /// Write one command
    ///
    /// An error means the channel is no longer writable (for example the
    /// process exited) and the current unit cannot continue.
    async fn send(&mut self, command: &Command) -> HarnessResult<()>;

    /// Take one already-received response without waiting
    fn try_receive(&mut self) -> Option<Response>;

    /// Drain whatever has arrived so far
    ///
    /// The iterator is lazy: responses it does not reach stay queued for the
    /// next drain.
    fn receive(&mut self) -> Drain<'_, Self>
    where
        Self: Sized,
    {
        Drain::new(self)
    }

    /// Non-blocking liveness probe
    fn is_running(&mut self) -> bool;

    /// Forcibly end the worker and release its resources; idempotent
    async fn terminate(&mut self) -> HarnessResult<()>;
}

/// Iterator over the responses currently queued on a channel
pub struct Drain<'a, C: ?Sized> {
    channel: &'a mut C,
}

impl<'a, C: WorkerChannel + ?Sized> Drain<'a, C> {
    /// Drain `channel`
    pub fn new(channel: &'a mut C) -> Self {
        Self { channel }
    }
}

impl<C: WorkerChannel + ?Sized> Iterator for Drain<'_, C> {
    type Item = Response;

    fn next(&mut self) -> Option<Response> {
        self.channel.try_receive()
    }
}

// ============================================================================
// Worker Launcher Trait
// ============================================================================

/// Builds an unspawned worker channel for a test unit
pub trait WorkerLauncher: Send + Sync {
    /// Launcher identifier for logs
    fn name(&self) -> &str;

    /// Prepare a channel for `unit` using `profile` as its scratch profile
    ///
    /// The channel takes ownership of the profile directory and removes it
    /// when terminated.
    fn launch(&self, unit: &TestUnit, profile: TempDir) -> HarnessResult<Box<dyn WorkerChannel>>;
}

// ============================================================================
// Params Source Trait
// ============================================================================

/// Supplies the `run_test` params and timeout budget for a test unit
pub trait ParamsSource: Send + Sync {
    /// Source identifier for logs
    fn name(&self) -> &str;

    /// Params for the unit whose script file is named `unit_name`
    ///
    /// Unrecognized names get empty params and a default budget.
    fn params_for(&self, unit_name: &str) -> UnitParams;

    /// Params for the script at `script`, keyed by its file name
    fn params_for_script(&self, script: &Path) -> UnitParams {
        let name = script
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.params_for(&name)
    }
}
