//! Orchestrator execution logic

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;
use tokio::time::Instant;

use crate::channel::ChannelConfig;
use crate::config::HarnessConfig;
use crate::dispatcher::SyncDispatcher;
use crate::error::{HarnessError, HarnessResult};
use crate::message::{Mode, Response};
use crate::traits::{ParamsSource, WorkerChannel, WorkerLauncher};
use crate::unit::{discover_units, TestUnit};

use super::aggregator::{SuiteReport, UnitOutcome, UnitStatus};

const SCRATCH_PREFIX: &str = "canary_";
const PROFILE_PREFIX: &str = "profile_";

/// Orchestrator runs a suite of test units, one worker at a time
///
/// Each unit gets its own profile directory and worker process. The worker
/// is terminated before the next unit starts, whatever happened.
pub struct Orchestrator {
    /// Harness configuration
    pub(crate) config: HarnessConfig,

    /// Creates one worker channel per unit
    pub(crate) launcher: Arc<dyn WorkerLauncher>,

    /// Per-unit params and budgets
    pub(crate) params_source: Arc<dyn ParamsSource>,

    /// Request/response over the worker channel
    pub(crate) dispatcher: SyncDispatcher,
}

impl Orchestrator {
    /// Create a new orchestrator
    ///
    /// Use `OrchestratorBuilder` for a more ergonomic construction.
    pub fn new(
        config: HarnessConfig,
        launcher: Arc<dyn WorkerLauncher>,
        params_source: Arc<dyn ParamsSource>,
        channel_config: ChannelConfig,
    ) -> Self {
        Self {
            config,
            launcher,
            params_source,
            dispatcher: SyncDispatcher::new(channel_config),
        }
    }

    /// Get the harness configuration
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Units found in the configured tests directory, sorted
    pub fn discover(&self) -> HarnessResult<Vec<TestUnit>> {
        discover_units(
            &self.config.tests_dir,
            &self.config.test_glob,
            self.params_source.as_ref(),
        )
    }

    /// Discover and run the suite
    pub async fn discover_and_run(&self) -> HarnessResult<SuiteReport> {
        let units = self.discover()?;
        self.run(&units).await
    }

    /// Run `units` in order
    ///
    /// Unit failures are recorded in the report; only failing to create the
    /// scratch root is an error.
    pub async fn run(&self, units: &[TestUnit]) -> HarnessResult<SuiteReport> {
        let scratch = self.scratch_root()?;

        tracing::info!(
            units = units.len(),
            launcher = self.launcher.name(),
            params = self.params_source.name(),
            scratch = %scratch.path().display(),
            "Starting suite"
        );

        let mut outcomes = Vec::with_capacity(units.len());
        for unit in units {
            let outcome = self.run_unit(unit, scratch.path()).await;
            log_outcome(&outcome);
            outcomes.push(outcome);
        }

        let report = SuiteReport::new(outcomes);
        let summary = report.summary();
        if report.is_success() {
            tracing::info!(
                total = summary.total,
                passed = summary.passed,
                elapsed_secs = summary.total_duration.as_secs_f64(),
                "Tests passed successfully"
            );
        } else {
            tracing::error!(
                total = summary.total,
                passed = summary.passed,
                failed = summary.failed,
                timed_out = summary.timed_out,
                failed_units = ?report.failed_names(),
                "Suite failed"
            );
        }

        Ok(report)
    }

    fn scratch_root(&self) -> HarnessResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let dir = match &self.config.scratch_dir {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        tracing::debug!(dir = %dir.path().display(), "Created scratch root");
        Ok(dir)
    }

    /// Run one unit to completion; never fails, the outcome says how it went
    async fn run_unit(&self, unit: &TestUnit, scratch: &Path) -> UnitOutcome {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut outcome = UnitOutcome {
            name: unit.name.clone(),
            script: unit.script.clone(),
            status: UnitStatus::Failed,
            error: None,
            response: None,
            worker_info: None,
            started_at,
            duration: Duration::ZERO,
        };

        tracing::info!(
            unit = %unit.name,
            budget_secs = unit.timeout_budget.as_secs_f64(),
            "Running unit"
        );

        let launched = tempfile::Builder::new()
            .prefix(PROFILE_PREFIX)
            .tempdir_in(scratch)
            .map_err(HarnessError::from)
            .and_then(|profile| {
                tracing::debug!(unit = %unit.name, profile = %profile.path().display(), "Prepared profile");
                self.launcher.launch(unit, profile)
            });

        let mut channel = match launched {
            Ok(channel) => channel,
            Err(e) => {
                outcome.status = UnitStatus::SpawnFailed;
                outcome.error = Some(e.to_string());
                outcome.duration = start.elapsed();
                return outcome;
            }
        };

        let result = self.exchange(channel.as_mut(), unit, &mut outcome).await;

        if let Err(e) = channel.terminate().await {
            tracing::warn!(unit = %unit.name, error = %e, "Terminating worker failed");
        }

        match result {
            Ok(response) => {
                outcome.status = if response.is_success() {
                    UnitStatus::Passed
                } else {
                    UnitStatus::Failed
                };
                outcome.response = Some(response);
            }
            Err(e) => {
                outcome.status = UnitStatus::from_error(&e);
                outcome.error = Some(e.to_string());
            }
        }

        outcome.duration = start.elapsed();
        outcome
    }

    /// Spawn, ask for worker info, then run the test
    async fn exchange(
        &self,
        channel: &mut dyn WorkerChannel,
        unit: &TestUnit,
        outcome: &mut UnitOutcome,
    ) -> HarnessResult<Response> {
        channel.spawn().await?;

        match self
            .dispatcher
            .sync_send(&mut *channel, &unit.worker_info_command())
            .await
        {
            Ok(info) => {
                tracing::debug!(unit = %unit.name, info = %info.as_dict(), "Worker info");
                outcome.worker_info = Some(info);
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!(unit = %unit.name, error = %e, "Worker info unavailable");
            }
            Err(e) => return Err(e),
        }

        let reply_timeout = unit
            .timeout_budget
            .max(self.dispatcher.config().reply_timeout);
        let wall_clock = reply_timeout + self.dispatcher.config().deadline_slack + self.config.run_grace;

        let command = unit.run_test_command();
        tracing::debug!(unit = %unit.name, command = %command.as_dict(), "Dispatching test");

        match tokio::time::timeout(
            wall_clock,
            self.dispatcher
                .sync_send_with_timeout(&mut *channel, &command, reply_timeout),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(HarnessError::Timeout {
                mode: Mode::RunTest,
                elapsed: wall_clock,
                channel_closed: false,
            }),
        }
    }
}

fn log_outcome(outcome: &UnitOutcome) {
    let response = outcome.response.as_ref();
    let duration_ms = outcome.duration.as_millis() as u64;

    if outcome.passed() {
        tracing::info!(
            unit = %outcome.name,
            status = %outcome.status,
            duration_ms,
            worker_id = ?response.and_then(|r| r.worker_id),
            command_time = ?response.and_then(|r| r.command_time),
            response_time = ?response.and_then(|r| r.response_time),
            "Unit passed"
        );
        if let Some(response) = response {
            tracing::debug!(unit = %outcome.name, response = %response.as_dict(), "Test reply");
        }
        return;
    }

    tracing::error!(
        unit = %outcome.name,
        status = %outcome.status,
        duration_ms,
        error = ?outcome.error,
        worker_id = ?response.and_then(|r| r.worker_id),
        command_time = ?response.and_then(|r| r.command_time),
        response_time = ?response.and_then(|r| r.response_time),
        "Unit failed"
    );

    if let Some(response) = response {
        tracing::info!(unit = %outcome.name, response = %response.as_dict(), "Test reply");
        for message in response.messages() {
            tracing::warn!(unit = %outcome.name, %message, "Test message");
        }
        for sub in response.sub_results().iter().filter(|s| !s.passed) {
            tracing::warn!(
                unit = %outcome.name,
                target = %sub.label,
                messages = ?sub.messages,
                "Sub-test failed"
            );
        }
    }

    match &outcome.worker_info {
        Some(info) => tracing::info!(unit = %outcome.name, info = %info.as_dict(), "Worker info"),
        None => tracing::info!(unit = %outcome.name, "No worker info"),
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("launcher", &self.launcher.name())
            .field("params_source", &self.params_source.name())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
