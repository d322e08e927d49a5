//! Tests for the Orchestrator module

use super::aggregator::{aggregate_outcomes, SuiteReport, UnitOutcome, UnitStatus};
use super::builder::OrchestratorBuilder;
use super::executor::Orchestrator;
use crate::channel::ChannelConfig;
use crate::config::HarnessConfig;
use crate::message::Mode;
use crate::testing::{ack, reply, ScriptedChannel, ScriptedLauncher};
use crate::unit::{SuiteParams, TestUnit, ADDON_SIGNATURE_TEST, CONTENT_SIGNATURE_TEST};

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

fn params() -> SuiteParams {
    SuiteParams::default()
        .with_collections("onecrl,search-config")
        .with_content_env("prod")
}

fn unit(name: &str) -> TestUnit {
    TestUnit::from_script(PathBuf::from("tests").join(name), &params())
}

/// Worker that answers both commands, with `run_test` reporting `success`
fn answering(name: &str, success: bool) -> ScriptedChannel {
    ScriptedChannel::new(name)
        .on(
            Mode::GetWorkerInfo,
            vec![reply(Mode::GetWorkerInfo, Some(1), true)],
        )
        .on(
            Mode::RunTest,
            vec![ack(Mode::RunTest), reply(Mode::RunTest, Some(2), success)],
        )
}

fn orchestrator(launcher: Arc<ScriptedLauncher>, scratch: &TempDir) -> Orchestrator {
    OrchestratorBuilder::new()
        .config(HarnessConfig::default().with_scratch_dir(scratch.path()))
        .launcher(launcher)
        .params_source(Arc::new(params()))
        .channel_config(
            ChannelConfig::default()
                .with_poll_interval(Duration::from_millis(100))
                .with_reply_timeout(Duration::from_secs(1)),
        )
        .build()
        .expect("Failed to build orchestrator")
}

fn outcome(name: &str, status: UnitStatus) -> UnitOutcome {
    UnitOutcome {
        name: name.to_string(),
        script: PathBuf::from(name),
        status,
        error: None,
        response: None,
        worker_info: None,
        started_at: Utc::now(),
        duration: Duration::from_millis(250),
    }
}

// ============================================================================
// Aggregator Tests
// ============================================================================

#[test]
fn test_aggregate_empty() {
    let summary = aggregate_outcomes(&[]);
    assert_eq!(summary.total, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.pass_rate(), 1.0);
}

#[test]
fn test_aggregate_outcomes() {
    let summary = aggregate_outcomes(&[
        outcome("a", UnitStatus::Passed),
        outcome("b", UnitStatus::TimedOut),
        outcome("c", UnitStatus::SpawnFailed),
    ]);

    assert_eq!(summary.total, 3);
    assert_eq!(summary.passed, 1);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.timed_out, 1);
    assert_eq!(summary.total_duration, Duration::from_millis(750));
}

#[test]
fn test_empty_report_is_success() {
    let report = SuiteReport::default();
    assert!(report.is_success());
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_report_exit_code() {
    let report = SuiteReport::new(vec![
        outcome("a", UnitStatus::Passed),
        outcome("b", UnitStatus::Failed),
    ]);
    assert!(!report.is_success());
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.failed_names(), vec!["b"]);
    assert_eq!(report.passed().count(), 1);
}

#[test]
fn test_status_from_error() {
    use crate::error::HarnessError;

    assert_eq!(
        UnitStatus::from_error(&HarnessError::transport("gone")),
        UnitStatus::TransportFailed
    );
    assert_eq!(
        UnitStatus::from_error(&HarnessError::spawn("no such file")),
        UnitStatus::SpawnFailed
    );
    assert_eq!(
        UnitStatus::from_error(&HarnessError::Timeout {
            mode: Mode::RunTest,
            elapsed: Duration::from_secs(1),
            channel_closed: false,
        }),
        UnitStatus::TimedOut
    );
    assert_eq!(
        UnitStatus::from_error(&HarnessError::config("bad")),
        UnitStatus::Failed
    );
}

// ============================================================================
// Builder Tests
// ============================================================================

#[test]
fn test_builder_missing_launcher() {
    let result = OrchestratorBuilder::new()
        .params_source(Arc::new(params()))
        .build();

    assert!(result.unwrap_err().to_string().contains("launcher"));
}

#[test]
fn test_builder_missing_params_source() {
    let result = OrchestratorBuilder::new()
        .launcher(Arc::new(ScriptedLauncher::new()))
        .build();

    assert!(result.unwrap_err().to_string().contains("params_source"));
}

#[test]
fn test_builder_invalid_config() {
    let result = OrchestratorBuilder::new()
        .launcher(Arc::new(ScriptedLauncher::new()))
        .params_source(Arc::new(params()))
        .test_glob("[unclosed")
        .build();

    assert!(result.is_err());

    let result = OrchestratorBuilder::new()
        .launcher(Arc::new(ScriptedLauncher::new()))
        .params_source(Arc::new(params()))
        .channel_config(ChannelConfig::default().with_poll_interval(Duration::ZERO))
        .build();

    assert!(result.is_err());
}

#[test]
fn test_orchestrator_debug_format() {
    let scratch = TempDir::new().unwrap();
    let orchestrator = orchestrator(Arc::new(ScriptedLauncher::new()), &scratch);

    let debug = format!("{:?}", orchestrator);
    assert!(debug.contains("Orchestrator"));
    assert!(debug.contains("scripted"));
    assert!(debug.contains("suite"));
}

// ============================================================================
// Suite Runs
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_content_signature_unit_passes() {
    let scratch = TempDir::new().unwrap();
    let channel = answering(CONTENT_SIGNATURE_TEST, true);
    let log = channel.log();
    let launcher = Arc::new(ScriptedLauncher::new().with_channel(CONTENT_SIGNATURE_TEST, channel));

    let unit = unit(CONTENT_SIGNATURE_TEST);
    assert_eq!(unit.timeout_budget, Duration::from_secs(10));

    let report = orchestrator(launcher, &scratch)
        .run(&[unit])
        .await
        .expect("Run failed");

    assert_eq!(report.exit_code(), 0);
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, UnitStatus::Passed);
    assert!(outcome.worker_info.is_some());
    assert!(outcome.response.as_ref().is_some_and(|r| r.is_success()));

    assert_eq!(log.spawns(), 1);
    assert_eq!(log.terminations(), 1);
    assert_eq!(log.sent_modes(), vec![Mode::GetWorkerInfo, Mode::RunTest]);

    let run_test = log
        .sent()
        .into_iter()
        .find(|c| *c.mode() == Mode::RunTest)
        .unwrap();
    assert_eq!(run_test.id(), Some(2));
    assert_eq!(run_test.get_params()["collections"], "onecrl,search-config");
    assert_eq!(run_test.get_params()["env"], "prod");
}

#[tokio::test(start_paused = true)]
async fn test_acks_until_deadline_fails_suite() {
    let scratch = TempDir::new().unwrap();
    let channel = ScriptedChannel::new(CONTENT_SIGNATURE_TEST)
        .on(
            Mode::GetWorkerInfo,
            vec![reply(Mode::GetWorkerInfo, Some(1), true)],
        )
        .on(
            Mode::RunTest,
            vec![ack(Mode::RunTest), ack(Mode::RunTest), ack(Mode::RunTest)],
        );
    let log = channel.log();
    let launcher = Arc::new(ScriptedLauncher::new().with_channel(CONTENT_SIGNATURE_TEST, channel));

    let start = tokio::time::Instant::now();
    let report = orchestrator(launcher, &scratch)
        .run(&[unit(CONTENT_SIGNATURE_TEST)])
        .await
        .unwrap();

    assert_eq!(report.exit_code(), 1);
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, UnitStatus::TimedOut);
    assert!(outcome.response.is_none());
    assert!(outcome
        .error
        .as_deref()
        .is_some_and(|e| e.contains("run_test timed out")));

    // The budget outlasts the reply timeout and is what bounds the wait
    assert!(start.elapsed() >= Duration::from_secs(10));
    assert_eq!(log.terminations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_run_test_send_is_cut_off_by_wall_clock() {
    let scratch = TempDir::new().unwrap();
    let channel = ScriptedChannel::new(CONTENT_SIGNATURE_TEST)
        .on(
            Mode::GetWorkerInfo,
            vec![reply(Mode::GetWorkerInfo, Some(1), true)],
        )
        .hang_on(Mode::RunTest);
    let log = channel.log();
    let launcher = Arc::new(ScriptedLauncher::new().with_channel(CONTENT_SIGNATURE_TEST, channel));

    let start = tokio::time::Instant::now();
    let report = orchestrator(launcher, &scratch)
        .run(&[unit(CONTENT_SIGNATURE_TEST)])
        .await
        .unwrap();

    assert_eq!(report.exit_code(), 1);
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, UnitStatus::TimedOut);
    assert!(outcome.response.is_none());
    assert!(outcome
        .error
        .as_deref()
        .is_some_and(|e| e.contains("run_test timed out")));
    assert_eq!(log.sent_modes(), vec![Mode::GetWorkerInfo, Mode::RunTest]);
    assert_eq!(log.terminations(), 1);

    // max(10s budget, 1s reply timeout) + 1s slack + 1s run grace
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(12), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(13), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_crash_after_spawn_does_not_stop_suite() {
    let scratch = TempDir::new().unwrap();
    let first = answering(ADDON_SIGNATURE_TEST, true);
    let second = ScriptedChannel::new(CONTENT_SIGNATURE_TEST).accept_sends(0);
    let (first_log, second_log) = (first.log(), second.log());

    let launcher = Arc::new(
        ScriptedLauncher::new()
            .with_channel(ADDON_SIGNATURE_TEST, first)
            .with_channel(CONTENT_SIGNATURE_TEST, second),
    );

    let report = orchestrator(launcher, &scratch)
        .run(&[unit(ADDON_SIGNATURE_TEST), unit(CONTENT_SIGNATURE_TEST)])
        .await
        .unwrap();

    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.outcomes[0].status, UnitStatus::Passed);
    assert_eq!(report.outcomes[1].status, UnitStatus::TransportFailed);
    assert_eq!(report.failed_names(), vec![CONTENT_SIGNATURE_TEST]);

    assert_eq!(first_log.terminations(), 1);
    assert_eq!(second_log.terminations(), 1);
    assert!(second_log.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_spawn_failure_is_recorded_and_suite_continues() {
    let scratch = TempDir::new().unwrap();
    let broken = ScriptedChannel::new("broken_test.js").failing_spawn();
    let broken_log = broken.log();

    let launcher = Arc::new(
        ScriptedLauncher::new()
            .with_channel("broken_test.js", broken)
            .with_channel("smoke_test.js", answering("smoke_test.js", true)),
    );

    let report = orchestrator(launcher, &scratch)
        .run(&[unit("broken_test.js"), unit("smoke_test.js")])
        .await
        .unwrap();

    assert_eq!(report.outcomes[0].status, UnitStatus::SpawnFailed);
    assert_eq!(report.outcomes[1].status, UnitStatus::Passed);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(broken_log.terminations(), 1);
    assert!(broken_log.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_launch_failure_is_spawn_failure() {
    let scratch = TempDir::new().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new());

    let report = orchestrator(launcher, &scratch)
        .run(&[unit("unknown_test.js")])
        .await
        .unwrap();

    assert_eq!(report.outcomes[0].status, UnitStatus::SpawnFailed);
    assert!(report.outcomes[0].error.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_negative_result_is_failure() {
    let scratch = TempDir::new().unwrap();
    let launcher = Arc::new(
        ScriptedLauncher::new()
            .with_channel(ADDON_SIGNATURE_TEST, answering(ADDON_SIGNATURE_TEST, false)),
    );

    let report = orchestrator(launcher, &scratch)
        .run(&[unit(ADDON_SIGNATURE_TEST)])
        .await
        .unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, UnitStatus::Failed);
    assert!(outcome.error.is_none());
    assert!(outcome.response.is_some());
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_worker_info_is_not_fatal() {
    let scratch = TempDir::new().unwrap();
    let channel = ScriptedChannel::new("smoke_test.js").on(
        Mode::RunTest,
        vec![reply(Mode::RunTest, Some(2), true)],
    );
    let log = channel.log();
    let launcher = Arc::new(ScriptedLauncher::new().with_channel("smoke_test.js", channel));

    let report = orchestrator(launcher, &scratch)
        .run(&[unit("smoke_test.js")])
        .await
        .unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, UnitStatus::Passed);
    assert!(outcome.worker_info.is_none());
    assert_eq!(log.sent_modes(), vec![Mode::GetWorkerInfo, Mode::RunTest]);
}

#[tokio::test(start_paused = true)]
async fn test_profiles_are_unique_and_removed() {
    let scratch = TempDir::new().unwrap();
    let launcher = Arc::new(
        ScriptedLauncher::new()
            .with_channel("a_test.js", answering("a_test.js", true))
            .with_channel("b_test.js", answering("b_test.js", true)),
    );

    let report = orchestrator(Arc::clone(&launcher), &scratch)
        .run(&[unit("a_test.js"), unit("b_test.js")])
        .await
        .unwrap();
    assert!(report.is_success());

    let profiles = launcher.profiles();
    assert_eq!(profiles.len(), 2);
    assert_ne!(profiles[0], profiles[1]);
    for profile in &profiles {
        assert!(profile.starts_with(scratch.path()));
        assert!(!profile.exists());
    }

    // The scratch root itself is gone too
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_discover_and_run_in_sorted_order() {
    let scratch = TempDir::new().unwrap();
    let tests = TempDir::new().unwrap();
    for name in ["b_test.js", "a_test.js", "notes.txt"] {
        std::fs::write(tests.path().join(name), "// test").unwrap();
    }

    let launcher = Arc::new(
        ScriptedLauncher::new()
            .with_channel("a_test.js", answering("a_test.js", true))
            .with_channel("b_test.js", answering("b_test.js", false)),
    );

    let orchestrator = OrchestratorBuilder::new()
        .config(
            HarnessConfig::new(tests.path())
                .with_test_glob("*_test.js")
                .with_scratch_dir(scratch.path()),
        )
        .launcher(launcher)
        .params_source(Arc::new(params()))
        .build()
        .unwrap();

    let report = orchestrator.discover_and_run().await.unwrap();
    let names: Vec<_> = report.outcomes.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["a_test.js", "b_test.js"]);
    assert_eq!(report.failed_names(), vec!["b_test.js"]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_suite_succeeds() {
    let scratch = TempDir::new().unwrap();
    let report = orchestrator(Arc::new(ScriptedLauncher::new()), &scratch)
        .run(&[])
        .await
        .unwrap();

    assert!(report.outcomes.is_empty());
    assert_eq!(report.exit_code(), 0);
}
