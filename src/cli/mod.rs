//! CLI argument parsing and suite wiring

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use canary_core::{
    ChannelConfig, HarnessConfig, Orchestrator, OrchestratorBuilder, ProcessLauncher,
    SuiteParams, SuiteReport, SCRIPT_PLACEHOLDER,
};
use clap::Parser;

/// Autograph canary - runs signature checks in xpcshell workers
#[derive(Parser, Debug)]
#[command(name = "autograph-canary")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the test scripts
    #[arg(long, env = "CANARY_TESTS_DIR", default_value = "tests")]
    pub tests_dir: PathBuf,

    /// Glob selecting test scripts by file name
    #[arg(short, long, env = "TEST_FILES_GLOB", default_value = "*_test.js")]
    pub glob: String,

    /// Comma-separated collections for the content signature test
    #[arg(long, env = "CSIG_COLLECTIONS")]
    pub collections: Option<String>,

    /// Settings environment for the content signature test
    #[arg(long, env = "CSIG_ENV")]
    pub csig_env: Option<String>,

    /// Signing environment for the add-on signature test
    #[arg(long, env = "XPI_ENV")]
    pub xpi_env: Option<String>,

    /// Comma-separated XPI URLs for the add-on signature test
    #[arg(long, env = "XPI_URLS")]
    pub xpi_urls: Option<String>,

    /// Worker executable
    #[arg(long, env = "XPCSHELL_PATH", default_value = "xpcshell")]
    pub xpcshell: PathBuf,

    /// Worker argument; repeat for several. `{script}` and `{profile}` are substituted
    #[arg(long = "worker-arg", allow_hyphen_values = true, default_value = SCRIPT_PLACEHOLDER)]
    pub worker_args: Vec<String>,

    /// Parent directory for scratch profiles
    #[arg(long, env = "CANARY_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Budget per content signature collection, in seconds
    #[arg(long, default_value = "5")]
    pub per_target_timeout: u64,

    /// Budget for every other test, in seconds
    #[arg(long, default_value = "5")]
    pub default_timeout: u64,

    /// Reply timeout for worker commands, in seconds
    #[arg(long, default_value = "10")]
    pub reply_timeout: u64,

    /// Poll interval while waiting for a reply, in milliseconds
    #[arg(long, default_value = "100")]
    pub poll_interval_ms: u64,

    /// Extra seconds a test may run past its budget before the worker is killed
    #[arg(long, default_value = "1")]
    pub run_grace: u64,

    /// Log level (`RUST_LOG` takes precedence)
    #[arg(long, env = "CANARY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// List the discovered tests and their params without running them
    #[arg(long)]
    pub list: bool,
}

impl Cli {
    /// Run the suite (or list it) and return the process exit code
    pub async fn run(&self) -> Result<ExitCode> {
        let orchestrator = self.orchestrator()?;

        if self.list {
            self.list_units(&orchestrator)?;
            return Ok(ExitCode::SUCCESS);
        }

        tracing::info!(
            tests_dir = %self.tests_dir.display(),
            glob = %self.glob,
            xpcshell = %self.xpcshell.display(),
            "Starting autograph canary"
        );

        let report = orchestrator
            .discover_and_run()
            .await
            .context("Suite run failed")?;

        print_report(&report);
        Ok(ExitCode::from(report.exit_code()))
    }

    /// Filter directive for the log subscriber
    pub fn log_filter(&self) -> String {
        log_directive(&self.log_level)
    }

    fn suite_params(&self) -> SuiteParams {
        SuiteParams {
            collections: self.collections.clone(),
            content_env: self.csig_env.clone(),
            addon_env: self.xpi_env.clone(),
            xpi_urls: self.xpi_urls.clone(),
            ..SuiteParams::default()
        }
        .with_per_target_timeout(Duration::from_secs(self.per_target_timeout))
        .with_default_timeout(Duration::from_secs(self.default_timeout))
    }

    fn orchestrator(&self) -> Result<Orchestrator> {
        let mut config = HarnessConfig::new(&self.tests_dir)
            .with_test_glob(&self.glob)
            .with_run_grace(Duration::from_secs(self.run_grace));
        if let Some(dir) = &self.scratch_dir {
            config = config.with_scratch_dir(dir);
        }

        let channel_config = ChannelConfig::default()
            .with_reply_timeout(Duration::from_secs(self.reply_timeout))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms));

        let launcher = ProcessLauncher::new(&self.xpcshell)
            .with_arg_template(self.worker_args.clone())
            .with_terminate_grace(channel_config.terminate_grace);

        OrchestratorBuilder::new()
            .config(config)
            .launcher(Arc::new(launcher))
            .params_source(Arc::new(self.suite_params()))
            .channel_config(channel_config)
            .build()
            .context("Invalid canary configuration")
    }

    fn list_units(&self, orchestrator: &Orchestrator) -> Result<()> {
        let units = orchestrator
            .discover()
            .with_context(|| format!("Failed to list tests in {}", self.tests_dir.display()))?;

        for unit in &units {
            println!(
                "{}  budget={}s  params={}",
                unit.script.display(),
                unit.timeout_budget.as_secs_f64(),
                serde_json::Value::Object(unit.params.clone())
            );
        }
        println!("{} test(s)", units.len());
        Ok(())
    }
}

/// Map a log level name onto a tracing filter directive
///
/// Accepts tracing's names and the Python-style names the canary
/// environment has always used (`WARNING`, `CRITICAL`, ...).
pub fn log_directive(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    match level.as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        "notset" => "trace".to_string(),
        "" => "info".to_string(),
        _ => level,
    }
}

fn print_report(report: &SuiteReport) {
    println!();
    println!("{}", "=".repeat(70));
    for outcome in &report.outcomes {
        let response = outcome.response.as_ref();
        println!(
            "{:<9} {}  ({:.2}s, worker_id={}, command_time={}, response_time={})",
            format!("{}:", outcome.status),
            outcome.script.display(),
            outcome.duration.as_secs_f64(),
            display_opt(response.and_then(|r| r.worker_id)),
            display_opt(response.and_then(|r| r.command_time)),
            display_opt(response.and_then(|r| r.response_time)),
        );
        if let Some(error) = &outcome.error {
            println!("          {error}");
        }
    }
    println!("{}", "=".repeat(70));

    let summary = report.summary();
    let failed = report.failed_names();
    if failed.is_empty() {
        println!("{} test(s), {} passed", summary.total, summary.passed);
    } else {
        println!(
            "{} test(s), {} passed, {} failed: {}",
            summary.total,
            summary.passed,
            summary.failed,
            failed.join(", ")
        );
    }
}

fn display_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}
