//! Orchestrator for suite runs
//!
//! The Orchestrator drives the whole canary run:
//! - Discovering test units and deriving their params
//! - Giving each unit a fresh profile and worker process
//! - Asking the worker for diagnostics, then running the test
//! - Terminating the worker and recording the outcome
//!
//! Units run strictly one after another in discovery order. A failing unit
//! never stops the suite; the report's exit code is the only verdict.
//!
//! # Example
//!
//! ```ignore
//! use canary_core::{OrchestratorBuilder, ProcessLauncher, SuiteParams};
//!
//! let orchestrator = OrchestratorBuilder::new()
//!     .config(HarnessConfig::new("tests"))
//!     .launcher(Arc::new(ProcessLauncher::new("xpcshell")))
//!     .params_source(Arc::new(SuiteParams::default()))
//!     .build()?;
//!
//! let report = orchestrator.discover_and_run().await?;
//! std::process::exit(report.exit_code().into());
//! ```

mod aggregator;
mod builder;
mod executor;

pub use aggregator::{aggregate_outcomes, SuiteReport, SuiteSummary, UnitOutcome, UnitStatus};
pub use builder::OrchestratorBuilder;
pub use executor::Orchestrator;

#[cfg(test)]
mod tests;
