//! canary-core: test harness for running signature canary scripts in worker processes
//!
//! This crate provides everything the `autograph-canary` binary drives:
//!
//! - Wire messages exchanged with workers (commands, responses)
//! - Worker processes behind the `WorkerChannel` trait
//! - The synchronous dispatcher turning fire-and-forget sends into calls
//! - Test unit discovery and per-unit params
//! - The orchestrator and its suite report

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod orchestrator;
pub mod traits;
pub mod unit;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::ChannelConfig;
pub use config::{ConfigError, HarnessConfig};
pub use dispatcher::{DispatchStats, SyncDispatcher};
pub use error::*;
pub use message::*;
pub use orchestrator::{
    aggregate_outcomes, Orchestrator, OrchestratorBuilder, SuiteReport, SuiteSummary,
    UnitOutcome, UnitStatus,
};
pub use traits::*;
pub use unit::*;
pub use worker::{
    ProcessLauncher, ProcessWorker, ProcessWorkerBuilder, WorkerState, PROFILE_ENV,
    PROFILE_PLACEHOLDER, SCRIPT_PLACEHOLDER,
};
