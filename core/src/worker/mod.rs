//! Worker processes and their lifecycle
//!
//! A worker is an external process (normally `xpcshell` running one test
//! script) that reads commands from stdin and writes responses to stdout,
//! one JSON object per line. [`ProcessWorker`] wraps one such process behind
//! the [`WorkerChannel`](crate::traits::WorkerChannel) trait; the orchestrator
//! obtains them through [`ProcessLauncher`].
//!
//! # Example
//!
//! ```ignore
//! use canary_core::worker::ProcessWorkerBuilder;
//!
//! let mut worker = ProcessWorkerBuilder::new("content_signature_test.js")
//!     .program("xpcshell")
//!     .script("tests/content_signature_test.js")
//!     .profile(profile_dir)
//!     .build()?;
//!
//! worker.spawn().await?;
//! worker.send(&Command::new(Mode::GetWorkerInfo).with_id(1)).await?;
//! worker.terminate().await?;
//! ```

mod builder;
mod launcher;
mod process;
mod state;

pub use builder::{ProcessWorkerBuilder, PROFILE_ENV, PROFILE_PLACEHOLDER, SCRIPT_PLACEHOLDER};
pub use launcher::ProcessLauncher;
pub use process::ProcessWorker;
pub use state::WorkerState;
