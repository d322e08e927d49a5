//! Builder pattern for ProcessWorker construction

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use crate::channel::ChannelConfig;
use crate::error::{HarnessError, HarnessResult};

use super::process::ProcessWorker;

/// Placeholder replaced by the absolute script path
pub const SCRIPT_PLACEHOLDER: &str = "{script}";

/// Placeholder replaced by the profile directory
pub const PROFILE_PLACEHOLDER: &str = "{profile}";

/// Environment variable carrying the profile directory to the worker
pub const PROFILE_ENV: &str = "XPCSHELL_TEST_PROFILE_DIR";

/// Builder for creating ProcessWorker instances
///
/// # Example
/// ```ignore
/// let worker = ProcessWorkerBuilder::new("content_signature_test.js")
///     .program("/opt/firefox/xpcshell")
///     .arg_template(["-g", "/opt/firefox", "-f", "worker_common.js", "{script}"])
///     .script("tests/content_signature_test.js")
///     .profile(profile_dir)
///     .build()?;
/// ```
pub struct ProcessWorkerBuilder {
    name: String,
    program: Option<PathBuf>,
    arg_template: Vec<String>,
    script: Option<PathBuf>,
    profile: Option<TempDir>,
    envs: Vec<(String, String)>,
    terminate_grace: Duration,
}

impl ProcessWorkerBuilder {
    /// Create a new builder; `name` labels the worker in logs
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: None,
            arg_template: vec![SCRIPT_PLACEHOLDER.to_string()],
            script: None,
            profile: None,
            envs: Vec::new(),
            terminate_grace: ChannelConfig::default().terminate_grace,
        }
    }

    /// Set the executable
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Set the argument template
    pub fn arg_template<I, S>(mut self, template: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arg_template = template.into_iter().map(Into::into).collect();
        self
    }

    /// Set the test script
    pub fn script(mut self, script: impl Into<PathBuf>) -> Self {
        self.script = Some(script.into());
        self
    }

    /// Hand over the scratch profile directory
    pub fn profile(mut self, profile: TempDir) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Add an environment variable for the child
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Set the termination grace period
    pub fn terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    /// Build the ProcessWorker
    ///
    /// # Errors
    /// Returns an error if program, script or profile is missing, or if the
    /// script path cannot be resolved.
    pub fn build(self) -> HarnessResult<ProcessWorker> {
        let program = self.program.ok_or(HarnessError::missing_config("program"))?;
        let script = self.script.ok_or(HarnessError::missing_config("script"))?;
        let profile = self.profile.ok_or(HarnessError::missing_config("profile"))?;

        let script = absolute(&script)?;
        let script_arg = script.display().to_string();
        let profile_arg = profile.path().display().to_string();

        let args = self
            .arg_template
            .iter()
            .map(|arg| {
                arg.replace(SCRIPT_PLACEHOLDER, &script_arg)
                    .replace(PROFILE_PLACEHOLDER, &profile_arg)
            })
            .collect();

        let mut envs = self.envs;
        envs.push((PROFILE_ENV.to_string(), profile_arg));

        Ok(ProcessWorker::new(
            self.name,
            program,
            args,
            envs,
            self.terminate_grace,
            Some(profile),
        ))
    }
}

fn absolute(path: &Path) -> HarnessResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
