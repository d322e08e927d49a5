//! Launches real worker processes for test units

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use crate::channel::ChannelConfig;
use crate::error::HarnessResult;
use crate::traits::{WorkerChannel, WorkerLauncher};
use crate::unit::TestUnit;

use super::builder::{ProcessWorkerBuilder, SCRIPT_PLACEHOLDER};

/// [`WorkerLauncher`] that starts one `ProcessWorker` per unit
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    arg_template: Vec<String>,
    envs: Vec<(String, String)>,
    terminate_grace: Duration,
}

impl ProcessLauncher {
    /// Launcher running `program` with the script as its only argument
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            arg_template: vec![SCRIPT_PLACEHOLDER.to_string()],
            envs: Vec::new(),
            terminate_grace: ChannelConfig::default().terminate_grace,
        }
    }

    /// Set the argument template (`{script}` and `{profile}` are substituted)
    pub fn with_arg_template(mut self, template: Vec<String>) -> Self {
        self.arg_template = template;
        self
    }

    /// Add an environment variable passed to every worker
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Set the termination grace period
    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn name(&self) -> &str {
        "process"
    }

    fn launch(&self, unit: &TestUnit, profile: TempDir) -> HarnessResult<Box<dyn WorkerChannel>> {
        let mut builder = ProcessWorkerBuilder::new(unit.name.clone())
            .program(self.program.clone())
            .arg_template(self.arg_template.iter().cloned())
            .script(unit.script.clone())
            .profile(profile)
            .terminate_grace(self.terminate_grace);

        for (key, value) in &self.envs {
            builder = builder.env(key.clone(), value.clone());
        }

        Ok(Box::new(builder.build()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launcher_defaults_follow_channel_config() {
        let launcher = ProcessLauncher::new("xpcshell");
        assert_eq!(launcher.arg_template, vec![SCRIPT_PLACEHOLDER.to_string()]);
        assert_eq!(
            launcher.terminate_grace,
            ChannelConfig::default().terminate_grace
        );
    }
}
