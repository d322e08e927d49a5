//! Builder pattern for Orchestrator construction

use std::sync::Arc;

use crate::channel::ChannelConfig;
use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::traits::{ParamsSource, WorkerLauncher};

use super::executor::Orchestrator;

/// Builder for creating an Orchestrator with proper configuration
///
/// # Example
///
/// ```ignore
/// let orchestrator = OrchestratorBuilder::new()
///     .config(HarnessConfig::new("tests").with_test_glob("*_test.js"))
///     .launcher(Arc::new(ProcessLauncher::new("xpcshell")))
///     .params_source(Arc::new(SuiteParams::default()))
///     .build()?;
///
/// let report = orchestrator.discover_and_run().await?;
/// ```
pub struct OrchestratorBuilder {
    config: HarnessConfig,
    launcher: Option<Arc<dyn WorkerLauncher>>,
    params_source: Option<Arc<dyn ParamsSource>>,
    channel_config: ChannelConfig,
}

impl OrchestratorBuilder {
    /// Create a new orchestrator builder with default configuration
    pub fn new() -> Self {
        Self {
            config: HarnessConfig::default(),
            launcher: None,
            params_source: None,
            channel_config: ChannelConfig::default(),
        }
    }

    /// Set the full harness configuration
    pub fn config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the test glob
    pub fn test_glob(mut self, glob: impl Into<String>) -> Self {
        self.config.test_glob = glob.into();
        self
    }

    /// Set the worker launcher
    pub fn launcher(mut self, launcher: Arc<dyn WorkerLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Set the params source
    pub fn params_source(mut self, source: Arc<dyn ParamsSource>) -> Self {
        self.params_source = Some(source);
        self
    }

    /// Set the channel configuration
    pub fn channel_config(mut self, config: ChannelConfig) -> Self {
        self.channel_config = config;
        self
    }

    /// Build the orchestrator
    ///
    /// # Errors
    ///
    /// Returns an error if the launcher or params source is not set, or if
    /// configuration validation fails.
    pub fn build(self) -> HarnessResult<Orchestrator> {
        let launcher = self
            .launcher
            .ok_or_else(|| HarnessError::missing_config("launcher"))?;

        let params_source = self
            .params_source
            .ok_or_else(|| HarnessError::missing_config("params_source"))?;

        self.config
            .validate()
            .map_err(|e| HarnessError::config(e.to_string()))?;
        self.channel_config
            .validate()
            .map_err(|e| HarnessError::config(e.to_string()))?;

        Ok(Orchestrator::new(
            self.config,
            launcher,
            params_source,
            self.channel_config,
        ))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
