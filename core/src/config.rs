//! Harness configuration types

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the suite lives and how a run is bounded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Directory holding the test scripts
    pub tests_dir: PathBuf,

    /// Glob selecting test scripts by file name
    pub test_glob: String,

    /// Parent directory for the scratch root (system temp dir if unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,

    /// Extra wall-clock allowance past a unit's budget before the worker is
    /// forcibly terminated
    pub run_grace: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            tests_dir: PathBuf::from("tests"),
            test_glob: "*_test.js".to_string(),
            scratch_dir: None,
            run_grace: Duration::from_secs(1),
        }
    }
}

impl HarnessConfig {
    /// Config for the scripts in `tests_dir`
    pub fn new(tests_dir: impl Into<PathBuf>) -> Self {
        Self {
            tests_dir: tests_dir.into(),
            ..Default::default()
        }
    }

    /// Set the test glob
    pub fn with_test_glob(mut self, glob: impl Into<String>) -> Self {
        self.test_glob = glob.into();
        self
    }

    /// Set the scratch parent directory
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Set the run grace
    pub fn with_run_grace(mut self, grace: Duration) -> Self {
        self.run_grace = grace;
        self
    }

    /// Validate the configuration
    ///
    /// Only checks what can be known up front; a missing tests directory is
    /// reported by discovery.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.test_glob.trim().is_empty() {
            return Err(ConfigError::InvalidGlob("test glob is empty".into()));
        }
        if let Err(e) = globset::Glob::new(&self.test_glob) {
            return Err(ConfigError::InvalidGlob(format!("{}: {e}", self.test_glob)));
        }

        if self.tests_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidTestsDir("tests dir is empty".into()));
        }

        if let Some(dir) = &self.scratch_dir {
            if dir.exists() && !dir.is_dir() {
                return Err(ConfigError::InvalidScratchDir(format!(
                    "{} is not a directory",
                    dir.display()
                )));
            }
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid test glob
    #[error("Invalid test glob: {0}")]
    InvalidGlob(String),

    /// Invalid tests directory
    #[error("Invalid tests directory: {0}")]
    InvalidTestsDir(String),

    /// Invalid scratch directory
    #[error("Invalid scratch directory: {0}")]
    InvalidScratchDir(String),

    /// Invalid timeout or interval
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();
        assert_eq!(config.tests_dir, PathBuf::from("tests"));
        assert_eq!(config.test_glob, "*_test.js");
        assert!(config.scratch_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder_pattern() {
        let config = HarnessConfig::new("/srv/canary/tests")
            .with_test_glob("content_*.js")
            .with_scratch_dir("/var/tmp")
            .with_run_grace(Duration::from_secs(3));

        assert_eq!(config.tests_dir, PathBuf::from("/srv/canary/tests"));
        assert_eq!(config.test_glob, "content_*.js");
        assert_eq!(config.scratch_dir, Some(PathBuf::from("/var/tmp")));
        assert_eq!(config.run_grace, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_glob() {
        let config = HarnessConfig::default().with_test_glob("[broken");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidGlob(_))));

        let config = HarnessConfig::default().with_test_glob("  ");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidGlob(_))));
    }

    #[test]
    fn test_empty_tests_dir() {
        let config = HarnessConfig::new("");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTestsDir(_))
        ));
    }

    #[test]
    fn test_scratch_dir_must_be_directory() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = HarnessConfig::default().with_scratch_dir(file.path());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidScratchDir(_))
        ));
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = HarnessConfig::new("tests").with_test_glob("*.js");
        let json = serde_json::to_string(&config).unwrap();
        let back: HarnessConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.test_glob, "*.js");
        assert!(back.scratch_dir.is_none());
    }
}
