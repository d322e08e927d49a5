//! Test units: discovery, params and timeout budgets

use std::path::{Path, PathBuf};
use std::time::Duration;

use globset::Glob;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{HarnessError, HarnessResult};
use crate::message::{Command, Mode};
use crate::traits::ParamsSource;

/// Script name of the content signature test
pub const CONTENT_SIGNATURE_TEST: &str = "content_signature_test.js";

/// Script name of the add-on signature test
pub const ADDON_SIGNATURE_TEST: &str = "addon_signature_test.js";

/// Correlation id of the diagnostic `get_worker_info` command
pub const WORKER_INFO_ID: u64 = 1;

/// Correlation id of the `run_test` command
pub const RUN_TEST_ID: u64 = 2;

/// Signed fixture XPI the add-on test must accept
pub const DEFAULT_SIGNED_XPI: &str = "https://searchfox.org/mozilla-central/source/toolkit/mozapps/extensions/test/xpcshell/data/signing_checks/signed1.xpi";

/// Unsigned fixture XPI the add-on test must reject
pub const DEFAULT_UNSIGNED_XPI: &str = "https://searchfox.org/mozilla-central/source/toolkit/mozapps/extensions/test/xpcshell/data/signing_checks/unsigned.xpi";

/// Params and timeout budget derived for one unit
#[derive(Debug, Clone, PartialEq)]
pub struct UnitParams {
    /// `run_test` params, passed through verbatim
    pub params: Map<String, Value>,

    /// Upper bound on how long the unit's `run_test` may take
    pub timeout_budget: Duration,
}

impl UnitParams {
    /// No params, with the given budget
    pub fn empty(timeout_budget: Duration) -> Self {
        Self {
            params: Map::new(),
            timeout_budget,
        }
    }
}

/// One discovered test script plus everything needed to run it
#[derive(Debug, Clone, PartialEq)]
pub struct TestUnit {
    /// Script file name, used as the unit's identity
    pub name: String,

    /// Path to the script
    pub script: PathBuf,

    /// `run_test` params
    pub params: Map<String, Value>,

    /// Upper bound on how long `run_test` may take
    pub timeout_budget: Duration,
}

impl TestUnit {
    /// Build a unit for `script`, asking `source` for its params
    pub fn from_script(script: PathBuf, source: &dyn ParamsSource) -> Self {
        let name = script
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| script.display().to_string());
        let UnitParams {
            params,
            timeout_budget,
        } = source.params_for(&name);

        Self {
            name,
            script,
            params,
            timeout_budget,
        }
    }

    /// Diagnostic command issued before the test
    pub fn worker_info_command(&self) -> Command {
        Command::new(Mode::GetWorkerInfo).with_id(WORKER_INFO_ID)
    }

    /// The unit's `run_test` command
    pub fn run_test_command(&self) -> Command {
        Command::new(Mode::RunTest)
            .with_id(RUN_TEST_ID)
            .params(self.params.clone())
    }
}

/// Regular files directly inside `dir` whose file name matches `pattern`,
/// sorted by path
pub fn discover_scripts(dir: &Path, pattern: &str) -> HarnessResult<Vec<PathBuf>> {
    let matcher = Glob::new(pattern)
        .map_err(|e| HarnessError::config(format!("invalid test glob {pattern:?}: {e}")))?
        .compile_matcher();

    let mut scripts = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if path.file_name().is_some_and(|name| matcher.is_match(name)) {
            scripts.push(path);
        }
    }
    scripts.sort();

    tracing::debug!(dir = %dir.display(), pattern, found = scripts.len(), "Discovered test scripts");
    Ok(scripts)
}

/// Discover scripts and derive a unit for each
pub fn discover_units(
    dir: &Path,
    pattern: &str,
    source: &dyn ParamsSource,
) -> HarnessResult<Vec<TestUnit>> {
    Ok(discover_scripts(dir, pattern)?
        .into_iter()
        .map(|script| TestUnit::from_script(script, source))
        .collect())
}

// ============================================================================
// Suite params
// ============================================================================

/// Params for the signature tests shipped with the canary
///
/// Values come from the environment/CLI. Missing values are left out of the
/// params; the worker reports the resulting failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteParams {
    /// Comma-separated `bucket/collection` list for the content signature test
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<String>,

    /// Settings environment for the content signature test (e.g. `prod`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_env: Option<String>,

    /// Add-on signing environment (`prod` or `stage`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addon_env: Option<String>,

    /// Comma-separated XPI URLs for the add-on test
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xpi_urls: Option<String>,

    /// Signed fixture XPI
    pub signed_xpi: String,

    /// Unsigned fixture XPI
    pub unsigned_xpi: String,

    /// Budget per content signature collection
    pub per_target_timeout: Duration,

    /// Budget for every other unit
    pub default_timeout: Duration,
}

impl Default for SuiteParams {
    fn default() -> Self {
        Self {
            collections: None,
            content_env: None,
            addon_env: None,
            xpi_urls: None,
            signed_xpi: DEFAULT_SIGNED_XPI.to_string(),
            unsigned_xpi: DEFAULT_UNSIGNED_XPI.to_string(),
            per_target_timeout: Duration::from_secs(5),
            default_timeout: Duration::from_secs(5),
        }
    }
}

impl SuiteParams {
    /// Set the content signature collections
    pub fn with_collections(mut self, collections: impl Into<String>) -> Self {
        self.collections = Some(collections.into());
        self
    }

    /// Set the content signature environment
    pub fn with_content_env(mut self, env: impl Into<String>) -> Self {
        self.content_env = Some(env.into());
        self
    }

    /// Set the add-on environment
    pub fn with_addon_env(mut self, env: impl Into<String>) -> Self {
        self.addon_env = Some(env.into());
        self
    }

    /// Set the add-on XPI URLs
    pub fn with_xpi_urls(mut self, urls: impl Into<String>) -> Self {
        self.xpi_urls = Some(urls.into());
        self
    }

    /// Set the per-target budget
    pub fn with_per_target_timeout(mut self, timeout: Duration) -> Self {
        self.per_target_timeout = timeout;
        self
    }

    /// Set the default budget
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    fn content_signature(&self) -> UnitParams {
        let mut params = Map::new();
        insert_some(&mut params, "collections", &self.collections);
        insert_some(&mut params, "env", &self.content_env);

        let targets = self
            .collections
            .as_deref()
            .map(|c| c.split(',').count())
            .unwrap_or(1) as u32;

        UnitParams {
            params,
            timeout_budget: self.per_target_timeout * targets,
        }
    }

    fn addon_signature(&self) -> UnitParams {
        let mut params = Map::new();
        params.insert("signed_XPI".into(), Value::String(self.signed_xpi.clone()));
        params.insert(
            "unsigned_XPI".into(),
            Value::String(self.unsigned_xpi.clone()),
        );
        insert_some(&mut params, "env", &self.addon_env);
        insert_some(&mut params, "xpi_urls", &self.xpi_urls);

        UnitParams {
            params,
            timeout_budget: self.per_target_timeout,
        }
    }
}

impl ParamsSource for SuiteParams {
    fn name(&self) -> &str {
        "suite"
    }

    fn params_for(&self, unit_name: &str) -> UnitParams {
        match unit_name {
            CONTENT_SIGNATURE_TEST => self.content_signature(),
            ADDON_SIGNATURE_TEST => self.addon_signature(),
            _ => UnitParams::empty(self.default_timeout),
        }
    }
}

fn insert_some(params: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        params.insert(key.to_string(), Value::String(value.clone()));
    }
}
