//! Command and response types exchanged with a worker
//!
//! Both travel as one JSON object per line. A command looks like
//! `{"mode": "run_test", "id": 2, "args": {...}}`; the worker answers with an
//! object carrying `result`, `success` and an echo of the command under
//! `original_cmd`. While busy it may also answer with `result: "ACK"`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::HarnessResult;

/// Result value a worker uses for keep-alive acknowledgments
pub const ACK_SENTINEL: &str = "ACK";

/// Command mode, naming the handler the worker invokes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Mode {
    /// Extended diagnostic info about the worker and its preferences
    GetWorkerInfo,
    /// Run the test script's registered `run_test` handler
    RunTest,
    /// Keep-alive probe; the worker answers with an ACK only
    Wakeup,
    /// Any mode this harness does not issue itself
    Other(String),
}

impl Mode {
    /// Wire name of the mode
    pub fn as_str(&self) -> &str {
        match self {
            Mode::GetWorkerInfo => "get_worker_info",
            Mode::RunTest => "run_test",
            Mode::Wakeup => "wakeup",
            Mode::Other(name) => name,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Mode {
    fn from(name: String) -> Self {
        match name.as_str() {
            "get_worker_info" => Mode::GetWorkerInfo,
            "run_test" => Mode::RunTest,
            "wakeup" => Mode::Wakeup,
            _ => Mode::Other(name),
        }
    }
}

impl From<&str> for Mode {
    fn from(name: &str) -> Self {
        Mode::from(name.to_string())
    }
}

impl From<Mode> for String {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

/// A request sent to a worker
///
/// The mode is fixed at construction. Params are passed through to the
/// worker untouched; nothing here checks them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    mode: Mode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<u64>,

    #[serde(default, rename = "args")]
    params: Map<String, Value>,
}

impl Command {
    /// Create a command without id or params
    pub fn new(mode: impl Into<Mode>) -> Self {
        Self {
            mode: mode.into(),
            id: None,
            params: Map::new(),
        }
    }

    /// Keep-alive probe
    pub fn wakeup() -> Self {
        Self::new(Mode::Wakeup)
    }

    /// Set the correlation id
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Add a single param
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add every entry of `params`, replacing keys already present
    pub fn params(mut self, params: Map<String, Value>) -> Self {
        self.params.extend(params);
        self
    }

    /// Command mode
    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// Correlation id, if any
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// Mode-specific params
    pub fn get_params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Canonical mapping form, used on the wire and for correlation
    pub fn as_dict(&self) -> Value {
        let mut map = Map::new();
        map.insert("mode".into(), Value::String(self.mode.to_string()));
        if let Some(id) = self.id {
            map.insert("id".into(), Value::from(id));
        }
        map.insert("args".into(), Value::Object(self.params.clone()));
        Value::Object(map)
    }

    /// Encode as a single newline-terminated JSON line
    pub fn to_line(&self) -> HarnessResult<String> {
        let mut line = serde_json::to_string(&self.as_dict())?;
        line.push('\n');
        Ok(line)
    }
}

/// A reply from a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id the worker assigned to the reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// Worker instance identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<u64>,

    /// Mapping form of the command this reply answers
    pub original_cmd: Map<String, Value>,

    /// Outcome of a `run_test` command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,

    /// `"ACK"` or the handler's result payload
    pub result: Value,

    /// Worker clock when the command was received (ms since epoch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_time: Option<i64>,

    /// Worker clock when the reply was sent (ms since epoch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<i64>,
}

impl Response {
    /// Decode one line received from a worker
    pub fn from_line(line: &str) -> HarnessResult<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }

    /// Whether this is a keep-alive acknowledgment
    pub fn is_ack(&self) -> bool {
        self.result.as_str() == Some(ACK_SENTINEL)
    }

    /// Mode of the echoed command
    pub fn original_mode(&self) -> Option<Mode> {
        self.original_cmd
            .get("mode")
            .and_then(Value::as_str)
            .map(Mode::from)
    }

    /// Id of the echoed command
    pub fn original_id(&self) -> Option<u64> {
        self.original_cmd.get("id").and_then(Value::as_u64)
    }

    /// Whether this is the definitive reply to `command`
    ///
    /// Matches on mode, and on id as well when both sides carry one. Two
    /// outstanding commands of the same mode without ids cannot be told
    /// apart.
    pub fn answers(&self, command: &Command) -> bool {
        if self.is_ack() || self.original_mode().as_ref() != Some(command.mode()) {
            return false;
        }
        match (command.id(), self.original_id()) {
            (Some(sent), Some(echoed)) => sent == echoed,
            _ => true,
        }
    }

    /// `success` as reported, absent counting as failure
    pub fn is_success(&self) -> bool {
        self.success == Some(true)
    }

    /// Flattened mapping for logging and inspection
    pub fn as_dict(&self) -> Value {
        let mut map = Map::new();
        map.insert("result".into(), self.result.clone());
        map.insert(
            "success".into(),
            self.success.map(Value::Bool).unwrap_or(Value::Null),
        );
        map.insert(
            "original_cmd".into(),
            Value::Object(self.original_cmd.clone()),
        );
        if let Some(id) = self.id {
            map.insert("id".into(), Value::from(id));
        }
        if let Some(worker_id) = self.worker_id {
            map.insert("worker_id".into(), Value::from(worker_id));
        }
        if let Some(t) = self.command_time {
            map.insert("command_time".into(), Value::from(t));
        }
        if let Some(t) = self.response_time {
            map.insert("response_time".into(), Value::from(t));
        }
        Value::Object(map)
    }

    /// Worker-side processing time, when both timestamps are present
    pub fn worker_latency_ms(&self) -> Option<i64> {
        Some(self.response_time? - self.command_time?)
    }

    /// Top-level `result.messages` lines
    pub fn messages(&self) -> Vec<String> {
        string_list(self.result.get("messages"))
    }

    /// Per-sub-test records in the result payload
    ///
    /// Content signature results come as `results[]` with `verified` and
    /// `messages`; add-on results come as `result_details[]` with `result`
    /// and `url`.
    pub fn sub_results(&self) -> Vec<SubResult> {
        let mut out = Vec::new();

        if let Some(results) = self.result.get("results").and_then(Value::as_array) {
            for (idx, entry) in results.iter().enumerate() {
                out.push(SubResult {
                    label: entry
                        .get("collection")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("results[{idx}]")),
                    passed: entry.get("verified").and_then(Value::as_bool) == Some(true),
                    messages: string_list(entry.get("messages")),
                });
            }
        }

        if let Some(details) = self
            .result
            .get("result_details")
            .and_then(Value::as_array)
        {
            for (idx, entry) in details.iter().enumerate() {
                out.push(SubResult {
                    label: entry
                        .get("url")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("result_details[{idx}]")),
                    passed: entry.get("result").and_then(Value::as_bool) == Some(true),
                    messages: Vec::new(),
                });
            }
        }

        out
    }
}

/// One sub-test record from a `run_test` result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubResult {
    /// Collection, URL, or position of the record
    pub label: String,
    /// Whether this sub-test verified
    pub passed: bool,
    /// Message lines the worker attached
    pub messages: Vec<String>,
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect()
        })
        .unwrap_or_default()
}
