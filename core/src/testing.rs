//! In-memory worker fakes for dispatcher and orchestrator tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tempfile::TempDir;

use crate::error::{HarnessError, HarnessResult};
use crate::message::{Command, Mode, Response, ACK_SENTINEL};
use crate::traits::{WorkerChannel, WorkerLauncher};
use crate::unit::TestUnit;
use crate::worker::WorkerState;

/// ACK for `mode`
pub(crate) fn ack(mode: Mode) -> Response {
    Response {
        id: None,
        worker_id: Some(1),
        original_cmd: original_cmd(mode, None),
        success: None,
        result: Value::String(ACK_SENTINEL.to_string()),
        command_time: None,
        response_time: None,
    }
}

/// Definitive reply to `mode`, echoing `id` when given
pub(crate) fn reply(mode: Mode, id: Option<u64>, success: bool) -> Response {
    Response {
        id,
        worker_id: Some(1),
        original_cmd: original_cmd(mode.clone(), id),
        success: Some(success),
        result: json!({ "origin": mode.as_str(), "messages": [] }),
        command_time: Some(1_000),
        response_time: Some(1_250),
    }
}

fn original_cmd(mode: Mode, id: Option<u64>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("mode".into(), Value::String(mode.as_str().to_string()));
    if let Some(id) = id {
        map.insert("id".into(), Value::from(id));
    }
    map
}

/// What happened to a [`ScriptedChannel`], shared with the test
#[derive(Debug, Default)]
pub(crate) struct ChannelLog {
    spawns: AtomicUsize,
    terminations: AtomicUsize,
    sent: Mutex<Vec<Command>>,
}

impl ChannelLog {
    pub(crate) fn spawns(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    pub(crate) fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    pub(crate) fn sent(&self) -> Vec<Command> {
        self.sent.lock().unwrap().clone()
    }

    /// Modes sent, probes excluded
    pub(crate) fn sent_modes(&self) -> Vec<Mode> {
        self.sent()
            .into_iter()
            .map(|c| c.mode().clone())
            .filter(|m| *m != Mode::Wakeup)
            .collect()
    }

    pub(crate) fn probes(&self) -> usize {
        self.sent()
            .iter()
            .filter(|c| *c.mode() == Mode::Wakeup)
            .count()
    }
}

/// Worker fake that answers from a script
///
/// Each non-probe send of a mode releases that mode's next batch of scripted
/// responses into the inbox. Probes are answered with an ACK unless
/// [`ScriptedChannel::silent_probes`] is set.
#[derive(Debug)]
pub(crate) struct ScriptedChannel {
    name: String,
    state: WorkerState,
    inbox: VecDeque<Response>,
    batches: HashMap<String, VecDeque<Vec<Response>>>,
    ack_probes: bool,
    accept_sends: Option<usize>,
    hang_on: Option<Mode>,
    fail_spawn: bool,
    log: Arc<ChannelLog>,
}

impl ScriptedChannel {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: WorkerState::Unspawned,
            inbox: VecDeque::new(),
            batches: HashMap::new(),
            ack_probes: true,
            accept_sends: None,
            hang_on: None,
            fail_spawn: false,
            log: Arc::new(ChannelLog::default()),
        }
    }

    /// Already spawned, for dispatcher tests
    pub(crate) fn running(name: impl Into<String>) -> Self {
        let mut channel = Self::new(name);
        channel.state = WorkerState::Running;
        channel
    }

    /// Queue `responses` to be released by the next send of `mode`
    pub(crate) fn on(mut self, mode: Mode, responses: Vec<Response>) -> Self {
        self.batches
            .entry(mode.as_str().to_string())
            .or_default()
            .push_back(responses);
        self
    }

    /// Put `response` in the inbox right away
    pub(crate) fn queued(mut self, response: Response) -> Self {
        self.inbox.push_back(response);
        self
    }

    pub(crate) fn silent_probes(mut self) -> Self {
        self.ack_probes = false;
        self
    }

    /// Reject every send after the first `n`
    pub(crate) fn accept_sends(mut self, n: usize) -> Self {
        self.accept_sends = Some(n);
        self
    }

    /// Record a send of `mode`, then never return from it
    pub(crate) fn hang_on(mut self, mode: Mode) -> Self {
        self.hang_on = Some(mode);
        self
    }

    pub(crate) fn failing_spawn(mut self) -> Self {
        self.fail_spawn = true;
        self
    }

    pub(crate) fn log(&self) -> Arc<ChannelLog> {
        Arc::clone(&self.log)
    }

    pub(crate) fn inbox_len(&self) -> usize {
        self.inbox.len()
    }
}

#[async_trait]
impl WorkerChannel for ScriptedChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> WorkerState {
        self.state
    }

    async fn spawn(&mut self) -> HarnessResult<()> {
        self.state.check_spawn()?;
        self.log.spawns.fetch_add(1, Ordering::SeqCst);
        if self.fail_spawn {
            self.state = WorkerState::Terminated;
            return Err(HarnessError::spawn("scripted spawn failure"));
        }
        self.state = WorkerState::Running;
        Ok(())
    }

    async fn send(&mut self, command: &Command) -> HarnessResult<()> {
        if !self.state.is_running() {
            return Err(HarnessError::transport(format!(
                "{} is {}",
                self.name, self.state
            )));
        }

        {
            let mut sent = self.log.sent.lock().unwrap();
            if let Some(limit) = self.accept_sends {
                if sent.len() >= limit {
                    return Err(HarnessError::transport(format!("{} exited", self.name)));
                }
            }
            sent.push(command.clone());
        }

        if self.hang_on.as_ref() == Some(command.mode()) {
            std::future::pending::<()>().await;
        }

        if *command.mode() == Mode::Wakeup {
            if self.ack_probes {
                self.inbox.push_back(ack(Mode::Wakeup));
            }
        } else if let Some(batch) = self
            .batches
            .get_mut(command.mode().as_str())
            .and_then(VecDeque::pop_front)
        {
            self.inbox.extend(batch);
        }
        Ok(())
    }

    fn try_receive(&mut self) -> Option<Response> {
        self.inbox.pop_front()
    }

    fn is_running(&mut self) -> bool {
        self.state.is_running()
    }

    async fn terminate(&mut self) -> HarnessResult<()> {
        self.log.terminations.fetch_add(1, Ordering::SeqCst);
        self.state = WorkerState::Terminated;
        Ok(())
    }
}

/// Hands out prepared [`ScriptedChannel`]s by unit name
#[derive(Debug, Default)]
pub(crate) struct ScriptedLauncher {
    channels: Mutex<HashMap<String, ScriptedChannel>>,
    profiles: Mutex<Vec<std::path::PathBuf>>,
}

impl ScriptedLauncher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_channel(self, unit: impl Into<String>, channel: ScriptedChannel) -> Self {
        self.channels.lock().unwrap().insert(unit.into(), channel);
        self
    }

    /// Profile directories handed to launched channels
    pub(crate) fn profiles(&self) -> Vec<std::path::PathBuf> {
        self.profiles.lock().unwrap().clone()
    }
}

impl WorkerLauncher for ScriptedLauncher {
    fn name(&self) -> &str {
        "scripted"
    }

    fn launch(&self, unit: &TestUnit, profile: TempDir) -> HarnessResult<Box<dyn WorkerChannel>> {
        self.profiles
            .lock()
            .unwrap()
            .push(profile.path().to_path_buf());
        let channel = self
            .channels
            .lock()
            .unwrap()
            .remove(&unit.name)
            .ok_or_else(|| HarnessError::config(format!("no scripted channel for {}", unit.name)))?;
        Ok(Box::new(channel))
    }
}
