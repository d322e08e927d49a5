//! Worker channel backed by an OS process speaking JSON lines

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{HarnessError, HarnessResult};
use crate::message::{Command, Response};
use crate::traits::WorkerChannel;

use super::state::WorkerState;

/// One worker process
///
/// Commands are written to the child's stdin, one JSON object per line. A
/// background task reads stdout line by line and queues every line that
/// parses as a [`Response`]; anything else the process prints is logged and
/// skipped.
pub struct ProcessWorker {
    /// Name used in logs
    name: String,

    /// Executable to run
    program: PathBuf,

    /// Fully substituted arguments
    args: Vec<String>,

    /// Extra environment for the child
    envs: Vec<(String, String)>,

    /// How long `terminate` waits for the killed child to be reaped
    terminate_grace: Duration,

    /// Scratch profile owned by this worker, removed on terminate
    profile: Option<TempDir>,

    state: WorkerState,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    responses: Option<mpsc::UnboundedReceiver<Response>>,
    reader: Option<JoinHandle<()>>,
}

impl ProcessWorker {
    /// Create an unspawned worker
    ///
    /// Use `ProcessWorkerBuilder` for template substitution and defaults.
    pub fn new(
        name: String,
        program: PathBuf,
        args: Vec<String>,
        envs: Vec<(String, String)>,
        terminate_grace: Duration,
        profile: Option<TempDir>,
    ) -> Self {
        Self {
            name,
            program,
            args,
            envs,
            terminate_grace,
            profile,
            state: WorkerState::Unspawned,
            child: None,
            stdin: None,
            responses: None,
            reader: None,
        }
    }

    /// Arguments the process is (or will be) started with
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// OS process id while running
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// How long `terminate` waits for the child to be reaped
    pub fn terminate_grace(&self) -> Duration {
        self.terminate_grace
    }

    /// Scratch profile directory, until terminated
    pub fn profile_path(&self) -> Option<PathBuf> {
        self.profile.as_ref().map(|p| p.path().to_path_buf())
    }
}

#[async_trait]
impl WorkerChannel for ProcessWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> WorkerState {
        self.state
    }

    async fn spawn(&mut self) -> HarnessResult<()> {
        self.state.check_spawn()?;

        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.state = WorkerState::Terminated;
                return Err(HarnessError::spawn(format!(
                    "{}: {e}",
                    self.program.display()
                )));
            }
        };

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                self.state = WorkerState::Terminated;
                let _ = child.start_kill();
                return Err(HarnessError::spawn("worker stdio was not captured"));
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        self.reader = Some(tokio::spawn(read_responses(self.name.clone(), stdout, tx)));

        tracing::debug!(
            worker = %self.name,
            pid = ?child.id(),
            program = %self.program.display(),
            args = ?self.args,
            "Worker spawned"
        );

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.responses = Some(rx);
        self.state = WorkerState::Running;
        Ok(())
    }

    async fn send(&mut self, command: &Command) -> HarnessResult<()> {
        if !self.is_running() {
            return Err(HarnessError::transport(format!(
                "worker {} is not running ({})",
                self.name, self.state
            )));
        }

        let line = command.to_line()?;
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| HarnessError::transport("worker stdin is closed"))?;

        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| HarnessError::transport(format!("write to {} failed: {e}", self.name)))?;
        stdin
            .flush()
            .await
            .map_err(|e| HarnessError::transport(format!("flush to {} failed: {e}", self.name)))?;

        tracing::trace!(worker = %self.name, mode = %command.mode(), id = ?command.id(), "Sent command");
        Ok(())
    }

    fn try_receive(&mut self) -> Option<Response> {
        self.responses.as_mut()?.try_recv().ok()
    }

    fn is_running(&mut self) -> bool {
        if !self.state.is_running() {
            return false;
        }
        match self.child.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                tracing::debug!(worker = %self.name, %status, "Worker exited");
                false
            }
            Some(Err(e)) => {
                tracing::warn!(worker = %self.name, error = %e, "Worker liveness check failed");
                false
            }
            None => false,
        }
    }

    async fn terminate(&mut self) -> HarnessResult<()> {
        if self.state.is_terminated() {
            return Ok(());
        }
        self.state = WorkerState::Terminated;

        // Closing stdin first lets a well-behaved worker see EOF
        self.stdin.take();

        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                tracing::debug!(worker = %self.name, error = %e, "Worker already gone");
            }
            match tokio::time::timeout(self.terminate_grace, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(worker = %self.name, %status, "Worker terminated");
                }
                Ok(Err(e)) => {
                    tracing::warn!(worker = %self.name, error = %e, "Failed to reap worker");
                }
                Err(_) => {
                    tracing::warn!(
                        worker = %self.name,
                        grace_ms = self.terminate_grace.as_millis() as u64,
                        "Worker not reaped within grace period"
                    );
                }
            }
        }

        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.responses.take();

        if let Some(profile) = self.profile.take() {
            let path = profile.path().display().to_string();
            if let Err(e) = profile.close() {
                tracing::warn!(worker = %self.name, profile = %path, error = %e, "Failed to remove profile");
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for ProcessWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessWorker")
            .field("name", &self.name)
            .field("program", &self.program)
            .field("args", &self.args)
            .field("state", &self.state)
            .field("pid", &self.pid())
            .finish()
    }
}

/// Forward parsed stdout lines until EOF or until the receiver goes away
///
/// Lines are split on raw bytes so that output which is not valid UTF-8 is
/// skipped like any other non-protocol line instead of ending the reader.
async fn read_responses(
    worker: String,
    stdout: ChildStdout,
    tx: mpsc::UnboundedSender<Response>,
) {
    let mut lines = BufReader::new(stdout).split(b'\n');
    loop {
        match lines.next_segment().await {
            Ok(Some(bytes)) => {
                let line = String::from_utf8_lossy(&bytes);
                if line.trim().is_empty() {
                    continue;
                }
                match Response::from_line(&line) {
                    Ok(response) => {
                        if tx.send(response).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(worker = %worker, error = %e, line = %line, "Skipping non-protocol output");
                    }
                }
            }
            Ok(None) => {
                tracing::debug!(worker = %worker, "Worker stdout closed");
                break;
            }
            Err(e) => {
                tracing::warn!(worker = %worker, error = %e, "Reading worker stdout failed");
                break;
            }
        }
    }
}
