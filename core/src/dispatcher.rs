//! Call/return semantics over a fire-and-forget worker channel
//!
//! [`SyncDispatcher::sync_send`] writes one command, then polls the channel
//! on a fixed interval until the definitive reply arrives or the deadline
//! passes. Every empty poll sends a `wakeup` probe, so a worker that died is
//! noticed through the rejected write instead of at the deadline.
//!
//! # Example
//!
//! ```ignore
//! let dispatcher = SyncDispatcher::new(ChannelConfig::default());
//! let info = dispatcher
//!     .sync_send(&mut worker, &Command::new(Mode::GetWorkerInfo).with_id(1))
//!     .await?;
//! ```

use std::time::Duration;

use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};

use crate::channel::ChannelConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::message::{Command, Response};
use crate::traits::{Drain, WorkerChannel};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Counters for one `sync_send` call
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    /// Drain passes
    pub polls: usize,
    /// Keep-alive ACKs discarded
    pub acks: usize,
    /// Non-ACK replies that did not answer the command
    pub dropped: usize,
    /// `wakeup` probes sent
    pub probes: usize,
}

/// Turns a command into a blocking request/response exchange
#[derive(Debug, Clone, Default)]
pub struct SyncDispatcher {
    config: ChannelConfig,
}

impl SyncDispatcher {
    /// Create a dispatcher with the given timing
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }

    /// Timing in use
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Send `command` and wait up to the configured reply timeout
    pub async fn sync_send<C>(&self, channel: &mut C, command: &Command) -> HarnessResult<Response>
    where
        C: WorkerChannel + ?Sized,
    {
        self.sync_send_with_timeout(channel, command, self.config.reply_timeout)
            .await
    }

    /// Send `command` and wait up to `timeout` for its definitive reply
    ///
    /// # Errors
    /// - `Transport` if the command itself is rejected; nothing is awaited.
    /// - `Timeout` if the deadline passes, or early with `channel_closed` set
    ///   when a keep-alive probe is rejected.
    pub async fn sync_send_with_timeout<C>(
        &self,
        channel: &mut C,
        command: &Command,
        timeout: Duration,
    ) -> HarnessResult<Response>
    where
        C: WorkerChannel + ?Sized,
    {
        channel.send(command).await?;

        let started = Instant::now();
        let expiry = sleep_until(started + timeout + self.config.deadline_slack);
        tokio::pin!(expiry);

        let mut ticker = interval(self.config.poll_interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut stats = DispatchStats::default();
        let probe = Command::wakeup();

        let outcome = loop {
            tokio::select! {
                biased;

                _ = &mut expiry => {
                    break Err(HarnessError::Timeout {
                        mode: command.mode().clone(),
                        elapsed: started.elapsed(),
                        channel_closed: false,
                    });
                }

                _ = ticker.tick() => {
                    stats.polls += 1;
                    if let Some(reply) = take_reply(channel, command, &mut stats) {
                        break Ok(reply);
                    }

                    if let Err(e) = channel.send(&probe).await {
                        tracing::debug!(
                            worker = %channel.name(),
                            mode = %command.mode(),
                            error = %e,
                            "Keep-alive probe rejected"
                        );
                        break Err(HarnessError::Timeout {
                            mode: command.mode().clone(),
                            elapsed: started.elapsed(),
                            channel_closed: true,
                        });
                    }
                    stats.probes += 1;
                }
            }
        };

        tracing::debug!(
            worker = %channel.name(),
            mode = %command.mode(),
            id = ?command.id(),
            ok = outcome.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            polls = stats.polls,
            acks = stats.acks,
            dropped = stats.dropped,
            probes = stats.probes,
            "Dispatch finished"
        );

        outcome
    }
}

/// Pull responses until one answers `command`; later ones stay queued
fn take_reply<C>(channel: &mut C, command: &Command, stats: &mut DispatchStats) -> Option<Response>
where
    C: WorkerChannel + ?Sized,
{
    for response in Drain::new(channel) {
        if response.answers(command) {
            return Some(response);
        }
        if response.is_ack() {
            stats.acks += 1;
            tracing::trace!(original = ?response.original_mode(), "ACK");
        } else {
            stats.dropped += 1;
            tracing::debug!(
                expected = %command.mode(),
                original_mode = ?response.original_mode(),
                original_id = ?response.original_id(),
                "Dropping reply to another command"
            );
        }
    }
    None
}
