//! Async driver for the poll state machine.
//!
//! `PolledLoader::spawn` starts a tokio task that owns the interval timer,
//! a `JoinSet` of in-flight checksum resolutions, and the machine itself.
//! The active snapshot is published through a `watch` channel; staleness
//! notices go to the caller's [`NoticeSink`]; poll failures are logged and
//! forwarded on an error channel. Teardown is a `CancellationToken`:
//! once cancelled, no retained state is mutated even if an in-flight
//! checksum resolves later.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::machine::{Effect, Input, PollMachine};
use crate::checksum::Checksum;
use crate::config::PollConfig;
use crate::errors::{ControllerError, SnapshotError};
use crate::notices::{Notice, NoticeAction, NoticeSink};
use crate::snapshot::Snapshot;

enum Command<S> {
    SetEnabled(bool),
    Accept,
    ReplaceLoader(S),
}

enum Resolution<S> {
    Loader {
        epoch: u64,
        result: Result<Checksum, SnapshotError>,
    },
    Poll {
        epoch: u64,
        seq: u64,
        resync: bool,
        result: Result<Checksum, SnapshotError>,
        snapshot: S,
    },
}

/// Handle to a running polling controller.
///
/// Dropping the handle cancels the background task. Must be spawned from
/// within a tokio runtime.
pub struct PolledLoader<S> {
    cmd_tx: mpsc::UnboundedSender<Command<S>>,
    watch_rx: watch::Receiver<Arc<S>>,
    error_rx: Option<mpsc::UnboundedReceiver<SnapshotError>>,
    cancel: CancellationToken,
}

impl<S: Snapshot> PolledLoader<S> {
    /// Start a controller around the given loader snapshot.
    ///
    /// `poll` performs one polling fetch and returns a new snapshot; the
    /// snapshot itself yields its checksum asynchronously. Fails fast on
    /// an invalid configuration.
    pub fn spawn<P, N>(
        initial: S,
        poll: P,
        config: PollConfig,
        sink: N,
    ) -> Result<Self, ControllerError>
    where
        P: FnMut() -> Result<S, SnapshotError> + Send + 'static,
        N: NoticeSink + 'static,
    {
        config.validate()?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (watch_tx, watch_rx) = watch::channel(Arc::new(initial));
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let machine = PollMachine::new(config.enabled, config.immediate_update);
        let task = Task {
            machine,
            poll,
            sink,
            cmd_tx: cmd_tx.clone(),
            cmd_rx,
            watch_tx,
            error_tx,
            cancel: cancel.clone(),
            inflight: JoinSet::new(),
            tentative: None,
            timer: make_interval(config.interval()),
            timer_armed: false,
            config,
        };
        tokio::spawn(task.run());

        Ok(Self {
            cmd_tx,
            watch_rx,
            error_rx: Some(error_rx),
            cancel,
        })
    }

    /// Subscribe to the active snapshot. The receiver sees every swap.
    pub fn subscribe(&self) -> watch::Receiver<Arc<S>> {
        self.watch_rx.clone()
    }

    /// The snapshot currently on display.
    pub fn current(&self) -> Arc<S> {
        self.watch_rx.borrow().clone()
    }

    /// Flip the master switch. Re-enabling forces one immediate re-sync
    /// poll before the timer cadence resumes.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), ControllerError> {
        self.send(Command::SetEnabled(enabled))
    }

    /// Accept the pending snapshot, as the notice action would.
    pub fn accept_pending(&self) -> Result<(), ControllerError> {
        self.send(Command::Accept)
    }

    /// Replace the loader snapshot (the route data changed identity).
    ///
    /// The checksum pair is torn down and rebuilt; in-flight resolutions
    /// and staleness notices about the old data become moot.
    pub fn replace_loader(&self, snapshot: S) -> Result<(), ControllerError> {
        self.send(Command::ReplaceLoader(snapshot))
    }

    /// Take the receiver for poll and checksum failures. Each failure is
    /// also logged; the next scheduled tick is the only retry.
    pub fn take_error_rx(&mut self) -> Option<mpsc::UnboundedReceiver<SnapshotError>> {
        self.error_rx.take()
    }

    /// Stop the controller. Idempotent; also happens on drop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn send(&self, cmd: Command<S>) -> Result<(), ControllerError> {
        self.cmd_tx.send(cmd).map_err(|_| ControllerError::Stopped)
    }
}

impl<S> Drop for PolledLoader<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn make_interval(period: std::time::Duration) -> time::Interval {
    // First tick one full interval from now, not immediately
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

enum Wake<S> {
    Cancelled,
    Tick,
    Command(Option<Command<S>>),
    Resolved(Option<Result<Resolution<S>, tokio::task::JoinError>>),
}

struct Task<S, P, N> {
    machine: PollMachine,
    poll: P,
    sink: N,
    /// Kept so notice actions can send `Accept` back into the loop.
    cmd_tx: mpsc::UnboundedSender<Command<S>>,
    cmd_rx: mpsc::UnboundedReceiver<Command<S>>,
    watch_tx: watch::Sender<Arc<S>>,
    error_tx: mpsc::UnboundedSender<SnapshotError>,
    cancel: CancellationToken,
    inflight: JoinSet<Resolution<S>>,
    /// Most recent poll result awaiting promotion, keyed by its seq.
    tentative: Option<(u64, S)>,
    timer: time::Interval,
    timer_armed: bool,
    config: PollConfig,
}

impl<S, P, N> Task<S, P, N>
where
    S: Snapshot,
    P: FnMut() -> Result<S, SnapshotError> + Send + 'static,
    N: NoticeSink + 'static,
{
    async fn run(mut self) {
        info!(
            event = "core.poll.started",
            interval_ms = self.config.interval_ms,
            immediate_update = self.config.immediate_update,
            enabled = self.config.enabled,
        );

        let effects = self.machine.apply(Input::Reset);
        self.handle_effects(effects);

        loop {
            let wake = tokio::select! {
                _ = self.cancel.cancelled() => Wake::Cancelled,
                _ = self.timer.tick(), if self.timer_armed => Wake::Tick,
                cmd = self.cmd_rx.recv() => Wake::Command(cmd),
                resolved = self.inflight.join_next(), if !self.inflight.is_empty() => {
                    Wake::Resolved(resolved)
                }
            };

            match wake {
                Wake::Cancelled => {
                    info!(event = "core.poll.stopped");
                    break;
                }
                Wake::Tick => {
                    let effects = self.machine.apply(Input::Tick);
                    self.handle_effects(effects);
                }
                Wake::Command(Some(cmd)) => self.handle_command(cmd),
                // The task holds its own sender, so the channel can only
                // close during teardown
                Wake::Command(None) => break,
                Wake::Resolved(Some(Ok(resolution))) => self.handle_resolution(resolution),
                Wake::Resolved(Some(Err(e))) => {
                    if e.is_panic() {
                        warn!(event = "core.poll.resolution_panicked", error = %e);
                    }
                }
                Wake::Resolved(None) => {}
            }
        }
    }

    fn handle_command(&mut self, cmd: Command<S>) {
        match cmd {
            Command::SetEnabled(enabled) => {
                debug!(event = "core.poll.set_enabled", enabled = enabled);
                let effects = self.machine.apply(Input::SetEnabled(enabled));
                self.handle_effects(effects);
            }
            Command::Accept => {
                let effects = self.machine.apply(Input::Accept);
                self.handle_effects(effects);
            }
            Command::ReplaceLoader(snapshot) => {
                debug!(event = "core.poll.loader_replaced");
                self.tentative = None;
                self.watch_tx.send_replace(Arc::new(snapshot));
                let effects = self.machine.apply(Input::Reset);
                self.handle_effects(effects);
            }
        }
    }

    fn handle_resolution(&mut self, resolution: Resolution<S>) {
        match resolution {
            Resolution::Loader { epoch, result } => match result {
                Ok(checksum) => {
                    let effects = self.machine.apply(Input::LoaderResolved { epoch, checksum });
                    self.handle_effects(effects);
                }
                Err(e) => self.report_error("loader", e),
            },
            Resolution::Poll {
                epoch,
                seq,
                resync,
                result,
                snapshot,
            } => match result {
                Ok(checksum) => {
                    // Stash the snapshot before the machine decides, so a
                    // promote effect can use it. Only the newest initiated
                    // poll counts, matching the machine's own guard.
                    if epoch == self.machine.epoch() && seq == self.machine.seq() {
                        self.tentative = Some((seq, snapshot));
                    }
                    let input = if resync {
                        Input::ResyncResolved {
                            epoch,
                            seq,
                            checksum,
                        }
                    } else {
                        Input::PollResolved {
                            epoch,
                            seq,
                            checksum,
                        }
                    };
                    let effects = self.machine.apply(input);
                    self.handle_effects(effects);
                }
                Err(e) => self.report_error(if resync { "resync" } else { "poll" }, e),
            },
        }
    }

    fn handle_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::ResolveLoader { epoch } => {
                    let snapshot = Arc::clone(&self.watch_tx.borrow());
                    self.inflight.spawn(async move {
                        let result = snapshot.checksum().await;
                        Resolution::Loader { epoch, result }
                    });
                }
                Effect::StartPoll { epoch, seq } => self.start_poll(epoch, seq, false),
                Effect::StartResync { epoch, seq } => self.start_poll(epoch, seq, true),
                Effect::PromoteSnapshot => self.promote(),
                Effect::RaiseNotice => self.raise_notice(),
                Effect::ArmTimer => {
                    self.timer = make_interval(self.config.interval());
                    self.timer_armed = true;
                }
                Effect::CancelTimer => {
                    self.timer_armed = false;
                }
            }
        }
    }

    fn start_poll(&mut self, epoch: u64, seq: u64, resync: bool) {
        debug!(
            event = "core.poll.tick",
            epoch = epoch,
            seq = seq,
            resync = resync,
        );
        match (self.poll)() {
            Ok(snapshot) => {
                self.inflight.spawn(async move {
                    let result = snapshot.checksum().await;
                    Resolution::Poll {
                        epoch,
                        seq,
                        resync,
                        result,
                        snapshot,
                    }
                });
            }
            Err(e) => self.report_error(if resync { "resync" } else { "poll" }, e),
        }
    }

    fn promote(&mut self) {
        if let Some((seq, snapshot)) = self.tentative.take() {
            debug!(event = "core.poll.snapshot_promoted", seq = seq);
            self.watch_tx.send_replace(Arc::new(snapshot));
        } else {
            debug!(event = "core.poll.promote_without_tentative");
        }
    }

    fn raise_notice(&self) {
        let tx = self.cmd_tx.clone();
        let action = NoticeAction::new(self.config.notice_action_title.clone(), move || {
            // Receiver gone means the controller stopped; nothing to do
            let _ = tx.send(Command::Accept);
        });
        let notice = Notice::new(&self.config.notice_title, &self.config.notice_description)
            .with_action(action);

        info!(event = "core.poll.notice_raised", notice_id = %notice.id);
        self.sink.push(notice);
    }

    /// Tick becomes a no-op; the error is logged and forwarded, never
    /// swallowed. The next scheduled tick is the implicit retry.
    fn report_error(&self, source: &'static str, error: SnapshotError) {
        warn!(
            event = "core.poll.resolve_failed",
            source = source,
            error = %error,
        );
        let _ = self.error_tx.send(error);
    }
}
