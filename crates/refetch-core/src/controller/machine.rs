//! Pure state machine for the staleness protocol.
//!
//! The machine never touches timers or I/O. The driver feeds it [`Input`]s
//! and executes the [`Effect`]s it returns, so every transition rule is
//! testable synchronously.
//!
//! Two guards protect against interleaved async resolutions:
//!
//! - `epoch` increments on every [`Input::Reset`] (loader snapshot
//!   changed). Resolutions from a previous epoch are about discarded data
//!   and are dropped wholesale.
//! - `seq` increments per initiated poll. Only the most recently
//!   initiated poll's resolution is applied, so a slow in-flight checksum
//!   can never overwrite a fresher pending value.

use tracing::debug;

use crate::checksum::{Checksum, ChecksumPair};

/// Where the controller currently is in its poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Disabled; no timer armed.
    Idle,
    /// Timer armed, no stale data awaiting the user.
    Waiting,
    /// A staleness notice has been raised; the timer keeps running.
    StalePendingUser,
}

/// Everything that can happen to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// The loader snapshot changed identity; start a fresh checksum pair.
    Reset,
    /// The loader snapshot's checksum resolved.
    LoaderResolved { epoch: u64, checksum: Checksum },
    /// The poll timer fired.
    Tick,
    /// A scheduled poll's checksum resolved.
    PollResolved {
        epoch: u64,
        seq: u64,
        checksum: Checksum,
    },
    /// A re-sync poll (issued on re-enable) resolved.
    ResyncResolved {
        epoch: u64,
        seq: u64,
        checksum: Checksum,
    },
    /// The master switch flipped.
    SetEnabled(bool),
    /// The user accepted the pending snapshot.
    Accept,
}

/// Work the driver must carry out after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Resolve the active loader snapshot's checksum.
    ResolveLoader { epoch: u64 },
    /// Invoke the poll function and resolve the result's checksum.
    StartPoll { epoch: u64, seq: u64 },
    /// Invoke the poll function for an explicit re-sync; the result is
    /// applied as the new baseline, bypassing the staleness check.
    StartResync { epoch: u64, seq: u64 },
    /// Swap the tentative snapshot in as the active one.
    PromoteSnapshot,
    /// Raise a staleness notice with the accept action.
    RaiseNotice,
    /// (Re)arm the poll timer at the configured cadence.
    ArmTimer,
    /// Stop the poll timer.
    CancelTimer,
}

/// State machine for one polled loader.
#[derive(Debug)]
pub struct PollMachine {
    pair: ChecksumPair,
    phase: Phase,
    enabled: bool,
    immediate_update: bool,
    /// A poll is owed on the next enable (set when disabled).
    poll_owed: bool,
    epoch: u64,
    /// Most recently initiated poll in this epoch.
    seq: u64,
}

impl PollMachine {
    /// A machine constructed disabled owes a poll on its first enable, so
    /// enabling always re-syncs against the backend.
    pub fn new(enabled: bool, immediate_update: bool) -> Self {
        Self {
            pair: ChecksumPair::new(),
            phase: Phase::Idle,
            enabled,
            immediate_update,
            poll_owed: !enabled,
            epoch: 0,
            seq: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn pair(&self) -> &ChecksumPair {
        &self.pair
    }

    pub fn has_updates(&self) -> bool {
        self.pair.has_updates()
    }

    /// Apply one input and return the effects the driver must execute.
    pub fn apply(&mut self, input: Input) -> Vec<Effect> {
        match input {
            Input::Reset => self.on_reset(),
            Input::LoaderResolved { epoch, checksum } => self.on_loader_resolved(epoch, checksum),
            Input::Tick => self.on_tick(),
            Input::PollResolved {
                epoch,
                seq,
                checksum,
            } => self.on_poll_resolved(epoch, seq, checksum),
            Input::ResyncResolved {
                epoch,
                seq,
                checksum,
            } => self.on_resync_resolved(epoch, seq, checksum),
            Input::SetEnabled(enabled) => self.on_set_enabled(enabled),
            Input::Accept => self.on_accept(),
        }
    }

    fn on_reset(&mut self) -> Vec<Effect> {
        self.epoch += 1;
        self.seq = 0;
        self.pair = ChecksumPair::new();

        let mut effects = vec![Effect::ResolveLoader { epoch: self.epoch }];
        if self.enabled {
            self.phase = Phase::Waiting;
            effects.push(Effect::ArmTimer);
        } else {
            self.phase = Phase::Idle;
            effects.push(Effect::CancelTimer);
        }
        effects
    }

    fn on_loader_resolved(&mut self, epoch: u64, checksum: Checksum) -> Vec<Effect> {
        if epoch != self.epoch {
            debug!(
                event = "core.poll.stale_loader_resolution_discarded",
                epoch = epoch,
                current_epoch = self.epoch,
            );
            return Vec::new();
        }
        self.pair.set_current(checksum);
        Vec::new()
    }

    fn on_tick(&mut self) -> Vec<Effect> {
        if !self.enabled || self.phase == Phase::Idle {
            return Vec::new();
        }
        self.seq += 1;
        vec![Effect::StartPoll {
            epoch: self.epoch,
            seq: self.seq,
        }]
    }

    fn on_poll_resolved(&mut self, epoch: u64, seq: u64, checksum: Checksum) -> Vec<Effect> {
        if epoch != self.epoch || seq != self.seq {
            debug!(
                event = "core.poll.stale_resolution_discarded",
                epoch = epoch,
                seq = seq,
                current_epoch = self.epoch,
                current_seq = self.seq,
            );
            return Vec::new();
        }
        if !checksum.is_known() {
            // No version information this tick
            return Vec::new();
        }

        let previous_pending = self.pair.pending().clone();
        self.pair.set_pending(checksum.clone());

        if !self.pair.has_updates() {
            return Vec::new();
        }

        if self.immediate_update {
            self.pair.promote();
            return vec![Effect::PromoteSnapshot];
        }

        // Edge-triggered per distinct pending value: a repeat of the value
        // already notified about stays silent, a different stale value
        // raises again.
        if checksum != previous_pending {
            self.phase = Phase::StalePendingUser;
            return vec![Effect::RaiseNotice];
        }
        Vec::new()
    }

    fn on_resync_resolved(&mut self, epoch: u64, seq: u64, checksum: Checksum) -> Vec<Effect> {
        if epoch != self.epoch || seq != self.seq {
            debug!(
                event = "core.poll.stale_resync_discarded",
                epoch = epoch,
                seq = seq,
            );
            return Vec::new();
        }
        // The re-sync result becomes the new baseline; this is not a
        // staleness event. It also starts a fresh epoch so resolutions
        // still in flight for the superseded baseline are discarded.
        self.epoch += 1;
        self.seq = 0;
        self.pair = ChecksumPair::new();
        self.pair.set_current(checksum);
        self.phase = if self.enabled {
            Phase::Waiting
        } else {
            Phase::Idle
        };
        vec![Effect::PromoteSnapshot]
    }

    fn on_set_enabled(&mut self, enabled: bool) -> Vec<Effect> {
        if enabled == self.enabled {
            return Vec::new();
        }
        self.enabled = enabled;

        if !enabled {
            self.phase = Phase::Idle;
            self.poll_owed = true;
            return vec![Effect::CancelTimer];
        }

        self.phase = Phase::Waiting;
        let mut effects = Vec::new();
        if self.poll_owed {
            self.poll_owed = false;
            self.seq += 1;
            effects.push(Effect::StartResync {
                epoch: self.epoch,
                seq: self.seq,
            });
        }
        effects.push(Effect::ArmTimer);
        effects
    }

    fn on_accept(&mut self) -> Vec<Effect> {
        if self.phase != Phase::StalePendingUser {
            debug!(event = "core.poll.accept_without_pending_notice");
            return Vec::new();
        }
        self.pair.promote();
        self.phase = Phase::Waiting;
        vec![Effect::PromoteSnapshot]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Machine with a fresh pair and the loader checksum resolved to "abc".
    fn waiting_machine(immediate_update: bool) -> PollMachine {
        let mut machine = PollMachine::new(true, immediate_update);
        let effects = machine.apply(Input::Reset);
        assert_eq!(
            effects,
            vec![Effect::ResolveLoader { epoch: 1 }, Effect::ArmTimer]
        );
        let effects = machine.apply(Input::LoaderResolved {
            epoch: 1,
            checksum: Checksum::new("abc"),
        });
        assert!(effects.is_empty());
        machine
    }

    /// Fire a tick and resolve the resulting poll with the given checksum.
    fn tick_and_resolve(machine: &mut PollMachine, checksum: &str) -> Vec<Effect> {
        let effects = machine.apply(Input::Tick);
        assert_eq!(
            effects,
            vec![Effect::StartPoll {
                epoch: machine.epoch(),
                seq: machine.seq(),
            }]
        );
        machine.apply(Input::PollResolved {
            epoch: machine.epoch(),
            seq: machine.seq(),
            checksum: Checksum::new(checksum),
        })
    }

    #[test]
    fn test_reset_resolves_loader_and_arms_timer() {
        let machine = waiting_machine(false);
        assert_eq!(machine.phase(), Phase::Waiting);
        assert_eq!(machine.pair().current(), &Checksum::new("abc"));
        assert!(!machine.has_updates());
    }

    #[test]
    fn test_reset_while_disabled_cancels_timer() {
        let mut machine = PollMachine::new(false, false);
        let effects = machine.apply(Input::Reset);
        assert_eq!(
            effects,
            vec![Effect::ResolveLoader { epoch: 1 }, Effect::CancelTimer]
        );
        assert_eq!(machine.phase(), Phase::Idle);
    }

    #[test]
    fn test_matching_checksum_raises_nothing() {
        let mut machine = waiting_machine(false);
        for _ in 0..3 {
            let effects = tick_and_resolve(&mut machine, "abc");
            assert!(effects.is_empty());
        }
        assert_eq!(machine.phase(), Phase::Waiting);
        assert_eq!(machine.pair().current(), &Checksum::new("abc"));
    }

    #[test]
    fn test_staleness_raises_notice() {
        let mut machine = waiting_machine(false);
        let effects = tick_and_resolve(&mut machine, "def");
        assert_eq!(effects, vec![Effect::RaiseNotice]);
        assert_eq!(machine.phase(), Phase::StalePendingUser);
        // current is untouched until the user accepts
        assert_eq!(machine.pair().current(), &Checksum::new("abc"));
        assert!(machine.has_updates());
    }

    #[test]
    fn test_edge_triggering_per_distinct_pending_value() {
        // pending goes "" -> x -> x -> y: exactly two notices
        let mut machine = waiting_machine(false);
        let mut notices = 0;
        for checksum in ["x", "x", "y"] {
            let effects = tick_and_resolve(&mut machine, checksum);
            notices += effects
                .iter()
                .filter(|e| **e == Effect::RaiseNotice)
                .count();
        }
        assert_eq!(notices, 2);
    }

    #[test]
    fn test_revert_then_change_raises_again() {
        let mut machine = waiting_machine(false);
        assert_eq!(tick_and_resolve(&mut machine, "x"), vec![Effect::RaiseNotice]);
        // Server reverted to the displayed content: not stale
        assert!(tick_and_resolve(&mut machine, "abc").is_empty());
        assert!(!machine.has_updates());
        // Same stale value as before, but staleness is newly true: raise
        assert_eq!(tick_and_resolve(&mut machine, "x"), vec![Effect::RaiseNotice]);
    }

    #[test]
    fn test_immediate_update_promotes_silently() {
        let mut machine = waiting_machine(true);
        let effects = tick_and_resolve(&mut machine, "def");
        assert_eq!(effects, vec![Effect::PromoteSnapshot]);
        assert_eq!(machine.phase(), Phase::Waiting);
        assert_eq!(machine.pair().current(), &Checksum::new("def"));
        assert!(!machine.has_updates());
    }

    #[test]
    fn test_immediate_update_converges_across_events() {
        let mut machine = waiting_machine(true);
        for checksum in ["def", "ghi", "ghi", "jkl"] {
            tick_and_resolve(&mut machine, checksum);
        }
        assert_eq!(machine.pair().current(), &Checksum::new("jkl"));
        assert_eq!(machine.phase(), Phase::Waiting);
    }

    #[test]
    fn test_accept_promotes_and_returns_to_waiting() {
        let mut machine = waiting_machine(false);
        tick_and_resolve(&mut machine, "def");

        let effects = machine.apply(Input::Accept);
        assert_eq!(effects, vec![Effect::PromoteSnapshot]);
        assert_eq!(machine.phase(), Phase::Waiting);
        assert_eq!(machine.pair().current(), &Checksum::new("def"));
        assert!(!machine.has_updates());
    }

    #[test]
    fn test_accept_without_pending_notice_is_noop() {
        let mut machine = waiting_machine(false);
        assert!(machine.apply(Input::Accept).is_empty());
        assert_eq!(machine.phase(), Phase::Waiting);
    }

    #[test]
    fn test_ticks_keep_running_under_a_raised_notice() {
        let mut machine = waiting_machine(false);
        tick_and_resolve(&mut machine, "def");
        assert_eq!(machine.phase(), Phase::StalePendingUser);

        // Further ticks keep polling, repeats stay silent
        assert!(tick_and_resolve(&mut machine, "def").is_empty());
        assert_eq!(machine.phase(), Phase::StalePendingUser);
    }

    #[test]
    fn test_stale_seq_resolution_is_discarded() {
        let mut machine = waiting_machine(false);

        machine.apply(Input::Tick);
        let first_seq = machine.seq();
        machine.apply(Input::Tick);
        let second_seq = machine.seq();
        assert!(second_seq > first_seq);

        // The older in-flight resolution lands late: dropped
        let effects = machine.apply(Input::PollResolved {
            epoch: machine.epoch(),
            seq: first_seq,
            checksum: Checksum::new("old"),
        });
        assert!(effects.is_empty());
        assert!(!machine.pair().pending().is_known());

        // The newest resolution still applies
        let effects = machine.apply(Input::PollResolved {
            epoch: machine.epoch(),
            seq: second_seq,
            checksum: Checksum::new("new"),
        });
        assert_eq!(effects, vec![Effect::RaiseNotice]);
    }

    #[test]
    fn test_stale_epoch_resolution_is_discarded() {
        let mut machine = waiting_machine(false);
        machine.apply(Input::Tick);
        let old_epoch = machine.epoch();
        let old_seq = machine.seq();

        machine.apply(Input::Reset);

        let effects = machine.apply(Input::PollResolved {
            epoch: old_epoch,
            seq: old_seq,
            checksum: Checksum::new("def"),
        });
        assert!(effects.is_empty());
        assert!(!machine.has_updates());
    }

    #[test]
    fn test_stale_loader_resolution_is_discarded() {
        let mut machine = waiting_machine(false);
        machine.apply(Input::Reset);
        let effects = machine.apply(Input::LoaderResolved {
            epoch: 1,
            checksum: Checksum::new("zzz"),
        });
        assert!(effects.is_empty());
        assert!(!machine.pair().current().is_known());
    }

    #[test]
    fn test_unknown_checksum_is_no_information() {
        let mut machine = waiting_machine(false);
        machine.apply(Input::Tick);
        let effects = machine.apply(Input::PollResolved {
            epoch: machine.epoch(),
            seq: machine.seq(),
            checksum: Checksum::unknown(),
        });
        assert!(effects.is_empty());
        assert!(!machine.pair().pending().is_known());
    }

    #[test]
    fn test_disable_cancels_timer_and_owes_poll() {
        let mut machine = waiting_machine(false);
        let effects = machine.apply(Input::SetEnabled(false));
        assert_eq!(effects, vec![Effect::CancelTimer]);
        assert_eq!(machine.phase(), Phase::Idle);

        // Ticks while disabled do nothing
        assert!(machine.apply(Input::Tick).is_empty());

        let effects = machine.apply(Input::SetEnabled(true));
        assert_eq!(
            effects,
            vec![
                Effect::StartResync {
                    epoch: machine.epoch(),
                    seq: machine.seq(),
                },
                Effect::ArmTimer,
            ]
        );
        assert_eq!(machine.phase(), Phase::Waiting);
    }

    #[test]
    fn test_resync_result_becomes_baseline_without_notice() {
        let mut machine = waiting_machine(false);
        machine.apply(Input::SetEnabled(false));
        machine.apply(Input::SetEnabled(true));

        let effects = machine.apply(Input::ResyncResolved {
            epoch: machine.epoch(),
            seq: machine.seq(),
            checksum: Checksum::new("def"),
        });
        assert_eq!(effects, vec![Effect::PromoteSnapshot]);
        assert_eq!(machine.pair().current(), &Checksum::new("def"));
        assert!(!machine.has_updates());
        assert_eq!(machine.phase(), Phase::Waiting);
    }

    #[test]
    fn test_resync_discards_superseded_loader_resolution() {
        let mut machine = PollMachine::new(true, false);
        machine.apply(Input::Reset);
        let old_epoch = machine.epoch();

        machine.apply(Input::SetEnabled(false));
        machine.apply(Input::SetEnabled(true));
        machine.apply(Input::ResyncResolved {
            epoch: machine.epoch(),
            seq: machine.seq(),
            checksum: Checksum::new("def"),
        });

        // The loader checksum for the pre-resync snapshot lands late
        let effects = machine.apply(Input::LoaderResolved {
            epoch: old_epoch,
            checksum: Checksum::new("abc"),
        });
        assert!(effects.is_empty());
        assert_eq!(machine.pair().current(), &Checksum::new("def"));
    }

    #[test]
    fn test_reenable_without_prior_disable_owes_nothing() {
        let mut machine = waiting_machine(false);
        // Already enabled: no-op
        assert!(machine.apply(Input::SetEnabled(true)).is_empty());
    }

    #[test]
    fn test_constructed_disabled_owes_poll_on_first_enable() {
        let mut machine = PollMachine::new(false, false);
        machine.apply(Input::Reset);

        let effects = machine.apply(Input::SetEnabled(true));
        assert_eq!(
            effects,
            vec![
                Effect::StartResync {
                    epoch: machine.epoch(),
                    seq: machine.seq(),
                },
                Effect::ArmTimer,
            ]
        );
    }

    #[test]
    fn test_disable_while_notice_pending_then_resync_clears_staleness() {
        let mut machine = waiting_machine(false);
        tick_and_resolve(&mut machine, "def");
        assert_eq!(machine.phase(), Phase::StalePendingUser);

        machine.apply(Input::SetEnabled(false));
        machine.apply(Input::SetEnabled(true));
        machine.apply(Input::ResyncResolved {
            epoch: machine.epoch(),
            seq: machine.seq(),
            checksum: Checksum::new("ghi"),
        });

        assert_eq!(machine.phase(), Phase::Waiting);
        assert!(!machine.has_updates());
        assert_eq!(machine.pair().current(), &Checksum::new("ghi"));
    }
}
