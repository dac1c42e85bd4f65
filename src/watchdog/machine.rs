//! Debounce-then-periodic watchdog
//!
//! "No qualifying event for one period" starts a cycle that fires every period
//! until a terminating event arrives. Both the ding and the reset watchdog are
//! instances of this machine with different periods and outputs.

use std::time::Duration;

use tokio::time::Instant;

/// Input to a watchdog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Inbound message
    Activity,
    /// Dong received
    Ack,
    Login,
    Logout,
}

/// Watchdog phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Session not logged in; no timers run
    Idle,
    /// Debouncing: fires once `quiet_until` passes without activity
    Watching { quiet_until: Instant },
    /// Cycle active: ticks every period. Activity seen during the cycle
    /// arms `rearm`, which supersedes the cycle with a fresh one when it
    /// elapses in turn.
    Firing {
        next_tick: Instant,
        rearm: Option<Instant>,
    },
}

/// Timer output from [`Watchdog::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fired {
    /// Quiet period elapsed; a new cycle started
    Elapsed,
    /// Periodic emission inside the cycle
    Tick,
}

/// Result of feeding a trigger to [`Watchdog::observe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    /// Nothing changed
    Ignored,
    /// Debounce timer (re)started
    Armed,
    /// Session ended while not firing
    Stopped,
    /// Active cycle cancelled by this trigger
    Terminated(Trigger),
}

/// Predicate deciding which triggers cancel an active cycle
pub type Terminator = fn(Trigger) -> bool;

/// Ack, login and logout all end a cycle
pub fn ack_or_session_change(trigger: Trigger) -> bool {
    matches!(trigger, Trigger::Ack | Trigger::Login | Trigger::Logout)
}

#[derive(Debug, Clone)]
pub struct Watchdog {
    name: &'static str,
    period: Duration,
    terminates: Terminator,
    phase: Phase,
}

impl Watchdog {
    pub fn new(name: &'static str, period: Duration, terminates: Terminator) -> Self {
        Self {
            name,
            period,
            terminates,
            phase: Phase::Idle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_firing(&self) -> bool {
        matches!(self.phase, Phase::Firing { .. })
    }

    /// Earliest instant at which [`poll`](Self::poll) has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Idle => None,
            Phase::Watching { quiet_until } => Some(quiet_until),
            Phase::Firing { next_tick, rearm } => Some(match rearm {
                Some(r) => r.min(next_tick),
                None => next_tick,
            }),
        }
    }

    /// Phase entered when `trigger` ends the current one
    fn resume(&self, trigger: Trigger, now: Instant) -> Phase {
        match trigger {
            Trigger::Logout => Phase::Idle,
            _ => Phase::Watching {
                quiet_until: now + self.period,
            },
        }
    }

    pub fn observe(&mut self, trigger: Trigger, now: Instant) -> Observed {
        match self.phase {
            Phase::Idle => match trigger {
                Trigger::Login => {
                    self.phase = self.resume(trigger, now);
                    Observed::Armed
                }
                // messages only count inside a logged-in session
                _ => Observed::Ignored,
            },
            Phase::Watching { .. } => {
                self.phase = self.resume(trigger, now);
                if trigger == Trigger::Logout {
                    Observed::Stopped
                } else {
                    Observed::Armed
                }
            }
            Phase::Firing { next_tick, .. } => {
                if (self.terminates)(trigger) {
                    self.phase = self.resume(trigger, now);
                    Observed::Terminated(trigger)
                } else if trigger == Trigger::Logout {
                    self.phase = Phase::Idle;
                    Observed::Stopped
                } else {
                    self.phase = Phase::Firing {
                        next_tick,
                        rearm: Some(now + self.period),
                    };
                    Observed::Armed
                }
            }
        }
    }

    /// Advance timers up to `now`, returning every emission that became due
    /// in deadline order. Ticks stay exactly one period apart regardless of
    /// how late `poll` runs.
    pub fn poll(&mut self, now: Instant) -> Vec<Fired> {
        let mut fired = Vec::new();
        loop {
            match self.phase {
                Phase::Watching { quiet_until } if quiet_until <= now => {
                    self.phase = Phase::Firing {
                        next_tick: quiet_until + self.period,
                        rearm: None,
                    };
                    fired.push(Fired::Elapsed);
                }
                Phase::Firing {
                    next_tick,
                    rearm: Some(r),
                } if r <= now && r <= next_tick => {
                    self.phase = Phase::Firing {
                        next_tick: r + self.period,
                        rearm: None,
                    };
                    fired.push(Fired::Elapsed);
                }
                Phase::Firing { next_tick, rearm } if next_tick <= now => {
                    self.phase = Phase::Firing {
                        next_tick: next_tick + self.period,
                        rearm,
                    };
                    fired.push(Fired::Tick);
                }
                _ => break,
            }
        }
        fired
    }
}
