//! Liveness Monitor
//!
//! Per-node pair of watchdogs. The ding watchdog declares the node failed
//! after one quiet period and then probes the health-check peer; the slower
//! reset watchdog escalates to forced session resets. Both are cancelled by a
//! dong, login or logout, independently of each other.
//!
//! A node marked failed is recovered by the next dong it receives, whether or
//! not a probe cycle is still running at that point.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::machine::{ack_or_session_change, Fired, Observed, Trigger, Watchdog};
use crate::cluster::NodeId;
use crate::config::HaConfig;
use crate::event::{Command, Effect, NodeEvent, Signal};

#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    node: NodeId,
    probe_target: String,
    ding: Watchdog,
    reset: Watchdog,
    /// NodeFailed emitted and not yet answered by a dong
    failed: bool,
}

impl LivenessMonitor {
    /// Create a monitor with periods sampled from the configured jitter
    pub fn new(node: NodeId, config: &HaConfig) -> Self {
        Self::with_periods(
            node,
            config.health_check_peer.clone(),
            config.probe.sample(),
            config.reset.sample(),
        )
    }

    pub fn with_periods(
        node: NodeId,
        probe_target: impl Into<String>,
        probe: Duration,
        reset: Duration,
    ) -> Self {
        Self {
            node,
            probe_target: probe_target.into(),
            ding: Watchdog::new("ding", probe, ack_or_session_change),
            reset: Watchdog::new("reset", reset, ack_or_session_change),
            failed: false,
        }
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn probe_period(&self) -> Duration {
        self.ding.period()
    }

    pub fn reset_period(&self) -> Duration {
        self.reset.period()
    }

    /// Probe cycle active
    pub fn is_probing(&self) -> bool {
        self.ding.is_firing()
    }

    /// Failure reported and not yet recovered
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Reset cycle active
    pub fn is_resetting(&self) -> bool {
        self.reset.is_firing()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.ding.next_deadline(), self.reset.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Feed one event for this node. Timers already due at `now` fire first.
    pub fn handle(&mut self, event: &NodeEvent, now: Instant) -> Vec<Effect> {
        if event.node() != &self.node {
            warn!(node = %self.node, other = %event.node(), "Event routed to wrong monitor");
            return Vec::new();
        }

        let mut effects = self.poll(now);

        let trigger = match event {
            NodeEvent::Message(_) => Trigger::Activity,
            NodeEvent::Ack(_) => Trigger::Ack,
            NodeEvent::Login(_) => Trigger::Login,
            NodeEvent::Logout(_) => Trigger::Logout,
        };

        if let Observed::Terminated(by) = self.ding.observe(trigger, now) {
            debug!(node = %self.node, ?by, "Probe cycle cancelled");
        }

        if trigger == Trigger::Ack && self.failed {
            self.failed = false;
            info!(node = %self.node, "Dong received, node recovered");
            effects.push(Effect::Signal(Signal::NodeRecovered(self.node.clone())));
        }

        if let Observed::Terminated(by) = self.reset.observe(trigger, now) {
            debug!(node = %self.node, ?by, "Reset cycle cancelled");
        }

        effects
    }

    /// Fire every timer due at or before `now`
    pub fn poll(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();

        for fired in self.ding.poll(now) {
            match fired {
                Fired::Elapsed => {
                    self.failed = true;
                    warn!(node = %self.node, period = ?self.ding.period(), "No message within probe period, marking node failed");
                    effects.push(Effect::Signal(Signal::NodeFailed(self.node.clone())));
                }
                Fired::Tick => {
                    debug!(node = %self.node, target = %self.probe_target, "Sending ding");
                    effects.push(Effect::Command(Command::SendProbe {
                        node: self.node.clone(),
                        target: self.probe_target.clone(),
                    }));
                }
            }
        }

        for fired in self.reset.poll(now) {
            match fired {
                Fired::Elapsed => {
                    debug!(node = %self.node, "Reset watchdog armed");
                }
                Fired::Tick => {
                    warn!(node = %self.node, "Silence persists, forcing session reset");
                    effects.push(Effect::Command(Command::ForceReset {
                        node: self.node.clone(),
                    }));
                }
            }
        }

        effects
    }
}
