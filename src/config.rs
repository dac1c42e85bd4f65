//! Fleet Configuration

use std::time::Duration;

use rand::Rng;

use crate::error::{HaError, Result};

/// Randomization applied to a watchdog interval.
///
/// Each node samples its own period once, so probes and resets across the
/// fleet do not fire in lockstep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JitterPolicy {
    /// Exact interval
    None,
    /// Uniform within `base * (1 ± fraction)`
    Around(f64),
}

impl Default for JitterPolicy {
    fn default() -> Self {
        JitterPolicy::Around(0.1)
    }
}

impl JitterPolicy {
    pub fn apply(&self, base: Duration) -> Duration {
        match *self {
            JitterPolicy::None => base,
            JitterPolicy::Around(fraction) => {
                let ms = base.as_millis() as f64;
                let spread = ms * fraction;
                if spread < 1.0 {
                    return base;
                }
                let mut rng = rand::thread_rng();
                let jittered = rng.gen_range((ms - spread)..=(ms + spread));
                Duration::from_millis(jittered.round().max(1.0) as u64)
            }
        }
    }
}

/// Watchdog interval: a nominal period plus jitter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub base: Duration,
    pub jitter: JitterPolicy,
}

impl Interval {
    /// Exactly `base`
    pub fn exact(base: Duration) -> Self {
        Self {
            base,
            jitter: JitterPolicy::None,
        }
    }

    /// "Around N seconds", ±10%
    pub fn around_secs(secs: u64) -> Self {
        Self {
            base: Duration::from_secs(secs),
            jitter: JitterPolicy::default(),
        }
    }

    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Draw the concrete period for one node
    pub fn sample(&self) -> Duration {
        self.jitter.apply(self.base)
    }
}

/// HA fleet configuration
#[derive(Debug, Clone)]
pub struct HaConfig {
    /// Ding watchdog period `D`
    pub probe: Interval,

    /// Hard-reset watchdog period `R`, must exceed `D`
    pub reset: Interval,

    /// Account that answers a ding with a dong
    pub health_check_peer: String,

    /// Probe text
    pub ding_text: String,

    /// Ack text
    pub dong_text: String,

    /// Notification bus capacity
    pub event_capacity: usize,
}

impl Default for HaConfig {
    fn default() -> Self {
        Self {
            probe: Interval::around_secs(60),
            reset: Interval::around_secs(300),
            health_check_peer: "health-check".to_string(),
            ding_text: "ding".to_string(),
            dong_text: "dong".to_string(),
            event_capacity: 1024,
        }
    }
}

impl HaConfig {
    pub fn with_probe(mut self, probe: Interval) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_reset(mut self, reset: Interval) -> Self {
        self.reset = reset;
        self
    }

    pub fn with_health_check_peer(mut self, peer: impl Into<String>) -> Self {
        self.health_check_peer = peer.into();
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Reject intervals that would make the watchdogs meaningless
    pub fn validate(&self) -> Result<()> {
        for (name, interval) in [("probe", &self.probe), ("reset", &self.reset)] {
            if interval.base.is_zero() {
                return Err(HaError::InvalidConfig(format!("{} interval is zero", name)));
            }
            if let JitterPolicy::Around(f) = interval.jitter {
                if !(0.0..1.0).contains(&f) {
                    return Err(HaError::InvalidConfig(format!(
                        "{} jitter fraction {} outside [0, 1)",
                        name, f
                    )));
                }
            }
        }
        if self.reset.base <= self.probe.base {
            return Err(HaError::InvalidConfig(format!(
                "reset interval {:?} must exceed probe interval {:?}",
                self.reset.base, self.probe.base
            )));
        }
        if self.health_check_peer.is_empty() {
            return Err(HaError::InvalidConfig("health check peer is empty".into()));
        }
        Ok(())
    }
}
