//! Watchdog Module
//!
//! Per-node liveness monitoring: the debounce-then-periodic state machine,
//! the ding/reset monitor built on it, and the task that drives it.

mod driver;
pub mod machine;
mod monitor;

pub use driver::MonitorTask;
pub use machine::{Fired, Observed, Phase, Trigger, Watchdog};
pub use monitor::LivenessMonitor;
