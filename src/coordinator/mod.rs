//! Coordinator Module
//!
//! Fleet membership and failover wiring.

mod failover;
mod registry;

pub use failover::FailoverCoordinator;
pub use registry::{NodeEntry, NodeRegistry};
