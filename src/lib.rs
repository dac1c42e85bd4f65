//! HAFLEET - High-Availability Session Fleet
//!
//! Keeps a group of redundant messaging sessions reachable when individual
//! sessions silently stop receiving traffic: per-node ding/dong and hard-reset
//! watchdogs, cluster availability tracking, and replica selection over the
//! live nodes.

pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod metrics;
pub mod observability;
pub mod router;
pub mod transport;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod testing;

pub use cluster::{ClusterId, ClusterTracker, ConnectionState, NodeId};
pub use config::{HaConfig, Interval, JitterPolicy};
pub use coordinator::{FailoverCoordinator, NodeRegistry};
pub use error::{HaError, Result};
pub use event::{Command, Effect, Emitted, FleetEvent, InboundMessage, NodeEvent, Notification, Signal};
pub use metrics::{Metrics, MetricsSnapshot};
pub use observability::{FleetHealth, HealthStatus};
pub use router::{Entity, ReplicaRouter};
pub use transport::NodeTransport;
pub use watchdog::{LivenessMonitor, MonitorTask, Watchdog};
