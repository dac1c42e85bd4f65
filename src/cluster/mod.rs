//! Cluster Module
//!
//! Node identity and HA-group availability tracking.

pub mod node;
pub mod tracker;

pub use node::{ClusterId, ConnectionState, NodeId};
pub use tracker::ClusterTracker;
