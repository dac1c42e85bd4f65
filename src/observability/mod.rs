//! Observability Module
//!
//! Fleet health snapshots for operational visibility.

pub mod health;

pub use health::{ClusterHealth, FleetHealth, HealthStatus, NodeHealth};
