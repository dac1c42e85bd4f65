//! Fleet Health
//!
//! Point-in-time availability view for dashboards.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cluster::{ClusterId, ClusterTracker, ConnectionState, NodeId};
use crate::metrics::MetricsSnapshot;

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every cluster available
    Healthy,
    /// Some clusters down
    Degraded,
    /// No node available anywhere
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeHealth {
    pub id: NodeId,
    pub connection: ConnectionState,
    pub available: bool,
}

impl NodeHealth {
    /// Eligible to serve requests
    pub fn is_live(&self) -> bool {
        self.available && self.connection.is_connected()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterHealth {
    pub id: ClusterId,
    pub available: bool,
    pub nodes: Vec<NodeHealth>,
}

/// Fleet health summary
#[derive(Debug, Clone, Serialize)]
pub struct FleetHealth {
    pub status: HealthStatus,
    pub available: bool,
    pub clusters: Vec<ClusterHealth>,
    pub metrics: MetricsSnapshot,
    pub checked_at: DateTime<Utc>,
    pub version: String,
}

impl FleetHealth {
    /// Build a snapshot from the tracker. `connection` reports each node's
    /// transport state.
    pub fn collect<F>(tracker: &ClusterTracker, connection: F, metrics: MetricsSnapshot) -> Self
    where
        F: Fn(&NodeId) -> ConnectionState,
    {
        let clusters: Vec<ClusterHealth> = tracker
            .clusters()
            .into_iter()
            .map(|cluster| ClusterHealth {
                available: tracker.is_cluster_available(Some(&cluster)),
                nodes: tracker
                    .members(&cluster)
                    .into_iter()
                    .map(|node| NodeHealth {
                        connection: connection(&node),
                        available: tracker.is_node_available(&node),
                        id: node,
                    })
                    .collect(),
                id: cluster,
            })
            .collect();

        let available = tracker.is_cluster_available(None);
        let status = if !available {
            HealthStatus::Unhealthy
        } else if clusters.iter().all(|c| c.available) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        Self {
            status,
            available,
            clusters,
            metrics,
            checked_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Serialize to JSON format
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"status":"{}","error":"{}"}}"#, self.status, e)
        })
    }
}
