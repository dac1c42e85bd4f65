//! Fleet Metrics
//!
//! Counters for watchdog commands and availability transitions.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::event::{Command, Notification};

/// Metrics collector
#[derive(Debug, Default)]
pub struct Metrics {
    probes_sent: AtomicU64,
    resets_sent: AtomicU64,
    transport_errors: AtomicU64,

    node_failures: AtomicU64,
    node_recoveries: AtomicU64,
    cluster_failures: AtomicU64,
    cluster_recoveries: AtomicU64,
}

/// Point-in-time copy of [`Metrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub probes_sent: u64,
    pub resets_sent: u64,
    pub transport_errors: u64,
    pub node_failures: u64,
    pub node_recoveries: u64,
    pub cluster_failures: u64,
    pub cluster_recoveries: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_command(&self, command: &Command) {
        let counter = match command {
            Command::SendProbe { .. } => &self.probes_sent,
            Command::ForceReset { .. } => &self.resets_sent,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification(&self, notification: &Notification) {
        let counter = match notification {
            Notification::NodeFailed(_) => &self.node_failures,
            Notification::NodeRecovered(_) => &self.node_recoveries,
            Notification::ClusterFailed(_) => &self.cluster_failures,
            Notification::ClusterRecovered(_) => &self.cluster_recoveries,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            probes_sent: self.probes_sent.load(Ordering::Relaxed),
            resets_sent: self.resets_sent.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            node_failures: self.node_failures.load(Ordering::Relaxed),
            node_recoveries: self.node_recoveries.load(Ordering::Relaxed),
            cluster_failures: self.cluster_failures.load(Ordering::Relaxed),
            cluster_recoveries: self.cluster_recoveries.load(Ordering::Relaxed),
        }
    }

    /// Get a summary of metrics
    pub fn summary(&self) -> String {
        self.snapshot().summary()
    }
}

impl MetricsSnapshot {
    pub fn summary(&self) -> String {
        format!(
            "Probes: {} | Resets: {} | Node failed/recovered: {}/{} | Cluster failed/recovered: {}/{} | Transport errors: {}",
            self.probes_sent,
            self.resets_sent,
            self.node_failures,
            self.node_recoveries,
            self.cluster_failures,
            self.cluster_recoveries,
            self.transport_errors
        )
    }
}
