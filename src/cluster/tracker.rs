//! Cluster Availability Tracker
//!
//! Owns the per-node availability flags and node→cluster membership. A
//! cluster is available while any member is; cluster-level notifications are
//! emitted only on the transitions of that OR.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::node::{ClusterId, NodeId};
use crate::event::{Notification, Signal};

#[derive(Debug, Default)]
pub struct ClusterTracker {
    /// node → available
    availability: HashMap<NodeId, bool>,
    /// node → cluster
    membership: HashMap<NodeId, ClusterId>,
}

impl ClusterTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node as available in `cluster`.
    ///
    /// Re-registering keeps the current flag; a changed cluster moves the node.
    /// Returns `true` if the node was not known before.
    pub fn register(&mut self, node: NodeId, cluster: ClusterId) -> bool {
        let is_new = !self.availability.contains_key(&node);
        if is_new {
            self.availability.insert(node.clone(), true);
        }
        match self.membership.insert(node.clone(), cluster.clone()) {
            Some(previous) if previous != cluster => {
                info!(node = %node, from = %previous, to = %cluster, "Node moved between clusters");
            }
            _ => {}
        }
        is_new
    }

    /// Forget a node. Returns the cluster it belonged to.
    pub fn remove(&mut self, node: &NodeId) -> Option<ClusterId> {
        self.availability.remove(node);
        self.membership.remove(node)
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.membership.contains_key(node)
    }

    pub fn cluster_of(&self, node: &NodeId) -> Option<&ClusterId> {
        self.membership.get(node)
    }

    pub fn apply(&mut self, signal: &Signal) -> Vec<Notification> {
        match signal {
            Signal::NodeFailed(node) => self.on_node_failed(node),
            Signal::NodeRecovered(node) => self.on_node_recovered(node),
        }
    }

    pub fn on_node_failed(&mut self, node: &NodeId) -> Vec<Notification> {
        let Some(cluster) = self.membership.get(node).cloned() else {
            warn!(node = %node, "Failure reported for unregistered node");
            return Vec::new();
        };

        let was_available = self.is_cluster_available(Some(&cluster));
        self.availability.insert(node.clone(), false);
        debug!(node = %node, cluster = %cluster, "Node marked unavailable");

        let mut out = vec![Notification::NodeFailed(node.clone())];
        if was_available && !self.is_cluster_available(Some(&cluster)) {
            warn!(cluster = %cluster, "Last available member lost, cluster down");
            out.push(Notification::ClusterFailed(cluster));
        }
        out
    }

    pub fn on_node_recovered(&mut self, node: &NodeId) -> Vec<Notification> {
        let Some(cluster) = self.membership.get(node).cloned() else {
            warn!(node = %node, "Recovery reported for unregistered node");
            return Vec::new();
        };

        let was_available = self.is_cluster_available(Some(&cluster));
        self.availability.insert(node.clone(), true);
        debug!(node = %node, cluster = %cluster, "Node marked available");

        let mut out = vec![Notification::NodeRecovered(node.clone())];
        if !was_available {
            info!(cluster = %cluster, "Cluster recovered");
            out.push(Notification::ClusterRecovered(cluster));
        }
        out
    }

    pub fn is_node_available(&self, node: &NodeId) -> bool {
        self.availability.get(node).copied().unwrap_or(false)
    }

    /// Any member of `cluster` available; with `None`, any node at all
    pub fn is_cluster_available(&self, cluster: Option<&ClusterId>) -> bool {
        match cluster {
            None => self.availability.values().any(|up| *up),
            Some(cluster) => self
                .membership
                .iter()
                .filter(|(_, c)| *c == cluster)
                .any(|(node, _)| self.is_node_available(node)),
        }
    }

    /// Known clusters, sorted
    pub fn clusters(&self) -> Vec<ClusterId> {
        let mut clusters: Vec<_> = self.membership.values().cloned().collect();
        clusters.sort();
        clusters.dedup();
        clusters
    }

    /// Members of `cluster`, sorted
    pub fn members(&self, cluster: &ClusterId) -> Vec<NodeId> {
        let mut nodes: Vec<_> = self
            .membership
            .iter()
            .filter(|(_, c)| *c == cluster)
            .map(|(n, _)| n.clone())
            .collect();
        nodes.sort();
        nodes
    }

    pub fn len(&self) -> usize {
        self.membership.len()
    }

    pub fn is_empty(&self) -> bool {
        self.membership.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(id: &str) -> NodeId {
        NodeId::from(id)
    }

    fn c(id: &str) -> ClusterId {
        ClusterId::from(id)
    }

    fn two_node_cluster() -> ClusterTracker {
        let mut tracker = ClusterTracker::new();
        tracker.register(n("a"), c("ha"));
        tracker.register(n("b"), c("ha"));
        tracker
    }

    #[test]
    fn test_registered_nodes_start_available() {
        let tracker = two_node_cluster();
        assert!(tracker.is_node_available(&n("a")));
        assert!(tracker.is_cluster_available(Some(&c("ha"))));
        assert!(tracker.is_cluster_available(None));
    }

    #[test]
    fn test_cluster_is_or_of_members() {
        let mut tracker = two_node_cluster();

        assert_eq!(
            tracker.on_node_failed(&n("a")),
            vec![Notification::NodeFailed(n("a"))]
        );
        assert!(tracker.is_cluster_available(Some(&c("ha"))));

        assert_eq!(
            tracker.on_node_failed(&n("b")),
            vec![
                Notification::NodeFailed(n("b")),
                Notification::ClusterFailed(c("ha"))
            ]
        );
        assert!(!tracker.is_cluster_available(Some(&c("ha"))));
        assert!(!tracker.is_cluster_available(None));

        // already down: no second cluster-failed
        assert_eq!(
            tracker.on_node_failed(&n("b")),
            vec![Notification::NodeFailed(n("b"))]
        );
    }

    #[test]
    fn test_cluster_recovered_only_from_down() {
        let mut tracker = two_node_cluster();
        tracker.on_node_failed(&n("a"));

        // sibling b still healthy
        assert_eq!(
            tracker.on_node_recovered(&n("a")),
            vec![Notification::NodeRecovered(n("a"))]
        );

        tracker.on_node_failed(&n("a"));
        tracker.on_node_failed(&n("b"));
        assert_eq!(
            tracker.on_node_recovered(&n("b")),
            vec![
                Notification::NodeRecovered(n("b")),
                Notification::ClusterRecovered(c("ha"))
            ]
        );
    }

    #[test]
    fn test_clusters_are_independent() {
        let mut tracker = two_node_cluster();
        tracker.register(n("x"), c("other"));

        tracker.on_node_failed(&n("x"));
        assert!(!tracker.is_cluster_available(Some(&c("other"))));
        assert!(tracker.is_cluster_available(Some(&c("ha"))));
        assert!(tracker.is_cluster_available(None));
        assert_eq!(tracker.clusters(), vec![c("ha"), c("other")]);
    }

    #[test]
    fn test_register_idempotent_and_remove() {
        let mut tracker = two_node_cluster();
        tracker.on_node_failed(&n("a"));

        assert!(!tracker.register(n("a"), c("ha")));
        assert!(!tracker.is_node_available(&n("a")));

        assert_eq!(tracker.remove(&n("a")), Some(c("ha")));
        assert!(!tracker.contains(&n("a")));
        assert!(!tracker.is_node_available(&n("a")));
        assert_eq!(tracker.members(&c("ha")), vec![n("b")]);
        assert_eq!(tracker.remove(&n("a")), None);
    }

    #[test]
    fn test_unknown_node_ignored() {
        let mut tracker = two_node_cluster();
        assert!(tracker.on_node_failed(&n("ghost")).is_empty());
        assert!(tracker.on_node_recovered(&n("ghost")).is_empty());
        assert!(!tracker.is_cluster_available(Some(&c("nowhere"))));
    }
}
