//! Failover Coordinator
//!
//! Runs one liveness monitor per registered node and funnels their effects
//! through a single dispatch loop, the only writer of availability flags.
//! Availability changes are published on a broadcast bus.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::registry::{NodeEntry, NodeRegistry};
use crate::cluster::{ClusterId, ClusterTracker, ConnectionState, NodeId};
use crate::config::HaConfig;
use crate::error::{HaError, Result};
use crate::event::{Command, Effect, Emitted, FleetEvent, InboundMessage, NodeEvent};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::observability::FleetHealth;
use crate::router::ReplicaRouter;
use crate::transport::NodeTransport;
use crate::watchdog::{LivenessMonitor, MonitorTask};

struct MonitorHandle {
    events: mpsc::UnboundedSender<NodeEvent>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

struct Running {
    cancel: CancellationToken,
    effects: mpsc::UnboundedSender<Emitted>,
    dispatch: JoinHandle<()>,
}

/// Applies monitor effects: signals to the tracker, commands to transports
struct Dispatcher<N: ?Sized> {
    config: HaConfig,
    registry: Arc<NodeRegistry<N>>,
    tracker: Arc<Mutex<ClusterTracker>>,
    metrics: Arc<Metrics>,
    bus: broadcast::Sender<FleetEvent>,
}

impl<N: NodeTransport + ?Sized> Dispatcher<N> {
    async fn run(self, mut effects: mpsc::UnboundedReceiver<Emitted>, cancel: CancellationToken) {
        info!("Failover dispatch started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                emitted = effects.recv() => match emitted {
                    Some(emitted) => self.apply(emitted),
                    None => break,
                },
            }
        }
        info!("Failover dispatch stopped");
    }

    fn apply(&self, emitted: Emitted) {
        let Emitted { generation, effect } = emitted;
        let Some(entry) = self.registry.current(effect.node(), generation) else {
            debug!(node = %effect.node(), generation, "Effect from removed registration dropped");
            return;
        };

        match effect {
            Effect::Signal(signal) => {
                let notifications = self.tracker.lock().apply(&signal);
                for notification in notifications {
                    self.metrics.record_notification(&notification);
                    info!(?notification, "Availability changed");
                    // no subscribers is fine
                    let _ = self.bus.send(FleetEvent::now(notification));
                }
            }
            Effect::Command(command) => self.execute(entry, command),
        }
    }

    fn execute(&self, entry: NodeEntry<N>, command: Command) {
        self.metrics.record_command(&command);

        let metrics = self.metrics.clone();
        let ding = self.config.ding_text.clone();
        tokio::spawn(async move {
            let node = entry.node;
            let result = match &command {
                Command::SendProbe { target, .. } => node.send_text(target, &ding).await,
                Command::ForceReset { .. } => node.reset("liveness watchdog").await,
            };
            if let Err(e) = result {
                metrics.record_transport_error();
                warn!(node = %node.id(), ?command, error = %e, "Watchdog command failed");
            }
        });
    }
}

pub struct FailoverCoordinator<N: ?Sized = dyn NodeTransport> {
    config: HaConfig,
    registry: Arc<NodeRegistry<N>>,
    tracker: Arc<Mutex<ClusterTracker>>,
    metrics: Arc<Metrics>,
    bus: broadcast::Sender<FleetEvent>,
    monitors: DashMap<NodeId, MonitorHandle>,
    running: Mutex<Option<Running>>,
}

impl<N: NodeTransport + ?Sized> FailoverCoordinator<N> {
    pub fn new(config: HaConfig) -> Result<Self> {
        config.validate()?;
        let (bus, _) = broadcast::channel(config.event_capacity.max(1));
        Ok(Self {
            config,
            registry: Arc::new(NodeRegistry::new()),
            tracker: Arc::new(Mutex::new(ClusterTracker::new())),
            metrics: Arc::new(Metrics::new()),
            bus,
            monitors: DashMap::new(),
            running: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &HaConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Register a node in `cluster`. Its watchdogs start now if the fleet is
    /// running, otherwise on [`start`](Self::start).
    pub fn add_node(&self, node: Arc<N>, cluster: impl Into<ClusterId>) -> Result<()> {
        let cluster = cluster.into();
        let id = node.id().clone();
        let generation = self.registry.insert(node.clone(), cluster.clone())?;
        self.tracker.lock().register(id.clone(), cluster.clone());
        info!(node = %id, cluster = %cluster, generation, "Node added");

        // held until the monitor is recorded so a concurrent stop sees it
        let running = self.running.lock();
        if let Some(running) = running.as_ref() {
            self.spawn_monitor(&node, generation, running);
        }
        Ok(())
    }

    /// Stop a node's watchdogs and forget its availability
    pub async fn remove_node(&self, id: &NodeId) -> Result<()> {
        if !self.registry.contains(id) {
            return Err(HaError::UnknownNode(id.clone()));
        }
        if let Some((_, handle)) = self.monitors.remove(id) {
            handle.cancel.cancel();
            if let Err(e) = handle.join.await {
                error!(node = %id, error = %e, "Monitor task failed");
            }
        }
        self.registry
            .remove(id)
            .ok_or_else(|| HaError::UnknownNode(id.clone()))?;
        self.tracker.lock().remove(id);
        info!(node = %id, "Node removed");
        Ok(())
    }

    /// Start dispatch and every node's watchdogs.
    ///
    /// Fails with [`HaError::EmptyFleet`] if no node is registered.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(HaError::AlreadyRunning);
        }
        if self.registry.is_empty() {
            return Err(HaError::EmptyFleet);
        }

        let cancel = CancellationToken::new();
        let (effects_tx, effects_rx) = mpsc::unbounded_channel();
        let dispatch = tokio::spawn(self.dispatcher().run(effects_rx, cancel.clone()));

        let entries = self.registry.entries();
        let started = running.insert(Running {
            cancel,
            effects: effects_tx,
            dispatch,
        });
        for entry in &entries {
            self.spawn_monitor(&entry.node, entry.generation, started);
        }
        drop(running);

        info!(nodes = entries.len(), "HA fleet started");
        Ok(())
    }

    /// Stop every watchdog and the dispatch loop
    pub async fn stop(&self) -> Result<()> {
        let running = self.running.lock().take().ok_or(HaError::NotRunning)?;
        running.cancel.cancel();

        let ids: Vec<NodeId> = self.monitors.iter().map(|m| m.key().clone()).collect();
        let joins: Vec<_> = ids
            .iter()
            .filter_map(|id| self.monitors.remove(id))
            .map(|(_, handle)| handle.join)
            .collect();
        for result in join_all(joins).await {
            if let Err(e) = result {
                error!(error = %e, "Monitor task failed");
            }
        }
        if let Err(e) = running.dispatch.await {
            error!(error = %e, "Dispatch task failed");
        }
        info!("HA fleet stopped");
        Ok(())
    }

    fn dispatcher(&self) -> Dispatcher<N> {
        Dispatcher {
            config: self.config.clone(),
            registry: self.registry.clone(),
            tracker: self.tracker.clone(),
            metrics: self.metrics.clone(),
            bus: self.bus.clone(),
        }
    }

    /// Caller holds the `running` lock
    fn spawn_monitor(&self, node: &Arc<N>, generation: u64, running: &Running) {
        let id = node.id().clone();
        let cancel = running.cancel.child_token();
        let effects = running.effects.clone();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        // sessions already logged in never emit another login
        if node.is_connected() {
            let _ = events_tx.send(NodeEvent::Login(id.clone()));
        }

        let monitor = LivenessMonitor::new(id.clone(), &self.config);
        let join = MonitorTask::new(monitor, generation, events_rx, effects, cancel.clone()).spawn();
        self.monitors.insert(
            id,
            MonitorHandle {
                events: events_tx,
                cancel,
                join,
            },
        );
    }

    /// Route a transport event to its node's monitor.
    ///
    /// Returns `false` when no monitor is running for that node.
    pub fn ingest(&self, event: NodeEvent) -> bool {
        match self.monitors.get(event.node()) {
            Some(handle) => handle.events.send(event).is_ok(),
            None => {
                debug!(node = %event.node(), "No monitor for event");
                false
            }
        }
    }

    /// Classify a raw message (dong detection, self filtering) and route it
    pub fn ingest_message(&self, message: &InboundMessage) -> bool {
        match message.classify(&self.config.dong_text) {
            Some(event) => self.ingest(event),
            None => false,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.bus.subscribe()
    }

    pub fn is_node_available(&self, id: &NodeId) -> bool {
        self.tracker.lock().is_node_available(id)
    }

    /// Availability of `cluster`, or of the whole fleet with `None`
    pub fn is_cluster_available(&self, cluster: Option<&ClusterId>) -> bool {
        self.tracker.lock().is_cluster_available(cluster)
    }

    /// Connected and available nodes, in registration order
    pub fn live_nodes(&self) -> Vec<Arc<N>> {
        let entries = self.registry.entries();
        let tracker = self.tracker.lock();
        entries
            .into_iter()
            .filter(|e| e.node.is_connected() && tracker.is_node_available(e.node.id()))
            .map(|e| e.node)
            .collect()
    }

    /// Router over the current live set
    pub fn router(&self) -> ReplicaRouter<N> {
        ReplicaRouter::new(self.live_nodes())
    }

    /// Any node both logged in and available
    pub fn logonoff(&self) -> bool {
        !self.live_nodes().is_empty()
    }

    /// Comma-joined node ids
    pub fn name(&self) -> String {
        self.registry
            .ids()
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Broadcast a text through every live node
    pub async fn say(&self, text: &str) -> usize {
        self.router().say(text).await
    }

    /// Log out every registered node. Per-node failures are logged.
    pub async fn logout(&self) {
        let entries = self.registry.entries();
        let results = join_all(entries.iter().map(|e| e.node.logout())).await;
        for (entry, result) in entries.iter().zip(results) {
            if let Err(e) = result {
                self.metrics.record_transport_error();
                warn!(node = %entry.node.id(), error = %e, "Logout failed");
            }
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn health(&self) -> FleetHealth {
        let tracker = self.tracker.lock();
        FleetHealth::collect(
            &tracker,
            |id| {
                self.registry
                    .get(id)
                    .map(|e| e.node.connection_state())
                    .unwrap_or(ConnectionState::Disconnected)
            },
            self.metrics.snapshot(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Interval;
    use crate::event::{Notification, Signal};
    use crate::testing::FakeNode;
    use std::time::Duration;
    use tokio::time::advance;

    const D: Duration = Duration::from_secs(60);
    const R: Duration = Duration::from_secs(300);

    fn config() -> HaConfig {
        HaConfig::default()
            .with_probe(Interval::exact(D))
            .with_reset(Interval::exact(R))
    }

    fn fleet(nodes: &[(&Arc<FakeNode>, &str)]) -> FailoverCoordinator<FakeNode> {
        let ha = FailoverCoordinator::new(config()).unwrap();
        for (node, cluster) in nodes {
            ha.add_node((*node).clone(), *cluster).unwrap();
        }
        ha
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn drain(rx: &mut broadcast::Receiver<FleetEvent>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev.notification);
        }
        out
    }

    fn n(id: &str) -> NodeId {
        NodeId::from(id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_fleet_is_fatal() {
        let ha: FailoverCoordinator<FakeNode> = FailoverCoordinator::new(config()).unwrap();
        assert!(matches!(ha.start(), Err(HaError::EmptyFleet)));
        assert!(!ha.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_errors() {
        let a = FakeNode::connected("a");
        let ha = fleet(&[(&a, "ha")]);

        assert!(matches!(
            ha.add_node(a.clone(), "ha"),
            Err(HaError::DuplicateNode(_))
        ));
        assert!(matches!(ha.stop().await, Err(HaError::NotRunning)));
        ha.start().unwrap();
        assert!(matches!(ha.start(), Err(HaError::AlreadyRunning)));
        assert!(matches!(
            ha.remove_node(&n("ghost")).await,
            Err(HaError::UnknownNode(_))
        ));
        ha.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_node_fails_and_probes() {
        let a = FakeNode::connected("a");
        let b = FakeNode::connected("b");
        let ha = fleet(&[(&a, "ha"), (&b, "ha")]);
        let mut rx = ha.subscribe();
        ha.start().unwrap();
        settle().await;

        // b stays chatty, a goes silent
        for _ in 0..2 {
            advance(D / 2).await;
            ha.ingest(NodeEvent::Message(n("b")));
            settle().await;
        }
        advance(Duration::from_millis(10)).await;
        settle().await;

        assert_eq!(drain(&mut rx), vec![Notification::NodeFailed(n("a"))]);
        assert!(ha.is_cluster_available(Some(&ClusterId::from("ha"))));
        let live: Vec<_> = ha.live_nodes().iter().map(|n| n.id().clone()).collect();
        assert_eq!(live, vec![n("b")]);

        advance(D / 2).await;
        ha.ingest(NodeEvent::Message(n("b")));
        settle().await;
        advance(D / 2).await;
        settle().await;
        assert_eq!(a.sent(), vec![("health-check".to_string(), "ding".to_string())]);
        assert_eq!(ha.metrics().probes_sent, 1);

        // dong comes back through a
        assert!(ha.ingest_message(&InboundMessage::text(n("a"), "dong")));
        settle().await;
        assert_eq!(drain(&mut rx), vec![Notification::NodeRecovered(n("a"))]);
        assert!(ha.is_node_available(&n("a")));

        ha.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cluster_failed_once_and_recovered() {
        let a = FakeNode::connected("a");
        let b = FakeNode::connected("b");
        let ha = fleet(&[(&a, "ha"), (&b, "ha")]);
        let mut rx = ha.subscribe();
        ha.start().unwrap();
        settle().await;

        advance(D + Duration::from_millis(10)).await;
        settle().await;

        let events = drain(&mut rx);
        let cluster_failed = events
            .iter()
            .filter(|e| **e == Notification::ClusterFailed(ClusterId::from("ha")))
            .count();
        assert_eq!(cluster_failed, 1);
        assert_eq!(events.len(), 3);
        assert_eq!(events.last(), Some(&Notification::ClusterFailed(ClusterId::from("ha"))));
        assert!(!ha.is_cluster_available(None));
        assert!(!ha.logonoff());

        ha.ingest(NodeEvent::Ack(n("b")));
        settle().await;
        assert_eq!(
            drain(&mut rx),
            vec![
                Notification::NodeRecovered(n("b")),
                Notification::ClusterRecovered(ClusterId::from("ha"))
            ]
        );

        ha.ingest(NodeEvent::Ack(n("a")));
        settle().await;
        assert_eq!(drain(&mut rx), vec![Notification::NodeRecovered(n("a"))]);

        ha.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_escalation() {
        let a = FakeNode::connected("a");
        let ha = fleet(&[(&a, "ha")]);
        ha.start().unwrap();
        settle().await;

        advance(R).await;
        settle().await;
        assert_eq!(a.resets(), 0);

        advance(R + Duration::from_millis(10)).await;
        settle().await;
        assert_eq!(a.resets(), 1);
        assert_eq!(ha.metrics().resets_sent, 1);

        ha.ingest(NodeEvent::Login(n("a")));
        settle().await;
        advance(R).await;
        settle().await;
        assert_eq!(a.resets(), 1);

        ha.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_node_stops_monitor() {
        let a = FakeNode::connected("a");
        let b = FakeNode::connected("b");
        let ha = fleet(&[(&a, "ha"), (&b, "ha")]);
        ha.start().unwrap();
        settle().await;

        ha.remove_node(&n("a")).await.unwrap();
        assert!(!ha.ingest(NodeEvent::Message(n("a"))));
        assert_eq!(ha.name(), "b");

        advance(D * 3).await;
        settle().await;
        assert!(a.sent().is_empty());
        assert!(!b.sent().is_empty());

        ha.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_node_not_live_or_watched() {
        let a = FakeNode::connected("a");
        let b = FakeNode::connected("b");
        b.set_state(ConnectionState::Disconnected);
        let ha = fleet(&[(&a, "ha"), (&b, "ha")]);
        let mut rx = ha.subscribe();
        ha.start().unwrap();
        settle().await;

        let live: Vec<_> = ha.live_nodes().iter().map(|n| n.id().clone()).collect();
        assert_eq!(live, vec![n("a")]);

        advance(D + Duration::from_millis(10)).await;
        settle().await;
        assert_eq!(drain(&mut rx), vec![Notification::NodeFailed(n("a"))]);

        let health = ha.health();
        assert!(health.clusters[0].available);
        assert!(!health.clusters[0].nodes[0].is_live());

        ha.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_node_while_running() {
        let a = FakeNode::connected("a");
        let ha = fleet(&[(&a, "ha")]);
        ha.start().unwrap();

        let b = FakeNode::connected("b");
        ha.add_node(b.clone(), "ha2").unwrap();
        assert!(ha.ingest(NodeEvent::Message(n("b"))));
        assert_eq!(ha.say("hello").await, 2);
        assert_eq!(b.said(), vec!["hello".to_string()]);

        ha.logout().await;
        assert_eq!(a.logouts(), 1);
        assert!(!ha.logonoff());

        ha.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_effect_from_removed_registration_dropped() {
        let a = FakeNode::connected("a");
        let ha = fleet(&[(&a, "ha")]);
        let old = ha.registry.get(&n("a")).unwrap().generation;

        ha.remove_node(&n("a")).await.unwrap();
        ha.add_node(a.clone(), "ha").unwrap();
        let current = ha.registry.get(&n("a")).unwrap().generation;
        assert_ne!(old, current);

        let dispatcher = ha.dispatcher();
        let mut rx = ha.subscribe();
        let failed = Effect::Signal(Signal::NodeFailed(n("a")));

        // queued by the monitor of the first registration
        dispatcher.apply(Emitted {
            generation: old,
            effect: failed.clone(),
        });
        assert!(ha.is_node_available(&n("a")));
        assert!(drain(&mut rx).is_empty());

        dispatcher.apply(Emitted {
            generation: current,
            effect: failed,
        });
        assert!(!ha.is_node_available(&n("a")));
        assert_eq!(
            drain(&mut rx),
            vec![
                Notification::NodeFailed(n("a")),
                Notification::ClusterFailed(ClusterId::from("ha"))
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_readd_while_running_starts_clean() {
        let a = FakeNode::connected("a");
        let b = FakeNode::connected("b");
        let ha = fleet(&[(&a, "ha"), (&b, "ha")]);
        let mut rx = ha.subscribe();
        ha.start().unwrap();
        settle().await;

        advance(D + Duration::from_millis(10)).await;
        settle().await;
        drain(&mut rx);
        assert!(!ha.is_node_available(&n("a")));

        ha.remove_node(&n("a")).await.unwrap();
        ha.add_node(a.clone(), "ha").unwrap();
        settle().await;
        assert!(ha.is_node_available(&n("a")));
        assert!(ha.is_cluster_available(Some(&ClusterId::from("ha"))));

        ha.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_monitors_added_while_running() {
        let a = FakeNode::connected("a");
        let ha = fleet(&[(&a, "ha")]);
        ha.start().unwrap();

        let b = FakeNode::connected("b");
        ha.add_node(b.clone(), "ha").unwrap();
        settle().await;
        ha.stop().await.unwrap();
        assert!(ha.monitors.is_empty());
        assert!(!ha.ingest(NodeEvent::Message(n("b"))));

        advance(D * 3).await;
        settle().await;
        assert!(b.sent().is_empty());
        assert_eq!(ha.metrics().node_failures, 0);

        // not running: registered but not watched
        let c = FakeNode::connected("c");
        ha.add_node(c, "ha").unwrap();
        assert!(!ha.ingest(NodeEvent::Message(n("c"))));
    }
}
