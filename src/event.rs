//! Fleet Events
//!
//! Inbound transport events, outbound commands, and the notifications
//! published for observers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cluster::{ClusterId, NodeId};

/// Lifecycle and message event observed on one node's session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// Any inbound message not sent by the node itself
    Message(NodeId),
    /// Session logged in
    Login(NodeId),
    /// Session logged out
    Logout(NodeId),
    /// "dong" reply received through the node
    Ack(NodeId),
}

impl NodeEvent {
    pub fn node(&self) -> &NodeId {
        match self {
            NodeEvent::Message(n)
            | NodeEvent::Login(n)
            | NodeEvent::Logout(n)
            | NodeEvent::Ack(n) => n,
        }
    }
}

/// Raw message as delivered by the transport
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub node: NodeId,
    /// Text body, `None` for non-text payloads
    pub text: Option<String>,
    /// Sent by the node's own account
    pub from_self: bool,
}

impl InboundMessage {
    pub fn text(node: NodeId, text: impl Into<String>) -> Self {
        Self {
            node,
            text: Some(text.into()),
            from_self: false,
        }
    }

    /// Map a raw message to a watchdog event.
    ///
    /// Self-sent messages carry no liveness information and are dropped.
    /// A text body equal to `dong_text` is an ack; it matches on content only,
    /// so any "dong" terminates whatever probe cycle is active.
    pub fn classify(&self, dong_text: &str) -> Option<NodeEvent> {
        if self.from_self {
            return None;
        }
        match self.text.as_deref() {
            Some(text) if text == dong_text => Some(NodeEvent::Ack(self.node.clone())),
            _ => Some(NodeEvent::Message(self.node.clone())),
        }
    }
}

/// Command issued to a node's transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send "ding" to the health-check peer through `node`
    SendProbe { node: NodeId, target: String },
    /// Hard session reestablishment
    ForceReset { node: NodeId },
}

impl Command {
    pub fn node(&self) -> &NodeId {
        match self {
            Command::SendProbe { node, .. } | Command::ForceReset { node } => node,
        }
    }
}

/// Availability signal from a liveness monitor to the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    NodeFailed(NodeId),
    NodeRecovered(NodeId),
}

/// Output of a liveness monitor, applied by the coordinator's dispatch loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Signal(Signal),
    Command(Command),
}

impl Effect {
    pub fn node(&self) -> &NodeId {
        match self {
            Effect::Signal(Signal::NodeFailed(node) | Signal::NodeRecovered(node)) => node,
            Effect::Command(command) => command.node(),
        }
    }
}

/// Effect stamped with the registration generation of the monitor that
/// produced it. Effects from a removed registration are dropped on dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emitted {
    pub generation: u64,
    pub effect: Effect,
}

/// Availability change published to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "kebab-case")]
pub enum Notification {
    NodeFailed(NodeId),
    NodeRecovered(NodeId),
    ClusterFailed(ClusterId),
    ClusterRecovered(ClusterId),
}

/// Timestamped notification as it appears on the fleet event bus
#[derive(Debug, Clone, Serialize)]
pub struct FleetEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub notification: Notification,
}

impl FleetEvent {
    pub fn now(notification: Notification) -> Self {
        Self {
            at: Utc::now(),
            notification,
        }
    }
}
