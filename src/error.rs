//! Error types for hafleet

use thiserror::Error;

use crate::cluster::NodeId;

pub type Result<T> = std::result::Result<T, HaError>;

#[derive(Error, Debug)]
pub enum HaError {
    // === Fleet lifecycle ===
    #[error("No nodes registered in the fleet")]
    EmptyFleet,

    #[error("Fleet is already running")]
    AlreadyRunning,

    #[error("Fleet is not running")]
    NotRunning,

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Node already registered: {0}")]
    DuplicateNode(NodeId),

    // === Config ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Per-node ===
    #[error("Transport error on {node}: {reason}")]
    Transport { node: NodeId, reason: String },

    #[error("Node {node} not ready: {reason}")]
    NotReady { node: NodeId, reason: String },
}

impl HaError {
    pub fn transport(node: &NodeId, reason: impl Into<String>) -> Self {
        Self::Transport {
            node: node.clone(),
            reason: reason.into(),
        }
    }

    pub fn not_ready(node: &NodeId, reason: impl Into<String>) -> Self {
        Self::NotReady {
            node: node.clone(),
            reason: reason.into(),
        }
    }

    /// Errors that only concern a single node and never fail an aggregate request
    pub fn is_per_node(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::NotReady { .. })
    }
}
