//! Node Registry
//!
//! Id-keyed lookup of node transports, preserving registration order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::cluster::{ClusterId, NodeId};
use crate::error::{HaError, Result};
use crate::transport::NodeTransport;

pub struct NodeEntry<N: ?Sized> {
    pub node: Arc<N>,
    pub cluster: ClusterId,
    /// Unique per registration; a re-added id gets a new one
    pub generation: u64,
}

impl<N: ?Sized> Clone for NodeEntry<N> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            cluster: self.cluster.clone(),
            generation: self.generation,
        }
    }
}

pub struct NodeRegistry<N: ?Sized> {
    entries: DashMap<NodeId, NodeEntry<N>>,
    order: RwLock<Vec<NodeId>>,
    generations: AtomicU64,
}

impl<N: NodeTransport + ?Sized> Default for NodeRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: NodeTransport + ?Sized> NodeRegistry<N> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            order: RwLock::new(Vec::new()),
            generations: AtomicU64::new(0),
        }
    }

    /// Register `node`, returning its generation
    pub fn insert(&self, node: Arc<N>, cluster: ClusterId) -> Result<u64> {
        let id = node.id().clone();
        let mut order = self.order.write();
        if self.entries.contains_key(&id) {
            return Err(HaError::DuplicateNode(id));
        }
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        self.entries.insert(
            id.clone(),
            NodeEntry {
                node,
                cluster,
                generation,
            },
        );
        order.push(id);
        Ok(generation)
    }

    /// Entry for `id` only if it is still the registration `generation`
    pub fn current(&self, id: &NodeId, generation: u64) -> Option<NodeEntry<N>> {
        self.get(id).filter(|e| e.generation == generation)
    }

    pub fn remove(&self, id: &NodeId) -> Option<NodeEntry<N>> {
        let mut order = self.order.write();
        let (_, entry) = self.entries.remove(id)?;
        order.retain(|n| n != id);
        Some(entry)
    }

    pub fn get(&self, id: &NodeId) -> Option<NodeEntry<N>> {
        self.entries.get(id).map(|e| e.value().clone())
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.entries.contains_key(id)
    }

    /// Node ids in registration order
    pub fn ids(&self) -> Vec<NodeId> {
        self.order.read().clone()
    }

    /// Entries in registration order
    pub fn entries(&self) -> Vec<NodeEntry<N>> {
        let order = self.order.read();
        order.iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
