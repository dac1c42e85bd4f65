//! Replica Router
//!
//! Chooses which live nodes answer a request. A node that cannot answer is a
//! per-node miss, never an aggregate error.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::Result;
use crate::transport::NodeTransport;

/// Anything the fleet can look up, identified independently of the node that
/// resolved it
pub trait Entity {
    fn entity_id(&self) -> &str;
}

/// Router over a snapshot of live nodes, in registration order
pub struct ReplicaRouter<N: ?Sized> {
    live: Vec<Arc<N>>,
}

impl<N: ?Sized> Clone for ReplicaRouter<N> {
    fn clone(&self) -> Self {
        Self {
            live: self.live.clone(),
        }
    }
}

impl<N: NodeTransport + ?Sized> ReplicaRouter<N> {
    pub fn new(live: Vec<Arc<N>>) -> Self {
        Self { live }
    }

    pub fn live(&self) -> &[Arc<N>] {
        &self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Query every live node concurrently and merge the results,
    /// keeping the first occurrence of each entity id.
    pub async fn find_all<T, F, Fut>(&self, query: F) -> Vec<T>
    where
        T: Entity,
        F: Fn(Arc<N>) -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let results = join_all(self.live.iter().cloned().map(&query)).await;

        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for (node, result) in self.live.iter().zip(results) {
            match result {
                Ok(items) => {
                    for item in items {
                        if seen.insert(item.entity_id().to_string()) {
                            merged.push(item);
                        }
                    }
                }
                Err(e) => warn!(node = %node.id(), error = %e, "find_all skipped node"),
            }
        }
        merged
    }

    /// Ask live nodes one at a time, in order, returning the first that
    /// resolves. `None` when no node can.
    pub async fn find_first<T, F, Fut>(&self, load: F) -> Option<T>
    where
        F: Fn(Arc<N>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        for node in &self.live {
            match load(node.clone()).await {
                Ok(value) => {
                    debug!(node = %node.id(), "find_first resolved");
                    return Some(value);
                }
                Err(e) => debug!(node = %node.id(), error = %e, "find_first miss"),
            }
        }
        None
    }

    /// Ask every live node concurrently and pick one successful result
    /// uniformly at random
    pub async fn find_any<T, F, Fut>(&self, load: F) -> Option<T>
    where
        F: Fn(Arc<N>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let resolved = self.resolve_each(load).await;
        pick(&mut rand::thread_rng(), resolved)
    }

    pub async fn find_any_with<T, F, Fut, R>(&self, rng: &mut R, load: F) -> Option<T>
    where
        F: Fn(Arc<N>) -> Fut,
        Fut: Future<Output = Result<T>>,
        R: Rng,
    {
        let resolved = self.resolve_each(load).await;
        pick(rng, resolved)
    }

    async fn resolve_each<T, F, Fut>(&self, load: F) -> Vec<T>
    where
        F: Fn(Arc<N>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let results = join_all(self.live.iter().cloned().map(&load)).await;

        let mut resolved = Vec::new();
        for (node, result) in self.live.iter().zip(results) {
            match result {
                Ok(value) => resolved.push(value),
                Err(e) => debug!(node = %node.id(), error = %e, "find_any miss"),
            }
        }
        resolved
    }

    /// Send `text` through every live node. Returns how many accepted it.
    pub async fn say(&self, text: &str) -> usize {
        let results = join_all(self.live.iter().map(|node| node.say(text))).await;

        let mut delivered = 0;
        for (node, result) in self.live.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!(node = %node.id(), error = %e, "say failed"),
            }
        }
        delivered
    }
}

fn pick<T, R: Rng>(rng: &mut R, mut resolved: Vec<T>) -> Option<T> {
    if resolved.is_empty() {
        return None;
    }
    let i = rng.gen_range(0..resolved.len());
    Some(resolved.swap_remove(i))
}
