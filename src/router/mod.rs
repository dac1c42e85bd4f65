//! Router Module
//!
//! Replica selection over the live node set.

mod replica;

pub use replica::{Entity, ReplicaRouter};
