//! In-memory transport for unit tests

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::cluster::{ConnectionState, NodeId};
use crate::error::{HaError, Result};
use crate::router::Entity;
use crate::transport::NodeTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: String,
    pub found_by: String,
}

impl Room {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            found_by: String::new(),
        }
    }
}

impl Entity for Room {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug)]
pub struct FakeNode {
    id: NodeId,
    state: Mutex<ConnectionState>,
    failing: Mutex<bool>,
    rooms: Mutex<Vec<Room>>,
    sent: Mutex<Vec<(String, String)>>,
    said: Mutex<Vec<String>>,
    resets: Mutex<usize>,
    logouts: Mutex<usize>,
}

impl FakeNode {
    pub fn connected(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: NodeId::from(id),
            state: Mutex::new(ConnectionState::Connected),
            failing: Mutex::new(false),
            rooms: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            said: Mutex::new(Vec::new()),
            resets: Mutex::new(0),
            logouts: Mutex::new(0),
        })
    }

    pub fn failing(self: Arc<Self>) -> Arc<Self> {
        *self.failing.lock() = true;
        self
    }

    pub fn with_rooms(self: Arc<Self>, rooms: Vec<Room>) -> Arc<Self> {
        *self.rooms.lock() = rooms;
        self
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    fn check(&self) -> Result<()> {
        if *self.failing.lock() {
            Err(HaError::not_ready(&self.id, "fake failure"))
        } else {
            Ok(())
        }
    }

    pub fn room_find_all(&self) -> Result<Vec<Room>> {
        self.check()?;
        Ok(self
            .rooms
            .lock()
            .iter()
            .map(|r| Room {
                id: r.id.clone(),
                found_by: self.id.to_string(),
            })
            .collect())
    }

    pub fn room_load(&self, id: &str) -> Result<Room> {
        self.room_find_all()?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| HaError::not_ready(&self.id, format!("no room {}", id)))
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    pub fn said(&self) -> Vec<String> {
        self.said.lock().clone()
    }

    pub fn resets(&self) -> usize {
        *self.resets.lock()
    }

    pub fn logouts(&self) -> usize {
        *self.logouts.lock()
    }
}

#[async_trait]
impl NodeTransport for FakeNode {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.lock()
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        self.check()?;
        self.sent.lock().push((to.to_string(), text.to_string()));
        Ok(())
    }

    async fn say(&self, text: &str) -> Result<()> {
        self.check()?;
        self.said.lock().push(text.to_string());
        Ok(())
    }

    async fn reset(&self, _reason: &str) -> Result<()> {
        *self.resets.lock() += 1;
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        *self.logouts.lock() += 1;
        *self.state.lock() = ConnectionState::Disconnected;
        Ok(())
    }
}
