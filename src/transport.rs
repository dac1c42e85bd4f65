//! Messaging Transport
//!
//! The session layer each node runs on. Login, message delivery and payload
//! lookups live behind this trait; the fleet only reads connection state and
//! issues sends and resets.

use async_trait::async_trait;

use crate::cluster::{ConnectionState, NodeId};
use crate::error::Result;

#[async_trait]
pub trait NodeTransport: Send + Sync + 'static {
    fn id(&self) -> &NodeId;

    fn connection_state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    /// Send a text to another account through this node
    async fn send_text(&self, to: &str, text: &str) -> Result<()>;

    /// Send a text to this node's own account
    async fn say(&self, text: &str) -> Result<()>;

    /// Force a hard session reestablishment
    async fn reset(&self, reason: &str) -> Result<()>;

    async fn logout(&self) -> Result<()>;
}
