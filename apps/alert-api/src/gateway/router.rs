//! Routing table from connection ID to the session task that owns the socket.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::engine::dispatch::{AlertDelivery, DeliveryError, SessionGateway};

/// Shared registry of live sessions.
///
/// Each session owns a bounded channel; `deliver` never waits on a slow
/// device. A full buffer drops that one delivery instead.
pub struct SessionRouter {
    sessions: DashMap<String, mpsc::Sender<Arc<AlertDelivery>>>,
    buffer: usize,
}

impl SessionRouter {
    pub fn new(buffer: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// Register a session and return the receiver its task drains.
    /// Re-registering an ID replaces (and closes) the previous route.
    pub fn register(&self, connection_id: &str) -> mpsc::Receiver<Arc<AlertDelivery>> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.sessions.insert(connection_id.to_string(), tx);
        rx
    }

    pub fn unregister(&self, connection_id: &str) {
        self.sessions.remove(connection_id);
    }

    pub fn is_connected(&self, connection_id: &str) -> bool {
        self.sessions.contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionGateway for SessionRouter {
    async fn deliver(
        &self,
        connection_id: &str,
        delivery: Arc<AlertDelivery>,
    ) -> Result<(), DeliveryError> {
        let sender = self
            .sessions
            .get(connection_id)
            .map(|entry| entry.value().clone())
            .ok_or(DeliveryError::NotConnected)?;

        sender.try_send(delivery).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => {
                tracing::warn!(%connection_id, "session buffer full, dropping alert");
                DeliveryError::Backpressure
            }
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}
