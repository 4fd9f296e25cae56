//! Fanout of one alert to many independently addressed sessions.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;

/// Payload handed to a session for one alert: `{"alert": ..., "class": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertDelivery {
    pub alert: Value,
    pub class: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// No live session is registered under the connection ID.
    NotConnected,
    /// The session's outbound buffer is full.
    Backpressure,
    /// The session is shutting down.
    Closed,
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => f.write_str("connection not registered"),
            Self::Backpressure => f.write_str("session buffer full"),
            Self::Closed => f.write_str("session closed"),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Outbound seam to whatever owns the physical connections.
///
/// `deliver` is a fire-and-forget hand-off; success means the gateway
/// accepted the payload, not that the device received it.
#[async_trait]
pub trait SessionGateway: Send + Sync {
    async fn deliver(
        &self,
        connection_id: &str,
        delivery: Arc<AlertDelivery>,
    ) -> Result<(), DeliveryError>;
}

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Connections the gateway accepted the alert for, in ID order.
    pub delivered: Vec<String>,
    pub failed: usize,
}

impl DispatchReport {
    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }
}

#[derive(Clone)]
pub struct FanoutDispatcher {
    gateway: Arc<dyn SessionGateway>,
}

impl FanoutDispatcher {
    pub fn new(gateway: Arc<dyn SessionGateway>) -> Self {
        Self { gateway }
    }

    /// Deliver `delivery` once to each distinct target. A failed hand-off is
    /// logged and skipped; it never stops delivery to the other targets.
    pub async fn broadcast<I>(&self, delivery: AlertDelivery, targets: I) -> DispatchReport
    where
        I: IntoIterator<Item = String>,
    {
        let unique: BTreeSet<String> = targets.into_iter().collect();
        if unique.is_empty() {
            return DispatchReport::default();
        }

        let delivery = Arc::new(delivery);
        let gateway = &self.gateway;
        let attempts = unique.into_iter().map(|connection_id| {
            let delivery = delivery.clone();
            async move {
                let result = gateway.deliver(&connection_id, delivery).await;
                (connection_id, result)
            }
        });

        let mut report = DispatchReport::default();
        for (connection_id, result) in join_all(attempts).await {
            match result {
                Ok(()) => report.delivered.push(connection_id),
                Err(err) => {
                    tracing::debug!(%connection_id, %err, "alert delivery failed");
                    report.failed += 1;
                }
            }
        }
        report
    }
}
