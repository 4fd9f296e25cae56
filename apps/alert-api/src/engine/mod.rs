//! The geofenced alert fanout engine.
//!
//! Stateless with respect to connections: callers pass a
//! [`ConnectionContext`] or an [`AlertRequest`] into every call, and all
//! shared state lives behind the [`LocationIndex`] and [`ClaimStore`] seams.

pub mod dispatch;
pub mod signature;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use geoalert_common::id::{prefix, prefixed_ulid};
use geoalert_common::Coordinate;
use serde_json::Value;

use crate::config::Config;
use crate::db::{ClaimStore, LocationIndex};
use crate::error::AlertError;

use dispatch::{AlertDelivery, FanoutDispatcher, SessionGateway};

/// Radius applied when a submission does not specify one.
pub const DEFAULT_RADIUS_KM: f64 = 1.0;

/// Per-connection context handed to the engine by the session gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    pub connection_id: String,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionContext {
    /// A fresh context with a new `conn_` ID.
    pub fn new() -> Self {
        Self::with_id(prefixed_ulid(prefix::CONNECTION))
    }

    pub fn with_id(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            connected_at: Utc::now(),
        }
    }
}

impl Default for ConnectionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A validated alert submission.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRequest {
    pub payload: Value,
    pub center: Coordinate,
    pub radius_km: f64,
    pub class_id: Option<String>,
    pub explicit_id: Option<String>,
}

impl AlertRequest {
    pub fn new(payload: Value, center: Coordinate) -> Self {
        Self {
            payload,
            center,
            radius_km: DEFAULT_RADIUS_KM,
            class_id: None,
            explicit_id: None,
        }
    }

    pub fn with_radius(mut self, radius_km: f64) -> Self {
        self.radius_km = radius_km;
        self
    }

    pub fn with_class(mut self, class_id: impl Into<String>) -> Self {
        self.class_id = Some(class_id.into());
        self
    }

    pub fn with_explicit_id(mut self, id: impl Into<String>) -> Self {
        self.explicit_id = Some(id.into());
        self
    }

    fn delivery(&self) -> AlertDelivery {
        AlertDelivery {
            alert: self.payload.clone(),
            class: self.class_id.clone(),
        }
    }
}

/// Terminal state of an alert submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// The dedup key was already claimed; nothing was sent.
    Duplicate { key: String },
    /// The claim succeeded and the alert was handed to `recipients` sessions.
    Broadcast { key: String, recipients: usize },
}

impl SubmissionOutcome {
    pub fn key(&self) -> &str {
        match self {
            Self::Duplicate { key } | Self::Broadcast { key, .. } => key,
        }
    }

    pub fn recipients(&self) -> usize {
        match self {
            Self::Duplicate { .. } => 0,
            Self::Broadcast { recipients, .. } => *recipients,
        }
    }
}

pub struct AlertEngine {
    locations: Arc<dyn LocationIndex>,
    claims: Arc<dyn ClaimStore>,
    dispatcher: FanoutDispatcher,
    dedup_ttl: Duration,
    submission_timeout: Duration,
}

impl AlertEngine {
    pub fn new(
        locations: Arc<dyn LocationIndex>,
        claims: Arc<dyn ClaimStore>,
        gateway: Arc<dyn SessionGateway>,
        config: &Config,
    ) -> Self {
        Self {
            locations,
            claims,
            dispatcher: FanoutDispatcher::new(gateway),
            dedup_ttl: config.dedup_ttl,
            submission_timeout: config.submission_timeout,
        }
    }

    /// Store the latest coordinate reported by a session. Never touches the dedup gate.
    pub async fn update_location(
        &self,
        ctx: &ConnectionContext,
        coordinate: Coordinate,
    ) -> Result<(), AlertError> {
        self.locations.upsert(&ctx.connection_id, coordinate).await?;
        tracing::trace!(connection_id = %ctx.connection_id, "location stored");
        Ok(())
    }

    /// Drop a closed session from the location index.
    pub async fn disconnect(&self, ctx: &ConnectionContext) -> Result<(), AlertError> {
        self.locations.remove(&ctx.connection_id).await
    }

    /// Run one alert through claim, radius query and fanout.
    ///
    /// A store failure fails the whole submission; it is never treated as an
    /// unclaimed key or an empty target set. If the claim succeeded before
    /// the failure, the key stays claimed until its TTL lapses.
    pub async fn submit_alert(&self, request: AlertRequest) -> Result<SubmissionOutcome, AlertError> {
        match tokio::time::timeout(self.submission_timeout, self.run_submission(&request)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                tracing::warn!(
                    timeout_ms = self.submission_timeout.as_millis() as u64,
                    "alert submission timed out"
                );
                Err(AlertError::timeout())
            }
        }
    }

    async fn run_submission(&self, request: &AlertRequest) -> Result<SubmissionOutcome, AlertError> {
        self.locations.validate_center(&request.center)?;
        let key = signature::dedup_key(request);

        if !self.claims.try_claim(&key, self.dedup_ttl).await? {
            tracing::info!(%key, "duplicate alert skipped");
            return Ok(SubmissionOutcome::Duplicate { key });
        }

        let targets = self
            .locations
            .query(request.center, request.radius_km)
            .await?;

        let report = self.dispatcher.broadcast(request.delivery(), targets).await;

        if let Err(err) = self
            .claims
            .record_delivery(&key, &report.delivered, self.dedup_ttl)
            .await
        {
            tracing::warn!(%key, %err, "failed to record alert deliveries");
        }

        tracing::info!(
            %key,
            recipients = report.delivered_count(),
            failed = report.failed,
            "alert broadcasted"
        );
        Ok(SubmissionOutcome::Broadcast {
            key,
            recipients: report.delivered_count(),
        })
    }
}
