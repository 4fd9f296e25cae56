//! Test doubles shared by the engine's unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use geoalert_common::Coordinate;
use parking_lot::Mutex;

use super::dispatch::{AlertDelivery, DeliveryError, SessionGateway};
use crate::db::{ClaimStore, LocationIndex, MemoryLocationIndex};
use crate::error::AlertError;

/// Gateway that records every hand-off and rejects a fixed set of IDs.
pub struct RecordingGateway {
    sent: Mutex<Vec<(String, Arc<AlertDelivery>)>>,
    unreachable: HashSet<String>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::failing_for(&[])
    }

    pub fn failing_for(ids: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            unreachable: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn total(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn deliveries_to(&self, connection_id: &str) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|(id, _)| id == connection_id)
            .count()
    }

    pub fn per_connection(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for (id, _) in self.sent.lock().iter() {
            *counts.entry(id.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl SessionGateway for RecordingGateway {
    async fn deliver(
        &self,
        connection_id: &str,
        delivery: Arc<AlertDelivery>,
    ) -> Result<(), DeliveryError> {
        if self.unreachable.contains(connection_id) {
            return Err(DeliveryError::NotConnected);
        }
        self.sent.lock().push((connection_id.to_string(), delivery));
        Ok(())
    }
}

/// Backend whose every call fails as if the shared store were down.
pub struct UnreachableStore;

#[async_trait]
impl ClaimStore for UnreachableStore {
    async fn try_claim(&self, _key: &str, _ttl: Duration) -> Result<bool, AlertError> {
        Err(AlertError::store_unavailable())
    }

    async fn record_delivery(
        &self,
        _key: &str,
        _connection_ids: &[String],
        _ttl: Duration,
    ) -> Result<(), AlertError> {
        Err(AlertError::store_unavailable())
    }
}

#[async_trait]
impl LocationIndex for UnreachableStore {
    async fn upsert(&self, _connection_id: &str, _coordinate: Coordinate) -> Result<(), AlertError> {
        Err(AlertError::store_unavailable())
    }

    async fn remove(&self, _connection_id: &str) -> Result<(), AlertError> {
        Err(AlertError::store_unavailable())
    }

    async fn query(&self, _center: Coordinate, _radius_km: f64) -> Result<HashSet<String>, AlertError> {
        Err(AlertError::store_unavailable())
    }
}

/// Claim store that never answers.
pub struct StalledStore;

#[async_trait]
impl ClaimStore for StalledStore {
    async fn try_claim(&self, _key: &str, _ttl: Duration) -> Result<bool, AlertError> {
        std::future::pending().await
    }

    async fn record_delivery(
        &self,
        _key: &str,
        _connection_ids: &[String],
        _ttl: Duration,
    ) -> Result<(), AlertError> {
        std::future::pending().await
    }
}

/// In-memory index that refuses query centres beyond a latitude limit, the
/// way geo-set backends do.
pub struct BoundedIndex {
    inner: MemoryLocationIndex,
    max_latitude: f64,
}

impl BoundedIndex {
    pub fn new(max_latitude: f64) -> Self {
        Self {
            inner: MemoryLocationIndex::new(),
            max_latitude,
        }
    }
}

#[async_trait]
impl LocationIndex for BoundedIndex {
    async fn upsert(&self, connection_id: &str, coordinate: Coordinate) -> Result<(), AlertError> {
        self.validate_center(&coordinate)?;
        self.inner.upsert(connection_id, coordinate).await
    }

    async fn remove(&self, connection_id: &str) -> Result<(), AlertError> {
        self.inner.remove(connection_id).await
    }

    async fn query(&self, center: Coordinate, radius_km: f64) -> Result<HashSet<String>, AlertError> {
        self.validate_center(&center)?;
        self.inner.query(center, radius_km).await
    }

    fn validate_center(&self, center: &Coordinate) -> Result<(), AlertError> {
        if center.latitude.abs() > self.max_latitude {
            return Err(AlertError::validation("latitude outside the indexable range"));
        }
        Ok(())
    }
}
