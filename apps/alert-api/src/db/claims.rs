use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::AlertError;

/// The dedup gate: TTL'd claim-or-reject over alert keys.
///
/// `try_claim` must be a single atomic check-and-set. Implementations never
/// split it into a read followed by a write.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Claim `key` for `ttl`. Returns `true` iff this call created the claim.
    async fn try_claim(&self, key: &str, ttl: Duration) -> Result<bool, AlertError>;

    /// Record which connections received the alert claimed under `key`.
    /// Bookkeeping only; expires with the same TTL as the claim.
    async fn record_delivery(
        &self,
        key: &str,
        connection_ids: &[String],
        ttl: Duration,
    ) -> Result<(), AlertError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Claim {
    claimed_at: DateTime<Utc>,
    expires_at: Instant,
}

#[derive(Debug)]
struct DeliveryRecord {
    connection_ids: HashSet<String>,
    expires_at: Instant,
}

/// DashMap-backed claim store. The entry API holds the shard write lock for
/// the whole check-and-set, which makes `try_claim` linearizable per key.
pub struct MemoryClaimStore {
    claims: DashMap<String, Claim>,
    deliveries: DashMap<String, DeliveryRecord>,
}

impl MemoryClaimStore {
    pub fn new() -> Self {
        Self {
            claims: DashMap::new(),
            deliveries: DashMap::new(),
        }
    }

    /// When `key` was claimed, if the claim is still live.
    pub fn claimed_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let claim = self.claims.get(key)?;
        (claim.expires_at > Instant::now()).then_some(claim.claimed_at)
    }

    /// Connections recorded as having received the alert claimed under `key`.
    pub fn delivered_to(&self, key: &str) -> Option<HashSet<String>> {
        let record = self.deliveries.get(key)?;
        (record.expires_at > Instant::now()).then(|| record.connection_ids.clone())
    }

    /// Drop expired claims and delivery records. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.claims.len() + self.deliveries.len();
        self.claims.retain(|_, claim| claim.expires_at > now);
        self.deliveries.retain(|_, record| record.expires_at > now);
        before.saturating_sub(self.claims.len() + self.deliveries.len())
    }
}

impl Default for MemoryClaimStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClaimStore for MemoryClaimStore {
    async fn try_claim(&self, key: &str, ttl: Duration) -> Result<bool, AlertError> {
        let now = Instant::now();
        let claim = Claim {
            claimed_at: Utc::now(),
            expires_at: now + ttl,
        };

        match self.claims.entry(key.to_string()) {
            Entry::Occupied(mut existing) => {
                if existing.get().expires_at > now {
                    return Ok(false);
                }
                // Lapsed but not yet purged: the window is open again.
                existing.insert(claim);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(claim);
                Ok(true)
            }
        }
    }

    async fn record_delivery(
        &self,
        key: &str,
        connection_ids: &[String],
        ttl: Duration,
    ) -> Result<(), AlertError> {
        if connection_ids.is_empty() {
            return Ok(());
        }
        let expires_at = Instant::now() + ttl;
        let mut record = self
            .deliveries
            .entry(key.to_string())
            .or_insert_with(|| DeliveryRecord {
                connection_ids: HashSet::new(),
                expires_at,
            });
        record.connection_ids.extend(connection_ids.iter().cloned());
        record.expires_at = expires_at;
        Ok(())
    }
}
