//! Redis-backed location index and claim store.
//!
//! Layout:
//! - `<geo_key>`: geo set, member = connection ID
//! - `id:<explicit>` / `sig:<digest>`: claim keys set with `NX PX`
//! - `sent:<claim key>`: set of connection IDs that received the alert

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use geoalert_common::Coordinate;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use super::claims::ClaimStore;
use super::locations::LocationIndex;
use crate::error::AlertError;

/// Latitude limit of Redis geo sets (web-mercator bound).
pub const REDIS_MAX_LATITUDE: f64 = 85.05112878;

#[derive(Clone)]
pub struct RedisStore {
    redis: ConnectionManager,
    geo_key: String,
}

impl RedisStore {
    pub async fn connect(redis_url: &str, geo_key: impl Into<String>) -> Result<Self, AlertError> {
        let client = Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;
        Ok(Self {
            redis,
            geo_key: geo_key.into(),
        })
    }
}

fn check_indexable(coordinate: &Coordinate) -> Result<(), AlertError> {
    if coordinate.latitude.abs() > REDIS_MAX_LATITUDE {
        return Err(AlertError::validation(format!(
            "latitude {} is outside the indexable range [-{REDIS_MAX_LATITUDE}, {REDIS_MAX_LATITUDE}]",
            coordinate.latitude
        )));
    }
    Ok(())
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl LocationIndex for RedisStore {
    async fn upsert(&self, connection_id: &str, coordinate: Coordinate) -> Result<(), AlertError> {
        check_indexable(&coordinate)?;
        let mut conn = self.redis.clone();
        redis::cmd("GEOADD")
            .arg(&self.geo_key)
            .arg(coordinate.longitude)
            .arg(coordinate.latitude)
            .arg(connection_id)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn remove(&self, connection_id: &str) -> Result<(), AlertError> {
        let mut conn = self.redis.clone();
        conn.zrem::<_, _, ()>(&self.geo_key, connection_id).await?;
        Ok(())
    }

    async fn query(&self, center: Coordinate, radius_km: f64) -> Result<HashSet<String>, AlertError> {
        check_indexable(&center)?;
        let mut conn = self.redis.clone();
        let members: Vec<String> = redis::cmd("GEOSEARCH")
            .arg(&self.geo_key)
            .arg("FROMLONLAT")
            .arg(center.longitude)
            .arg(center.latitude)
            .arg("BYRADIUS")
            .arg(radius_km)
            .arg("km")
            .query_async(&mut conn)
            .await?;
        Ok(members.into_iter().collect())
    }

    fn validate_center(&self, center: &Coordinate) -> Result<(), AlertError> {
        check_indexable(center)
    }
}

#[async_trait]
impl ClaimStore for RedisStore {
    async fn try_claim(&self, key: &str, ttl: Duration) -> Result<bool, AlertError> {
        let mut conn = self.redis.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(Utc::now().to_rfc3339())
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
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
        let mut conn = self.redis.clone();
        let set_key = format!("sent:{key}");
        redis::pipe()
            .atomic()
            .cmd("SADD")
            .arg(&set_key)
            .arg(connection_ids)
            .ignore()
            .cmd("PEXPIRE")
            .arg(&set_key)
            .arg(ttl_millis(ttl))
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}
