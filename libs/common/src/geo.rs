//! Geodesy helpers shared by the location index backends.
//!
//! Distances use the haversine formula on a sphere whose radius matches the
//! one Redis uses for its geo commands, so an in-memory query and a
//! `GEOSEARCH` agree on which points sit inside a circle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Earth radius in kilometres, identical to Redis' `EARTH_RADIUS_IN_METERS`.
pub const EARTH_RADIUS_KM: f64 = 6372.797560856;

/// A validated latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordinateError {
    NotFinite,
    LatitudeOutOfRange(f64),
    LongitudeOutOfRange(f64),
}

impl fmt::Display for CoordinateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFinite => write!(f, "coordinates must be finite numbers"),
            Self::LatitudeOutOfRange(v) => write!(f, "latitude {v} is outside [-90, 90]"),
            Self::LongitudeOutOfRange(v) => write!(f, "longitude {v} is outside [-180, 180]"),
        }
    }
}

impl std::error::Error for CoordinateError {}

/// Latitude/longitude window enclosing a circle.
///
/// Longitudes are not wrapped: `min_longitude` may be below -180 and
/// `max_longitude` above 180 when the circle crosses the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(CoordinateError::NotFinite);
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::LongitudeOutOfRange(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Great-circle distance to `other` in kilometres.
    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
    }

    /// Smallest lat/lon window containing every point within `radius_km`.
    ///
    /// Returns `None` when the circle reaches a pole; callers must then
    /// consider every longitude.
    pub fn bounding_box(&self, radius_km: f64) -> Option<BoundingBox> {
        let angular = radius_km / EARTH_RADIUS_KM;
        let lat_delta = angular.to_degrees();
        let min_latitude = self.latitude - lat_delta;
        let max_latitude = self.latitude + lat_delta;
        if min_latitude <= -90.0 || max_latitude >= 90.0 {
            return None;
        }

        let lon_delta = (angular.sin() / self.latitude.to_radians().cos())
            .min(1.0)
            .asin()
            .to_degrees();

        Some(BoundingBox {
            min_latitude,
            max_latitude,
            min_longitude: self.longitude - lon_delta,
            max_longitude: self.longitude + lon_delta,
        })
    }
}
