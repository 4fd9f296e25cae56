use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use geoalert_common::Coordinate;

use crate::error::AlertError;

/// Last reported position of one live connection.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceLocation {
    pub connection_id: String,
    pub coordinate: Coordinate,
    pub updated_at: DateTime<Utc>,
}

/// Mapping from connection ID to last-known coordinate with radius search.
///
/// Backed by Redis geo sets in production and an in-memory grid in tests and
/// single-node deployments. Radius queries are inclusive of the boundary.
#[async_trait]
pub trait LocationIndex: Send + Sync {
    /// Insert or replace the location for `connection_id`. Last write wins.
    async fn upsert(&self, connection_id: &str, coordinate: Coordinate) -> Result<(), AlertError>;
    /// Drop the location for `connection_id`. Absent IDs are not an error.
    async fn remove(&self, connection_id: &str) -> Result<(), AlertError>;
    /// Every connection whose location lies within `radius_km` of `center`.
    async fn query(&self, center: Coordinate, radius_km: f64) -> Result<HashSet<String>, AlertError>;

    /// Reject a query centre this backend cannot search around. Runs before
    /// any state is touched, so a bad centre never consumes a dedup claim.
    fn validate_center(&self, _center: &Coordinate) -> Result<(), AlertError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

const CELL_DEGREES: f64 = 0.25;
const LON_CELLS: i32 = 1440;

/// Queries touching more cells than this scan every location instead.
const MAX_SCANNED_CELLS: usize = 4096;

type Cell = (i32, i32);

fn row_of(latitude: f64) -> i32 {
    ((latitude + 90.0) / CELL_DEGREES).floor() as i32
}

fn col_of(longitude: f64) -> i32 {
    (((longitude + 180.0) / CELL_DEGREES).floor() as i32).rem_euclid(LON_CELLS)
}

fn cell_of(coordinate: &Coordinate) -> Cell {
    (row_of(coordinate.latitude), col_of(coordinate.longitude))
}

/// Grid-bucketed location index.
///
/// `locations` is authoritative. `cells` buckets connection IDs by a
/// 0.25-degree grid to narrow radius queries. Every mutation for a
/// connection holds its `locations` entry lock while touching `cells`, so a
/// connection is never left in a cell that disagrees with its record.
pub struct MemoryLocationIndex {
    locations: DashMap<String, DeviceLocation>,
    cells: DashMap<Cell, HashSet<String>>,
}

impl MemoryLocationIndex {
    pub fn new() -> Self {
        Self {
            locations: DashMap::new(),
            cells: DashMap::new(),
        }
    }

    pub fn get(&self, connection_id: &str) -> Option<DeviceLocation> {
        self.locations.get(connection_id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    fn leave_cell(&self, cell: Cell, connection_id: &str) {
        if let Entry::Occupied(mut members) = self.cells.entry(cell) {
            members.get_mut().remove(connection_id);
            if members.get().is_empty() {
                members.remove();
            }
        }
    }

    /// Grid cells overlapping the circle, or `None` when a full scan is cheaper
    /// (or the circle reaches a pole).
    fn covering_cells(&self, center: &Coordinate, radius_km: f64) -> Option<Vec<Cell>> {
        // Pad by a millimetre so float error never drops a cell on the boundary.
        let bbox = center.bounding_box(radius_km + 1e-6)?;

        let first_row = row_of(bbox.min_latitude);
        let last_row = row_of(bbox.max_latitude);
        let first_col = ((bbox.min_longitude + 180.0) / CELL_DEGREES).floor() as i32;
        let last_col = ((bbox.max_longitude + 180.0) / CELL_DEGREES).floor() as i32;

        let rows = (last_row - first_row + 1) as usize;
        let cols = ((last_col - first_col + 1) as usize).min(LON_CELLS as usize);
        let total = rows * cols;
        if total > MAX_SCANNED_CELLS || total > self.locations.len() {
            return None;
        }

        let mut cells = Vec::with_capacity(total);
        for row in first_row..=last_row {
            for offset in 0..cols as i32 {
                cells.push((row, (first_col + offset).rem_euclid(LON_CELLS)));
            }
        }
        Some(cells)
    }
}

impl Default for MemoryLocationIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocationIndex for MemoryLocationIndex {
    async fn upsert(&self, connection_id: &str, coordinate: Coordinate) -> Result<(), AlertError> {
        let cell = cell_of(&coordinate);
        let location = DeviceLocation {
            connection_id: connection_id.to_string(),
            coordinate,
            updated_at: Utc::now(),
        };

        match self.locations.entry(connection_id.to_string()) {
            Entry::Occupied(mut existing) => {
                let previous = cell_of(&existing.get().coordinate);
                if previous != cell {
                    self.leave_cell(previous, connection_id);
                    self.cells
                        .entry(cell)
                        .or_default()
                        .insert(connection_id.to_string());
                }
                existing.insert(location);
            }
            Entry::Vacant(slot) => {
                self.cells
                    .entry(cell)
                    .or_default()
                    .insert(connection_id.to_string());
                slot.insert(location);
            }
        }
        Ok(())
    }

    async fn remove(&self, connection_id: &str) -> Result<(), AlertError> {
        if let Entry::Occupied(existing) = self.locations.entry(connection_id.to_string()) {
            self.leave_cell(cell_of(&existing.get().coordinate), connection_id);
            existing.remove();
        }
        Ok(())
    }

    async fn query(&self, center: Coordinate, radius_km: f64) -> Result<HashSet<String>, AlertError> {
        let within = |location: &DeviceLocation| location.coordinate.distance_km(&center) <= radius_km;

        let Some(cells) = self.covering_cells(&center, radius_km) else {
            return Ok(self
                .locations
                .iter()
                .filter(|entry| within(entry.value()))
                .map(|entry| entry.key().clone())
                .collect());
        };

        // Snapshot candidates first; never hold a cell lock while reading `locations`.
        let mut candidates: Vec<String> = Vec::new();
        for cell in &cells {
            if let Some(members) = self.cells.get(cell) {
                candidates.extend(members.iter().cloned());
            }
        }

        Ok(candidates
            .into_iter()
            .filter(|id| self.locations.get(id).is_some_and(|loc| within(loc.value())))
            .collect())
    }
}
