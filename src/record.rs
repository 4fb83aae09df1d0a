use chrono::{DateTime, Utc};
use serde::Serialize;

/// Placeholder for trip and route ids the feed leaves out.
pub const UNKNOWN_ID: &str = "unknown";

/// Latest known state of one vehicle, as decoded from a feed and persisted in
/// `vehicle_positions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleRecord {
    pub vehicle_id: String,
    pub trip_id: String,
    pub route_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Position fix time, already normalized.
    pub timestamp: DateTime<Utc>,
    pub congestion: Option<String>,
    pub status: Option<String>,
    pub stop_id: Option<String>,
    pub is_active: bool,
    /// Time of the pull that produced this record.
    pub last_seen: DateTime<Utc>,
}

impl VehicleRecord {
    /// True when the record may be written: a non-empty id, text PostgreSQL
    /// can store, and coordinates inside the WGS84 range.
    pub fn is_persistable(&self) -> bool {
        storable_text(&self.vehicle_id)
            && storable_text(&self.trip_id)
            && storable_text(&self.route_id)
            && self.stop_id.as_deref().is_none_or(storable_text)
            && valid_coordinates(self.latitude, self.longitude)
    }
}

/// Non-empty and free of NUL, which a PostgreSQL `text` column rejects.
pub(crate) fn storable_text(value: &str) -> bool {
    !value.is_empty() && !value.contains('\0')
}

pub(crate) fn valid_coordinates(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}
