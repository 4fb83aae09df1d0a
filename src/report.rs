use serde::Serialize;

/// Why an entity carrying a vehicle sub-message did not become a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingPosition,
    MissingVehicleId,
    /// The id is present but cannot be stored (contains NUL).
    InvalidVehicleId,
    MissingCoordinates,
    InvalidCoordinates,
}

/// Per-payload counters produced by the decoder.
///
/// `parsed + skipped() == vehicles` always holds; entities without a vehicle
/// sub-message (trip updates, alerts) are only counted in `non_vehicle()`.
/// They are not part of `skipped()`, unlike a plain "skipped entities" count
/// over the whole feed; `skipped() + non_vehicle()` gives that figure.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeReport {
    /// Header timestamp of the feed, as sent.
    pub feed_timestamp: Option<u64>,
    pub total_entities: usize,

    // entities with a vehicle sub-message
    pub vehicles: usize,
    pub parsed: usize,

    // skip reasons
    pub missing_position: usize,
    pub missing_vehicle_id: usize,
    pub invalid_vehicle_id: usize,
    pub missing_coordinates: usize,
    pub invalid_coordinates: usize,

    pub timestamp_anomalies: usize,
}

impl DecodeReport {
    pub fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::MissingPosition => self.missing_position += 1,
            SkipReason::MissingVehicleId => self.missing_vehicle_id += 1,
            SkipReason::InvalidVehicleId => self.invalid_vehicle_id += 1,
            SkipReason::MissingCoordinates => self.missing_coordinates += 1,
            SkipReason::InvalidCoordinates => self.invalid_coordinates += 1,
        }
    }

    pub fn skipped(&self) -> usize {
        self.missing_position
            + self.missing_vehicle_id
            + self.invalid_vehicle_id
            + self.missing_coordinates
            + self.invalid_coordinates
    }

    pub fn non_vehicle(&self) -> usize {
        self.total_entities - self.vehicles
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    /// Share of vehicle entities that were dropped, in percent.
    pub fn skipped_pct(&self) -> f64 {
        Self::pct(self.skipped(), self.vehicles)
    }
}
