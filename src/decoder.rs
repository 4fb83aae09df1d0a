//! Protobuf decoding of GTFS Realtime feeds into [`VehicleRecord`]s.

use chrono::{DateTime, Utc};
use prost::Message;
use tracing::{debug, error, info, warn};

use crate::gtfs_rt::{FeedMessage, VehiclePosition};
use crate::record::{UNKNOWN_ID, VehicleRecord, storable_text, valid_coordinates};
use crate::report::{DecodeReport, SkipReason};
use crate::timestamp::{self, TimestampAnomaly};
use crate::translate;

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid protobuf for a `FeedMessage`.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedMessage, prost::DecodeError> {
    FeedMessage::decode(bytes)
}

/// Result of decoding one payload.
#[derive(Debug, Default)]
pub struct Decoded {
    pub records: Vec<VehicleRecord>,
    pub report: DecodeReport,
    /// Set when the payload as a whole was not a `FeedMessage`; `records` is
    /// empty in that case.
    pub error: Option<prost::DecodeError>,
}

/// Decodes a payload and normalizes every usable vehicle entity.
///
/// Never fails: an undecodable payload yields no records and carries the
/// decode error for the caller to report. `now` is the ingestion time used
/// for `last_seen` and as the timestamp fallback.
pub fn decode_feed(bytes: &[u8], now: DateTime<Utc>) -> Decoded {
    match parse_feed(bytes) {
        Ok(feed) => {
            let (records, report) = records_from_feed(&feed, now);
            Decoded {
                records,
                report,
                error: None,
            }
        }
        Err(e) => {
            error!(error = %e, bytes = bytes.len(), "Feed payload is not a GTFS-RT FeedMessage");
            Decoded {
                error: Some(e),
                ..Default::default()
            }
        }
    }
}

/// Extracts vehicle records from an already decoded feed, in entity order.
pub fn records_from_feed(
    feed: &FeedMessage,
    now: DateTime<Utc>,
) -> (Vec<VehicleRecord>, DecodeReport) {
    let mut report = DecodeReport {
        feed_timestamp: feed.header.timestamp,
        total_entities: feed.entity.len(),
        ..Default::default()
    };
    let mut records = Vec::with_capacity(feed.entity.len());

    for entity in &feed.entity {
        let Some(vehicle) = &entity.vehicle else {
            continue;
        };
        report.vehicles += 1;

        match vehicle_record(vehicle, now) {
            Ok((record, anomaly)) => {
                if let Some(anomaly) = anomaly {
                    report.timestamp_anomalies += 1;
                    warn!(entity_id = %entity.id, vehicle_id = %record.vehicle_id, "{anomaly}");
                }
                records.push(record);
            }
            Err(reason) => {
                debug!(entity_id = %entity.id, ?reason, "Skipping vehicle entity");
                report.record_skip(reason);
            }
        }
    }
    report.parsed = records.len();

    if report.skipped() > 0 {
        info!(
            skipped = report.skipped(),
            missing_position = report.missing_position,
            missing_vehicle_id = report.missing_vehicle_id,
            invalid_vehicle_id = report.invalid_vehicle_id,
            missing_coordinates = report.missing_coordinates,
            invalid_coordinates = report.invalid_coordinates,
            "Skipped vehicle entries with missing required data"
        );
    }
    info!(
        parsed = report.parsed,
        non_vehicle = report.non_vehicle(),
        "Parsed valid vehicle positions from GTFS-RT data"
    );

    (records, report)
}

fn vehicle_record(
    vehicle: &VehiclePosition,
    now: DateTime<Utc>,
) -> Result<(VehicleRecord, Option<TimestampAnomaly>), SkipReason> {
    let position = vehicle
        .position
        .as_ref()
        .ok_or(SkipReason::MissingPosition)?;

    let vehicle_id = match vehicle.vehicle.as_ref().and_then(|d| d.id.as_deref()) {
        None | Some("") => return Err(SkipReason::MissingVehicleId),
        Some(id) if !storable_text(id) => return Err(SkipReason::InvalidVehicleId),
        Some(id) => id.to_string(),
    };

    let (Some(latitude), Some(longitude)) =
        (coordinate(position.latitude), coordinate(position.longitude))
    else {
        return Err(SkipReason::MissingCoordinates);
    };
    if !valid_coordinates(latitude, longitude) {
        return Err(SkipReason::InvalidCoordinates);
    }

    let resolved = timestamp::normalize_checked(vehicle.timestamp, now);
    let trip = vehicle.trip.as_ref();

    let record = VehicleRecord {
        vehicle_id,
        trip_id: trip
            .and_then(|t| non_empty(t.trip_id.as_deref()))
            .unwrap_or_else(|| UNKNOWN_ID.to_string()),
        route_id: trip
            .and_then(|t| non_empty(t.route_id.as_deref()))
            .unwrap_or_else(|| UNKNOWN_ID.to_string()),
        latitude,
        longitude,
        timestamp: resolved.instant,
        congestion: translate::congestion(vehicle.congestion_level).map(str::to_string),
        status: translate::status(vehicle.current_status).map(str::to_string),
        stop_id: non_empty(vehicle.stop_id.as_deref()),
        is_active: true,
        last_seen: now,
    };

    Ok((record, resolved.anomaly))
}

/// Producers send `0.0` when they have no fix, so zero counts as missing.
fn coordinate(value: Option<f32>) -> Option<f64> {
    value
        .filter(|v| v.is_finite() && *v != 0.0)
        .map(f64::from)
}

/// Optional text fields: empty or unstorable values read as absent.
fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|s| storable_text(s)).map(str::to_string)
}
