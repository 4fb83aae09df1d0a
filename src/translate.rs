//! Code-to-name tables for the GTFS-RT vehicle enums.
//!
//! Absent fields stay absent: only a code the producer actually sent is
//! translated. Codes outside the table become `"UNKNOWN"`.

const UNKNOWN: &str = "UNKNOWN";

/// Translates a `VehiclePosition.congestion_level` code.
pub fn congestion(code: Option<i32>) -> Option<&'static str> {
    code.map(congestion_name)
}

/// Translates a `VehiclePosition.current_status` code.
pub fn status(code: Option<i32>) -> Option<&'static str> {
    code.map(status_name)
}

fn congestion_name(code: i32) -> &'static str {
    match code {
        0 => "UNKNOWN_CONGESTION_LEVEL",
        1 => "RUNNING_SMOOTHLY",
        2 => "STOP_AND_GO",
        3 => "CONGESTION",
        4 => "SEVERE_CONGESTION",
        _ => UNKNOWN,
    }
}

fn status_name(code: i32) -> &'static str {
    match code {
        0 => "INCOMING_AT",
        1 => "STOPPED_AT",
        2 => "IN_TRANSIT_TO",
        _ => UNKNOWN,
    }
}
