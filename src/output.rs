//! Output for the `decode` command: report logging, JSON and CSV export.

use anyhow::Result;
use tracing::{debug, info};

use crate::record::VehicleRecord;
use crate::report::DecodeReport;
use csv::WriterBuilder;
use std::fs::{self, OpenOptions};

/// Logs the decode report, with the skip percentage.
pub fn print_pretty(report: &DecodeReport) {
    info!(skipped_pct = report.skipped_pct(), "{:#?}", report);
}

/// Writes the records to stdout as pretty-printed JSON.
pub fn print_json(records: &[VehicleRecord]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(records)?);
    Ok(())
}

/// Appends records as rows to a CSV file, writing the header only when the
/// file is missing or empty.
pub fn append_records(path: &str, records: &[VehicleRecord]) -> Result<()> {
    let file_exists = fs::metadata(path).is_ok_and(|m| m.len() > 0);
    debug!(path, file_exists, rows = records.len(), "Appending CSV records");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(())
}
