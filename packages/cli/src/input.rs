//! Observation CSV loading.
//!
//! Expected columns are `longitude`, `latitude`, and optionally
//! `timestamp` (RFC 3339) and `species_id`. Rows that fail to parse are
//! skipped.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use habitat_map_habitat_models::{Observation, ObservationPoint};
use serde::Deserialize;

use crate::CliError;

/// One row of an observation CSV.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObservationRecord {
    /// Longitude in degrees.
    pub longitude: f64,
    /// Latitude in degrees.
    pub latitude: f64,
    /// When the sighting happened; needed for trends only.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Species the sighting belongs to.
    #[serde(default)]
    pub species_id: Option<i64>,
}

/// Reads every parseable observation from a CSV file.
///
/// # Errors
///
/// Returns [`CliError::Csv`] if the file cannot be opened or has no
/// readable header.
pub fn read_observations(path: &Path) -> Result<Vec<ObservationRecord>, CliError> {
    log::info!("Reading observations from {}", path.display());
    let reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    collect_records(reader)
}

/// Reads every parseable observation from CSV data.
///
/// # Errors
///
/// Returns [`CliError::Csv`] if the header cannot be read.
pub fn parse_observations(reader: impl Read) -> Result<Vec<ObservationRecord>, CliError> {
    collect_records(csv::ReaderBuilder::new().flexible(true).from_reader(reader))
}

fn collect_records<R: Read>(
    mut reader: csv::Reader<R>,
) -> Result<Vec<ObservationRecord>, CliError> {
    reader.headers()?;

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for result in reader.deserialize::<ObservationRecord>() {
        match result {
            Ok(record) => records.push(record),
            Err(e) => {
                log::trace!("  skipping malformed row: {e}");
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} malformed observation rows");
    }
    log::debug!("Loaded {} observations", records.len());

    Ok(records)
}

/// Locations of the records belonging to `species_id`, or of every record
/// when it is `None`.
#[must_use]
pub fn points_for(records: &[ObservationRecord], species_id: Option<i64>) -> Vec<ObservationPoint> {
    records
        .iter()
        .filter(|r| species_id.is_none() || r.species_id == species_id)
        .map(|r| ObservationPoint::new(r.longitude, r.latitude))
        .collect()
}

/// Records that carry both a timestamp and a species, as trend input.
#[must_use]
pub fn timed_observations(records: &[ObservationRecord]) -> Vec<Observation> {
    let observations: Vec<Observation> = records
        .iter()
        .filter_map(|r| {
            Some(Observation {
                longitude: r.longitude,
                latitude: r.latitude,
                timestamp: r.timestamp?,
                species_id: r.species_id?,
            })
        })
        .collect();

    let untimed = records.len() - observations.len();
    if untimed > 0 {
        log::warn!("Ignoring {untimed} observations without a timestamp or species");
    }

    observations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_columns_may_be_blank_or_absent() {
        let data = "\
longitude,latitude,timestamp,species_id
1.5,2.5,2024-01-02T03:04:05Z,7
1.0,2.0,,
";
        let records = parse_observations(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].species_id, Some(7));
        assert!(records[0].timestamp.is_some());
        assert_eq!(records[1].species_id, None);
        assert_eq!(records[1].timestamp, None);

        let records = parse_observations("longitude,latitude\n3.0,4.0\n".as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].species_id, None);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let data = "\
longitude,latitude,species_id
1.0,2.0,1
east,north,1
3.0,4.0,not-a-number
5.0,6.0,2
";
        let records = parse_observations(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].longitude, 5.0);
    }

    #[test]
    fn species_filter() {
        let data = "longitude,latitude,species_id\n0,0,1\n1,1,2\n2,2,1\n";
        let records = parse_observations(data.as_bytes()).unwrap();
        assert_eq!(points_for(&records, Some(1)).len(), 2);
        assert_eq!(points_for(&records, Some(2)), vec![ObservationPoint::new(1.0, 1.0)]);
        assert_eq!(points_for(&records, None).len(), 3);
        assert!(points_for(&records, Some(9)).is_empty());
    }

    #[test]
    fn trend_input_needs_time_and_species() {
        let data = "\
longitude,latitude,timestamp,species_id
0,0,2024-01-01T00:00:00Z,1
0,0,,1
0,0,2024-01-01T00:00:00Z,
";
        let records = parse_observations(data.as_bytes()).unwrap();
        let observations = timed_observations(&records);
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].species_id, 1);
    }
}
