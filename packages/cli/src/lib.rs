#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line driver for the habitat engine.
//!
//! Reads species observations from CSV, selects the species to analyse,
//! runs the requested estimate, overlap, or trend, and hands back
//! serializable results for printing. All analysis defaults come from an
//! [`config::AnalysisConfig`].

pub mod config;
pub mod input;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use habitat_map_habitat::{
    HabitatEstimate, NoResult, estimate_habitat, overlap::overlap_habitats, trend,
};
use habitat_map_habitat_models::{
    HabitatAreaResult, HabitatMethod, HabitatOverlapResult, HabitatParams, HabitatTimePoint,
    KdeParams, OverlapTrendPoint, ParamError, TrendWindow,
};
use serde::Serialize;
use thiserror::Error;

use crate::input::ObservationRecord;

/// Errors that can stop a CLI run.
#[derive(Debug, Error)]
pub enum CliError {
    /// Reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The observation file could not be read as CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serializing results failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration file is malformed or holds invalid parameters.
    #[error("Config error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A command-line parameter is out of range.
    #[error("Invalid parameter: {0}")]
    Param(#[from] ParamError),
}

/// A home range, or the reason none could be estimated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HabitatOutput {
    /// The range was estimated.
    Estimated(Box<HabitatAreaResult>),
    /// The data could not support a range.
    NotEstimated {
        /// Species the estimate was attempted for.
        species_id: Option<i64>,
        /// Method that was attempted.
        method: HabitatMethod,
        /// Why no range was produced.
        reason: String,
    },
}

/// Estimates the home range of one species, or of every record when
/// `species_id` is `None`.
#[must_use]
pub fn habitat(
    records: &[ObservationRecord],
    species_id: Option<i64>,
    params: &HabitatParams,
) -> HabitatOutput {
    match estimate_for(records, species_id, params) {
        Ok(estimate) => HabitatOutput::Estimated(Box::new(estimate.into_area_result(species_id))),
        Err(reason) => HabitatOutput::NotEstimated {
            species_id,
            method: params.method(),
            reason: reason.to_string(),
        },
    }
}

/// Estimates both species' ranges with the same parameters and measures
/// their overlap.
///
/// A species without a range yields zero metrics and a note rather than
/// an error.
#[must_use]
pub fn overlap(
    records: &[ObservationRecord],
    species1_id: i64,
    species2_id: i64,
    params: &HabitatParams,
) -> HabitatOverlapResult {
    let first = estimate_for(records, Some(species1_id), params).ok();
    let second = estimate_for(records, Some(species2_id), params).ok();

    overlap_habitats(
        first.as_ref().map(|e| &e.polygon),
        second.as_ref().map(|e| &e.polygon),
    )
    .into_result(species1_id, species2_id, params.method())
}

/// Overlap of two species' KDE ranges at every step of `window`.
#[must_use]
pub fn overlap_trend(
    records: &[ObservationRecord],
    species1_id: i64,
    species2_id: i64,
    window: &TrendWindow,
    kde: &KdeParams,
) -> Vec<OverlapTrendPoint> {
    let observations = input::timed_observations(records);
    trend::overlap_trend(&observations, species1_id, species2_id, window, kde)
}

/// Centroid and KDE range of each species at every step of `window`.
#[must_use]
pub fn habitat_evolution(
    records: &[ObservationRecord],
    species_ids: &[i64],
    window: &TrendWindow,
    kde: &KdeParams,
) -> Vec<HabitatTimePoint> {
    let observations = input::timed_observations(records);
    trend::habitat_evolution(&observations, species_ids, window, kde)
}

fn estimate_for(
    records: &[ObservationRecord],
    species_id: Option<i64>,
    params: &HabitatParams,
) -> Result<HabitatEstimate, NoResult> {
    let points = input::points_for(records, species_id);
    log::info!(
        "Estimating {} range from {} observations{}",
        params.method(),
        points.len(),
        species_id.map_or_else(String::new, |id| format!(" of species {id}"))
    );
    estimate_habitat(&points, params).inspect_err(|reason| {
        log::info!("No {} range: {reason}", params.method());
    })
}

/// Parses an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
///
/// # Errors
///
/// Returns [`chrono::ParseError`] if `value` is neither.
pub fn parse_date(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::default()).and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;
    use habitat_map_habitat_models::McpParams;

    use super::*;

    const CSV: &str = "\
longitude,latitude,timestamp,species_id
0.0,0.0,2024-01-02T00:00:00Z,1
4.0,0.0,2024-01-02T00:00:00Z,1
4.0,4.0,2024-01-03T00:00:00Z,1
0.0,4.0,2024-01-03T00:00:00Z,1
2.0,2.0,2024-01-04T00:00:00Z,1
2.0,2.0,2024-01-02T00:00:00Z,2
6.0,2.0,2024-01-02T00:00:00Z,2
6.0,6.0,2024-01-03T00:00:00Z,2
2.0,6.0,2024-01-03T00:00:00Z,2
9.0,9.0,2024-01-03T00:00:00Z,3
";

    fn records() -> Vec<ObservationRecord> {
        input::parse_observations(CSV.as_bytes()).unwrap()
    }

    fn mcp() -> HabitatParams {
        HabitatParams::Mcp(McpParams::default())
    }

    #[test]
    fn habitat_for_one_species() {
        let HabitatOutput::Estimated(result) = habitat(&records(), Some(1), &mcp()) else {
            panic!("expected an estimate");
        };
        assert_eq!(result.species_id, Some(1));
        assert_eq!(result.source_observation_count, 5);
        assert!((result.area - 16.0).abs() < 1e-9);
    }

    #[test]
    fn sparse_species_reports_reason() {
        let output = habitat(&records(), Some(3), &mcp());
        let HabitatOutput::NotEstimated { reason, method, .. } = output else {
            panic!("expected no estimate");
        };
        assert_eq!(method, HabitatMethod::Mcp);
        assert!(reason.contains("insufficient points"), "{reason}");
    }

    #[test]
    fn overlap_of_offset_squares() {
        let result = overlap(&records(), 1, 2, &mcp());
        assert!(result.note.is_none());
        assert!((result.metrics.intersection_area - 4.0).abs() < 1e-9);
        assert!((result.metrics.union_area - 28.0).abs() < 1e-9);
        assert!((result.metrics.overlap_coefficient_1 - 0.25).abs() < 1e-9);
    }

    #[test]
    fn overlap_with_missing_species_is_zero() {
        let result = overlap(&records(), 1, 42, &mcp());
        assert_eq!(result.metrics.overlap_index, 0.0);
        assert!(result.note.is_some());
    }

    #[test]
    fn trend_runs_over_records() {
        let window = TrendWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap(),
            chrono::TimeDelta::days(2),
            chrono::TimeDelta::days(7),
        )
        .unwrap();
        let trend = overlap_trend(&records(), 1, 2, &window, &KdeParams::default());
        assert_eq!(trend.len(), 3);

        let evolution = habitat_evolution(&records(), &[1, 2, 3], &window, &KdeParams::default());
        assert_eq!(evolution.len(), 9);
        // Jan 1 looks back over the week before any sighting.
        assert_eq!(evolution[0].observation_count, 0);
        let last = evolution.last().unwrap();
        assert_eq!(last.species_id, 3);
        assert_eq!(last.observation_count, 1);
        assert_eq!(evolution[6].observation_count, 5);
    }

    #[test]
    fn parses_dates_and_timestamps() {
        assert_eq!(
            parse_date("2024-03-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_date("2024-03-01T06:30:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 4, 30, 0).unwrap()
        );
        assert!(parse_date("March 1st").is_err());
    }
}
