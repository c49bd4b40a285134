#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Observation, parameter, and result types for habitat range analysis.
//!
//! Parameter types ([`McpParams`], [`KdeParams`], [`TrendWindow`]) validate
//! their inputs at construction, including when they are deserialized from
//! a JSON or TOML parameter map, so the estimation engine never sees an
//! out-of-range value.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Default contour level for KDE home ranges.
pub const DEFAULT_LEVEL_PERCENT: f64 = 90.0;

/// Default number of evaluation nodes along each grid axis.
pub const DEFAULT_GRID_SIZE: u32 = 100;

/// Parameter validation failures.
///
/// These are rejected before any computation runs and are never silently
/// coerced into a valid value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    /// MCP trimming percentage outside `(0, 100]`.
    #[error("percentage must be in (0, 100], got {0}")]
    Percentage(f64),

    /// KDE contour level outside `(0, 100]`.
    #[error("level_percent must be in (0, 100], got {0}")]
    LevelPercent(f64),

    /// Explicit KDE bandwidth that is zero, negative, or not finite.
    #[error("bandwidth must be a positive finite number, got {0}")]
    Bandwidth(f64),

    /// Evaluation grid with fewer than two nodes per axis.
    #[error("grid_size must be greater than 1, got {0}")]
    GridSize(u32),

    /// Trend step that does not advance time.
    #[error("time_step must be positive, got {0}")]
    TimeStep(TimeDelta),

    /// Trend look-back window that is negative.
    #[error("observation_window must not be negative, got {0}")]
    ObservationWindow(TimeDelta),

    /// Trend range whose start lies after its end.
    #[error("start date {start} is after end date {end}")]
    DateRange {
        /// Requested start of the range.
        start: DateTime<Utc>,
        /// Requested end of the range.
        end: DateTime<Utc>,
    },

    /// Method name other than `mcp` or `kde`.
    #[error("unknown habitat method '{0}': expected 'mcp' or 'kde'")]
    UnknownMethod(String),
}

/// A bare `(longitude, latitude)` location in geographic degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservationPoint {
    /// Longitude (x).
    pub longitude: f64,
    /// Latitude (y).
    pub latitude: f64,
}

impl ObservationPoint {
    /// Creates a point from longitude and latitude.
    #[must_use]
    pub const fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Returns `true` if both coordinates are finite numbers.
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.longitude.is_finite() && self.latitude.is_finite()
    }
}

/// A time-stamped species sighting, as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Longitude in degrees.
    pub longitude: f64,
    /// Latitude in degrees.
    pub latitude: f64,
    /// When the sighting happened.
    pub timestamp: DateTime<Utc>,
    /// Species the sighting was attributed to.
    pub species_id: i64,
}

impl Observation {
    /// Returns the location of this sighting.
    #[must_use]
    pub const fn point(&self) -> ObservationPoint {
        ObservationPoint::new(self.longitude, self.latitude)
    }
}

/// Home range estimation method.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum HabitatMethod {
    /// Minimum Convex Polygon.
    Mcp,
    /// Kernel Density Estimation contour.
    Kde,
}

impl HabitatMethod {
    /// Parses a method name such as `"mcp"` or `"KDE"`.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError::UnknownMethod`] for anything else.
    pub fn parse(name: &str) -> Result<Self, ParamError> {
        name.trim()
            .parse()
            .map_err(|_| ParamError::UnknownMethod(name.to_string()))
    }
}

#[derive(Deserialize)]
struct RawMcpParams {
    #[serde(default)]
    percentage: Option<f64>,
}

/// Parameters for a Minimum Convex Polygon estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMcpParams")]
pub struct McpParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    percentage: Option<f64>,
}

impl McpParams {
    /// Creates MCP parameters.
    ///
    /// `percentage` keeps only the points whose distance from the centroid
    /// is within that percentile before the hull is taken.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError::Percentage`] if `percentage` is not in `(0, 100]`.
    pub fn new(percentage: Option<f64>) -> Result<Self, ParamError> {
        if let Some(p) = percentage
            && !(p.is_finite() && p > 0.0 && p <= 100.0)
        {
            return Err(ParamError::Percentage(p));
        }
        Ok(Self { percentage })
    }

    /// Outlier trimming percentile, if any.
    #[must_use]
    pub const fn percentage(&self) -> Option<f64> {
        self.percentage
    }
}

impl TryFrom<RawMcpParams> for McpParams {
    type Error = ParamError;

    fn try_from(raw: RawMcpParams) -> Result<Self, Self::Error> {
        Self::new(raw.percentage)
    }
}

const fn default_level_percent() -> f64 {
    DEFAULT_LEVEL_PERCENT
}

const fn default_grid_size() -> u32 {
    DEFAULT_GRID_SIZE
}

#[derive(Deserialize)]
struct RawKdeParams {
    #[serde(default)]
    bandwidth: Option<f64>,
    #[serde(default = "default_level_percent")]
    level_percent: f64,
    #[serde(default = "default_grid_size")]
    grid_size: u32,
}

/// Parameters for a kernel density home range estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawKdeParams")]
pub struct KdeParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    bandwidth: Option<f64>,
    level_percent: f64,
    grid_size: u32,
}

impl KdeParams {
    /// Creates KDE parameters.
    ///
    /// A `bandwidth` of `None` selects a rule-of-thumb bandwidth from the
    /// data at estimation time.
    ///
    /// # Errors
    ///
    /// Returns a [`ParamError`] if the bandwidth is not positive, the level
    /// is outside `(0, 100]`, or the grid has fewer than two nodes per axis.
    pub fn new(bandwidth: Option<f64>, level_percent: f64, grid_size: u32) -> Result<Self, ParamError> {
        if let Some(h) = bandwidth
            && !(h.is_finite() && h > 0.0)
        {
            return Err(ParamError::Bandwidth(h));
        }
        if !(level_percent.is_finite() && level_percent > 0.0 && level_percent <= 100.0) {
            return Err(ParamError::LevelPercent(level_percent));
        }
        if grid_size <= 1 {
            return Err(ParamError::GridSize(grid_size));
        }
        Ok(Self {
            bandwidth,
            level_percent,
            grid_size,
        })
    }

    /// Explicit kernel bandwidth in degrees, if one was supplied.
    #[must_use]
    pub const fn bandwidth(&self) -> Option<f64> {
        self.bandwidth
    }

    /// Share of the density surface (in percent) enclosed by the contour.
    #[must_use]
    pub const fn level_percent(&self) -> f64 {
        self.level_percent
    }

    /// Number of evaluation nodes along each axis.
    #[must_use]
    pub const fn grid_size(&self) -> u32 {
        self.grid_size
    }
}

impl Default for KdeParams {
    fn default() -> Self {
        Self {
            bandwidth: None,
            level_percent: DEFAULT_LEVEL_PERCENT,
            grid_size: DEFAULT_GRID_SIZE,
        }
    }
}

impl TryFrom<RawKdeParams> for KdeParams {
    type Error = ParamError;

    fn try_from(raw: RawKdeParams) -> Result<Self, Self::Error> {
        Self::new(raw.bandwidth, raw.level_percent, raw.grid_size)
    }
}

/// Method plus its validated parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum HabitatParams {
    /// Minimum Convex Polygon.
    Mcp(McpParams),
    /// Kernel Density Estimation.
    Kde(KdeParams),
}

impl HabitatParams {
    /// Returns the estimation method these parameters belong to.
    #[must_use]
    pub const fn method(&self) -> HabitatMethod {
        match self {
            Self::Mcp(_) => HabitatMethod::Mcp,
            Self::Kde(_) => HabitatMethod::Kde,
        }
    }
}

/// Date range, step, and look-back window for trend analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    time_step: TimeDelta,
    observation_window: TimeDelta,
}

impl TrendWindow {
    /// Creates a trend window.
    ///
    /// # Errors
    ///
    /// Returns a [`ParamError`] if `time_step` is not positive,
    /// `observation_window` is negative, or `start` is after `end`.
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        time_step: TimeDelta,
        observation_window: TimeDelta,
    ) -> Result<Self, ParamError> {
        if time_step <= TimeDelta::zero() {
            return Err(ParamError::TimeStep(time_step));
        }
        if observation_window < TimeDelta::zero() {
            return Err(ParamError::ObservationWindow(observation_window));
        }
        if start > end {
            return Err(ParamError::DateRange { start, end });
        }
        Ok(Self {
            start,
            end,
            time_step,
            observation_window,
        })
    }

    /// First step time.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Last time a step may fall on.
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Distance between consecutive steps.
    #[must_use]
    pub const fn time_step(&self) -> TimeDelta {
        self.time_step
    }

    /// Look-back length applied at each step.
    #[must_use]
    pub const fn observation_window(&self) -> TimeDelta {
        self.observation_window
    }

    /// Returns every step time from `start` through `end`, in order.
    #[must_use]
    pub fn step_times(&self) -> Vec<DateTime<Utc>> {
        let mut times = Vec::new();
        let mut current = self.start;
        while current <= self.end {
            times.push(current);
            match current.checked_add_signed(self.time_step) {
                Some(next) => current = next,
                None => break,
            }
        }
        times
    }

    /// Returns the inclusive `[step - observation_window, step]` bounds for a step.
    #[must_use]
    pub fn bounds_at(&self, step: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let from = step
            .checked_sub_signed(self.observation_window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        (from, step)
    }
}

/// A density value sampled on the KDE evaluation grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityGridSample {
    /// Latitude of the grid node.
    pub lat: f64,
    /// Longitude of the grid node.
    pub lng: f64,
    /// Estimated density at the node.
    pub density: f64,
}

/// Set-theoretic overlap between two habitat polygons.
///
/// `intersection_area`, `union_area`, and `overlap_index` are symmetric in
/// the two inputs. `overlap_coefficient_1` and `overlap_coefficient_2` are
/// not: each divides the intersection by its own polygon's area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlapMetrics {
    /// Area shared by both polygons (degrees²).
    pub intersection_area: f64,
    /// Area covered by either polygon (degrees²).
    pub union_area: f64,
    /// Jaccard index: intersection over union.
    pub overlap_index: f64,
    /// Intersection over the first polygon's area.
    pub overlap_coefficient_1: f64,
    /// Intersection over the second polygon's area.
    pub overlap_coefficient_2: f64,
}

/// One step of an overlap trend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlapTrendPoint {
    /// End of the observation window this step covers.
    pub time: DateTime<Utc>,
    /// Intersection area of the two species' KDE polygons.
    pub overlap_area: f64,
    /// Jaccard index of the two species' KDE polygons.
    pub overlap_index: f64,
}

/// One species' habitat snapshot at one step of a habitat evolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitatTimePoint {
    /// End of the observation window this step covers.
    pub time: DateTime<Utc>,
    /// Species the snapshot belongs to.
    pub species_id: i64,
    /// Mean location of the window's observations, as a `GeoJSON` `Point`.
    pub centroid: Option<geojson::Geometry>,
    /// KDE habitat polygon for the window, if one could be estimated.
    pub polygon: Option<geojson::Geometry>,
    /// Number of the species' observations inside the window.
    pub observation_count: usize,
}

/// A computed home range, ready to hand to a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitatAreaResult {
    /// Species the range was computed for, when known.
    pub species_id: Option<i64>,
    /// Method and parameters used.
    pub parameters: HabitatParams,
    /// Number of observations fed into the estimate.
    pub source_observation_count: usize,
    /// Planar area in degrees².
    pub area: f64,
    /// Geodesic area in km².
    pub area_km2: f64,
    /// Home range as a `GeoJSON` `Polygon` or `MultiPolygon`.
    pub polygon: geojson::Geometry,
    /// Kernel bandwidth actually used (KDE only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<f64>,
    /// Maximum grid density (KDE only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_density: Option<f64>,
    /// Non-negligible grid samples (KDE only, bounded grids only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub density_samples: Option<Vec<DensityGridSample>>,
}

/// Overlap between two species' home ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitatOverlapResult {
    /// First species; `overlap_coefficient_1` belongs to it.
    pub species1_id: i64,
    /// Second species; `overlap_coefficient_2` belongs to it.
    pub species2_id: i64,
    /// Method used to build both home ranges.
    pub method: HabitatMethod,
    /// Overlap metrics in degrees².
    #[serde(flatten)]
    pub metrics: OverlapMetrics,
    /// Geodesic intersection area in km².
    pub intersection_area_km2: f64,
    /// Geodesic union area in km².
    pub union_area_km2: f64,
    /// Shared region, when non-empty.
    pub intersection_geometry: Option<geojson::Geometry>,
    /// Why the metrics are zero, when an input range was unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
