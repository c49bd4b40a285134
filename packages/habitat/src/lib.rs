#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Home range estimation and habitat overlap analysis.
//!
//! Given geolocated species observations, estimates a home range polygon
//! with either a Minimum Convex Polygon ([`mcp`]) or a kernel density
//! contour ([`kde`]), measures how two ranges overlap ([`overlap`]), and
//! replays both over a sliding series of date windows ([`trend`]).
//!
//! Every function here is pure and synchronous. Coordinates are treated as
//! planar degrees; callers who need metric accuracy should project their
//! points before handing them over.
//!
//! Sparse or degenerate input is not an error: estimators return
//! [`NoResult`] so that batch callers can carry on with the next species
//! or window. Parameter validation happens earlier, when the parameter
//! types in [`habitat_map_habitat_models`] are constructed.

pub mod contour;
pub mod density;
pub mod kde;
pub mod mcp;
pub mod overlap;
pub mod stats;
pub mod trend;
pub mod validate;

use std::collections::BTreeSet;

use geo::{Area, GeodesicArea, MultiPolygon};
use habitat_map_habitat_models::{
    DensityGridSample, HabitatAreaResult, HabitatMethod, HabitatParams, ObservationPoint,
};
use thiserror::Error;

/// Minimum number of distinct points needed to build a polygon.
pub const MIN_POINTS: usize = 3;

/// Why an estimator produced no polygon.
///
/// None of these are failures of the caller: they describe data that
/// cannot support a home range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NoResult {
    /// Fewer distinct points than an estimate needs.
    #[error("insufficient points: {found} distinct, {required} required")]
    InsufficientPoints {
        /// Minimum distinct points required.
        required: usize,
        /// Distinct points available.
        found: usize,
    },

    /// The points are collinear (or coincident), so their hull has no area.
    #[error("points are collinear; hull has no area")]
    Collinear,

    /// The density surface is flat, so no contour separates high from low.
    #[error("density surface is flat")]
    FlatDensity,

    /// No closed contour exists at the requested level.
    #[error("no closed contour at the requested level")]
    NoContour,

    /// Contours were traced but none survived validation and repair.
    #[error("no contour could be repaired into a valid polygon")]
    RepairFailed,
}

/// An estimated home range plus the provenance needed to reproduce it.
///
/// The geometry is always valid and has strictly positive area. MCP
/// estimates hold exactly one polygon; KDE estimates may hold several
/// when the density surface is multi-modal.
#[derive(Debug, Clone, PartialEq)]
pub struct HabitatPolygon {
    geometry: MultiPolygon<f64>,
    params: HabitatParams,
    source_observation_count: usize,
}

impl HabitatPolygon {
    pub(crate) const fn new(
        geometry: MultiPolygon<f64>,
        params: HabitatParams,
        source_observation_count: usize,
    ) -> Self {
        Self {
            geometry,
            params,
            source_observation_count,
        }
    }

    /// The home range geometry in degrees.
    #[must_use]
    pub const fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    /// Consumes the estimate, returning only its geometry.
    #[must_use]
    pub fn into_geometry(self) -> MultiPolygon<f64> {
        self.geometry
    }

    /// Estimation method.
    #[must_use]
    pub const fn method(&self) -> HabitatMethod {
        self.params.method()
    }

    /// Parameters the estimate was computed with.
    #[must_use]
    pub const fn params(&self) -> &HabitatParams {
        &self.params
    }

    /// Number of observations the estimate was computed from.
    #[must_use]
    pub const fn source_observation_count(&self) -> usize {
        self.source_observation_count
    }

    /// Planar area in degrees².
    #[must_use]
    pub fn area(&self) -> f64 {
        self.geometry.unsigned_area()
    }

    /// Geodesic area on the WGS84 ellipsoid, in km².
    #[must_use]
    pub fn area_km2(&self) -> f64 {
        self.geometry.geodesic_area_unsigned() / 1_000_000.0
    }

    /// Converts the geometry to `GeoJSON`: a `Polygon` when there is a
    /// single part, a `MultiPolygon` otherwise.
    #[must_use]
    pub fn to_geojson(&self) -> geojson::Geometry {
        multi_polygon_to_geojson(&self.geometry)
    }
}

/// Diagnostics that accompany a KDE estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct KdeDiagnostics {
    /// Kernel bandwidth in degrees, either supplied or estimated.
    pub bandwidth: f64,
    /// Highest density on the evaluation grid.
    pub max_density: f64,
    /// Grid nodes with non-negligible density, omitted for large grids.
    pub density_samples: Option<Vec<DensityGridSample>>,
}

/// A home range together with any method-specific diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct HabitatEstimate {
    /// The estimated range.
    pub polygon: HabitatPolygon,
    /// Present for KDE estimates only.
    pub diagnostics: Option<KdeDiagnostics>,
}

impl HabitatEstimate {
    /// Packages the estimate for a caller.
    #[must_use]
    pub fn into_area_result(self, species_id: Option<i64>) -> HabitatAreaResult {
        let (bandwidth, max_density, density_samples) = match self.diagnostics {
            Some(d) => (Some(d.bandwidth), Some(d.max_density), d.density_samples),
            None => (None, None, None),
        };
        HabitatAreaResult {
            species_id,
            parameters: *self.polygon.params(),
            source_observation_count: self.polygon.source_observation_count(),
            area: self.polygon.area(),
            area_km2: self.polygon.area_km2(),
            polygon: self.polygon.to_geojson(),
            bandwidth,
            max_density,
            density_samples,
        }
    }
}

/// Estimates a home range with whichever method `params` selects.
///
/// # Errors
///
/// Returns [`NoResult`] when the points cannot support a polygon.
pub fn estimate_habitat(
    points: &[ObservationPoint],
    params: &HabitatParams,
) -> Result<HabitatEstimate, NoResult> {
    match params {
        HabitatParams::Mcp(mcp_params) => Ok(HabitatEstimate {
            polygon: mcp::calculate_mcp(points, mcp_params)?,
            diagnostics: None,
        }),
        HabitatParams::Kde(kde_params) => kde::calculate_kde(points, kde_params),
    }
}

/// Converts a multi-polygon to `GeoJSON`, collapsing single parts to a
/// plain `Polygon`.
#[must_use]
pub fn multi_polygon_to_geojson(geometry: &MultiPolygon<f64>) -> geojson::Geometry {
    let value = match geometry.0.as_slice() {
        [single] => geojson::Value::from(single),
        _ => geojson::Value::from(geometry),
    };
    geojson::Geometry::new(value)
}

/// Drops points with non-finite coordinates.
pub(crate) fn finite_points(points: &[ObservationPoint]) -> Vec<ObservationPoint> {
    let finite: Vec<ObservationPoint> = points.iter().copied().filter(ObservationPoint::is_finite).collect();
    let dropped = points.len() - finite.len();
    if dropped > 0 {
        log::warn!("Skipping {dropped} observations with non-finite coordinates");
    }
    finite
}

/// Counts points with distinct coordinates.
pub(crate) fn distinct_count(points: &[ObservationPoint]) -> usize {
    // Adding 0.0 folds -0.0 into 0.0 before comparing bit patterns.
    points
        .iter()
        .map(|p| ((p.longitude + 0.0).to_bits(), (p.latitude + 0.0).to_bits()))
        .collect::<BTreeSet<_>>()
        .len()
}

/// Fails with [`NoResult::InsufficientPoints`] below [`MIN_POINTS`]
/// distinct points.
pub(crate) fn require_distinct(points: &[ObservationPoint]) -> Result<(), NoResult> {
    let found = distinct_count(points);
    if found < MIN_POINTS {
        log::info!("Not enough distinct points for a home range ({found} < {MIN_POINTS})");
        return Err(NoResult::InsufficientPoints {
            required: MIN_POINTS,
            found,
        });
    }
    Ok(())
}
