//! Validity checks and repair for polygons produced by numerical steps.
//!
//! Contour tracing and hull construction can emit self-touching rings or
//! slivers with no meaningful area. Everything returned to callers passes
//! through here first.

use geo::{Area, BooleanOps, MultiPolygon, Polygon, Validation};

/// Parts smaller than this (degrees²) are treated as slivers and dropped.
pub const MIN_AREA: f64 = 1e-9;

/// Returns `true` if the geometry is valid, non-empty, and has positive
/// area.
///
/// The [`MIN_AREA`] sliver cutoff is not applied here; it only governs
/// which traced contour parts are kept.
#[must_use]
pub fn is_usable(geometry: &MultiPolygon<f64>) -> bool {
    !geometry.0.is_empty() && geometry.is_valid() && geometry.unsigned_area() > 0.0
}

/// Resolves self-intersections by overlaying the polygon with itself.
///
/// The overlay rebuilds the rings from their actual crossings, which splits
/// a bow-tie into its two lobes and removes zero-width spikes.
#[must_use]
pub fn repair(polygon: &Polygon<f64>) -> MultiPolygon<f64> {
    polygon.union(polygon)
}

/// Validates a candidate polygon, repairing it if needed.
///
/// Returns the usable parts, or `None` when nothing with positive area
/// survives repair.
#[must_use]
pub fn validate_polygon(polygon: Polygon<f64>) -> Option<MultiPolygon<f64>> {
    if polygon.is_valid() && polygon.unsigned_area() > MIN_AREA {
        return Some(MultiPolygon::new(vec![polygon]));
    }

    let repaired = drop_slivers(repair(&polygon));
    if is_usable(&repaired) {
        log::debug!("Repaired invalid polygon into {} part(s)", repaired.0.len());
        Some(repaired)
    } else {
        None
    }
}

/// Removes parts whose area is at or below [`MIN_AREA`].
#[must_use]
pub fn drop_slivers(geometry: MultiPolygon<f64>) -> MultiPolygon<f64> {
    geometry
        .into_iter()
        .filter(|part| part.unsigned_area() > MIN_AREA)
        .collect()
}
