//! Overlap metrics between two habitat polygons.
//!
//! Overlap is often computed speculatively across many species pairs, so
//! a missing or invalid input never fails: it yields all-zero metrics and
//! an [`OverlapSkip`] describing which side was unusable.

use geo::{Area, BooleanOps, GeodesicArea, MultiPolygon};
use habitat_map_habitat_models::{HabitatMethod, HabitatOverlapResult, OverlapMetrics};
use thiserror::Error;

use crate::{HabitatPolygon, multi_polygon_to_geojson, validate};

/// Why an overlap was reported as zero without being computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OverlapSkip {
    /// The first polygon was not supplied.
    #[error("first habitat polygon is missing")]
    FirstMissing,
    /// The second polygon was not supplied.
    #[error("second habitat polygon is missing")]
    SecondMissing,
    /// The first polygon is invalid or has no area.
    #[error("first habitat polygon is invalid")]
    FirstInvalid,
    /// The second polygon is invalid or has no area.
    #[error("second habitat polygon is invalid")]
    SecondInvalid,
}

/// Overlap metrics plus the shared geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlap {
    /// Planar metrics in degrees².
    pub metrics: OverlapMetrics,
    /// Geodesic intersection area in km².
    pub intersection_area_km2: f64,
    /// Geodesic union area in km².
    pub union_area_km2: f64,
    /// The shared region, when it has area.
    pub intersection: Option<MultiPolygon<f64>>,
    /// Set when the metrics are zero because an input was unusable.
    pub skipped: Option<OverlapSkip>,
}

impl Overlap {
    fn skipped(reason: OverlapSkip) -> Self {
        log::debug!("Overlap skipped: {reason}");
        Self {
            metrics: OverlapMetrics::default(),
            intersection_area_km2: 0.0,
            union_area_km2: 0.0,
            intersection: None,
            skipped: Some(reason),
        }
    }

    /// Packages the overlap for a caller, labelling which species each
    /// directional coefficient belongs to.
    #[must_use]
    pub fn into_result(
        self,
        species1_id: i64,
        species2_id: i64,
        method: HabitatMethod,
    ) -> HabitatOverlapResult {
        HabitatOverlapResult {
            species1_id,
            species2_id,
            method,
            metrics: self.metrics,
            intersection_area_km2: self.intersection_area_km2,
            union_area_km2: self.union_area_km2,
            intersection_geometry: self.intersection.as_ref().map(multi_polygon_to_geojson),
            note: self.skipped.map(|reason| reason.to_string()),
        }
    }
}

/// Computes intersection, union, Jaccard index, and both directional
/// overlap coefficients.
///
/// `overlap_coefficient_1` is the intersection over `first`'s area and
/// `overlap_coefficient_2` the intersection over `second`'s.
#[must_use]
pub fn calculate_overlap(
    first: Option<&MultiPolygon<f64>>,
    second: Option<&MultiPolygon<f64>>,
) -> Overlap {
    let Some(first) = first else {
        return Overlap::skipped(OverlapSkip::FirstMissing);
    };
    let Some(second) = second else {
        return Overlap::skipped(OverlapSkip::SecondMissing);
    };
    if !validate::is_usable(first) {
        return Overlap::skipped(OverlapSkip::FirstInvalid);
    }
    if !validate::is_usable(second) {
        return Overlap::skipped(OverlapSkip::SecondInvalid);
    }

    let intersection = first.intersection(second);
    let union = first.union(second);

    let intersection_area = intersection.unsigned_area();
    let union_area = union.unsigned_area();
    let first_area = first.unsigned_area();
    let second_area = second.unsigned_area();

    let overlap_index = if union_area > 0.0 {
        intersection_area / union_area
    } else {
        0.0
    };

    let intersection_area_km2 = intersection.geodesic_area_unsigned() / 1_000_000.0;
    let union_area_km2 = union.geodesic_area_unsigned() / 1_000_000.0;

    Overlap {
        metrics: OverlapMetrics {
            intersection_area,
            union_area,
            overlap_index,
            overlap_coefficient_1: intersection_area / first_area,
            overlap_coefficient_2: intersection_area / second_area,
        },
        intersection_area_km2,
        union_area_km2,
        intersection: (intersection_area > 0.0).then_some(intersection),
        skipped: None,
    }
}

/// [`calculate_overlap`] for two estimated home ranges, either of which
/// may be absent.
#[must_use]
pub fn overlap_habitats(
    first: Option<&HabitatPolygon>,
    second: Option<&HabitatPolygon>,
) -> Overlap {
    calculate_overlap(
        first.map(HabitatPolygon::geometry),
        second.map(HabitatPolygon::geometry),
    )
}
