//! Minimum Convex Polygon home ranges.
//!
//! The optional percentage trim ranks points by planar distance from the
//! centroid of all points and keeps those at or below that percentile of
//! distance. This is a simpler rule than trimming by distance from a
//! density peak, and is kept as-is.

use geo::{Area, ConvexHull, Coord, MultiPoint, MultiPolygon, Point, Validation};
use habitat_map_habitat_models::{HabitatParams, McpParams, ObservationPoint};

use crate::{HabitatPolygon, NoResult, finite_points, require_distinct, stats};

/// Computes the convex hull of `points`, optionally trimming outliers first.
///
/// # Errors
///
/// * [`NoResult::InsufficientPoints`] if fewer than three distinct points
///   are available before or after trimming
/// * [`NoResult::Collinear`] if the hull has no area
pub fn calculate_mcp(
    points: &[ObservationPoint],
    params: &McpParams,
) -> Result<HabitatPolygon, NoResult> {
    let points = finite_points(points);
    require_distinct(&points)?;

    let retained = match params.percentage() {
        Some(percentage) => {
            let trimmed = trim_by_centroid_distance(&points, percentage);
            log::debug!(
                "MCP {percentage}% trim kept {} of {} points",
                trimmed.len(),
                points.len()
            );
            require_distinct(&trimmed)?;
            trimmed
        }
        None => points.clone(),
    };

    let hull = MultiPoint::from(
        retained
            .iter()
            .map(|p| Point::new(p.longitude, p.latitude))
            .collect::<Vec<_>>(),
    )
    .convex_hull();

    // A hull of collinear points collapses to a segment: fewer than three
    // distinct vertices, or no enclosed area.
    if hull.exterior().0.len() < 4 || hull.unsigned_area() <= 0.0 || !hull.is_valid() {
        log::info!("MCP hull of {} points is degenerate", retained.len());
        return Err(NoResult::Collinear);
    }

    Ok(HabitatPolygon::new(
        MultiPolygon::new(vec![hull]),
        HabitatParams::Mcp(*params),
        points.len(),
    ))
}

/// Keeps the points whose distance from the centroid is at or below the
/// `percentage`-th percentile of all such distances.
#[must_use]
pub fn trim_by_centroid_distance(
    points: &[ObservationPoint],
    percentage: f64,
) -> Vec<ObservationPoint> {
    let Some(centroid) = centroid(points) else {
        return Vec::new();
    };

    let distances: Vec<f64> = points
        .iter()
        .map(|p| (p.longitude - centroid.x).hypot(p.latitude - centroid.y))
        .collect();

    let Some(cutoff) = stats::percentile(&distances, percentage) else {
        return Vec::new();
    };

    points
        .iter()
        .zip(&distances)
        .filter(|&(_, &d)| d <= cutoff)
        .map(|(p, _)| *p)
        .collect()
}

/// Mean location of the points.
fn centroid(points: &[ObservationPoint]) -> Option<Coord<f64>> {
    let xs: Vec<f64> = points.iter().map(|p| p.longitude).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.latitude).collect();
    Some(Coord {
        x: stats::mean(&xs)?,
        y: stats::mean(&ys)?,
    })
}

#[cfg(test)]
mod tests {
    use geo::{Intersects, IsConvex};

    use super::*;

    fn hull_of(
        points: &[ObservationPoint],
        params: &McpParams,
    ) -> Result<MultiPolygon<f64>, NoResult> {
        calculate_mcp(points, params).map(HabitatPolygon::into_geometry)
    }

    fn pts(coords: &[(f64, f64)]) -> Vec<ObservationPoint> {
        coords
            .iter()
            .map(|&(x, y)| ObservationPoint::new(x, y))
            .collect()
    }

    fn sorted_vertices(geometry: &MultiPolygon<f64>) -> Vec<(f64, f64)> {
        let ring = &geometry.0[0].exterior().0;
        let mut vertices: Vec<(f64, f64)> = ring[..ring.len() - 1].iter().map(|c| (c.x, c.y)).collect();
        vertices.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
        vertices
    }

    #[test]
    fn square_with_interior_point() {
        let points = pts(&[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (2.0, 2.0)]);
        let habitat = calculate_mcp(&points, &McpParams::default()).unwrap();

        assert!((habitat.area() - 16.0).abs() < 1e-9);
        assert_eq!(habitat.source_observation_count(), 5);
        assert_eq!(habitat.geometry().0.len(), 1);
        assert_eq!(
            sorted_vertices(habitat.geometry()),
            vec![(0.0, 0.0), (0.0, 4.0), (4.0, 0.0), (4.0, 4.0)]
        );
    }

    #[test]
    fn hull_contains_every_input_point() {
        let points = pts(&[
            (-1.5, 0.2),
            (0.3, 2.1),
            (2.2, -0.7),
            (1.1, 1.1),
            (-0.4, -1.9),
            (0.0, 0.0),
            (3.0, 1.5),
        ]);
        let geometry = hull_of(&points, &McpParams::default()).unwrap();
        assert!(geometry.is_valid());
        assert_eq!(geometry.0.len(), 1);
        assert!(
            geometry.0[0].exterior().is_convex(),
            "hull ring should be convex: {:?}",
            geometry.0[0].exterior()
        );
        for p in &points {
            assert!(
                geometry.intersects(&Point::new(p.longitude, p.latitude)),
                "hull should contain {p:?}"
            );
        }
    }

    #[test]
    fn full_percentage_equals_untrimmed_hull() {
        let points = pts(&[(0.0, 0.0), (5.0, 1.0), (4.0, 6.0), (-1.0, 3.0), (2.0, 2.0)]);
        let untrimmed = hull_of(&points, &McpParams::default()).unwrap();
        let full = hull_of(&points, &McpParams::new(Some(100.0)).unwrap()).unwrap();
        assert_eq!(untrimmed, full);
    }

    #[test]
    fn trimming_drops_far_outlier() {
        let mut points = pts(&[
            (0.0, 0.0),
            (1.0, 0.0),
            (1.0, 1.0),
            (0.0, 1.0),
            (0.5, 0.5),
            (0.2, 0.8),
            (0.8, 0.3),
            (0.4, 0.1),
            (0.6, 0.9),
        ]);
        points.push(ObservationPoint::new(50.0, 50.0));

        let untrimmed = calculate_mcp(&points, &McpParams::default()).unwrap();
        let trimmed = calculate_mcp(&points, &McpParams::new(Some(90.0)).unwrap()).unwrap();

        assert!(trimmed.area() < untrimmed.area());
        assert!(!trimmed.geometry().intersects(&Point::new(50.0, 50.0)));
    }

    #[test]
    fn trim_keeps_points_within_percentile() {
        let points = pts(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (0.0, -10.0)]);
        let kept = trim_by_centroid_distance(&points, 80.0);
        assert_eq!(kept.len(), 4);
        assert!(!kept.contains(&ObservationPoint::new(0.0, -10.0)));
    }

    #[test]
    fn collinear_points_have_no_hull() {
        let points = pts(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]);
        assert_eq!(
            calculate_mcp(&points, &McpParams::default()),
            Err(NoResult::Collinear)
        );
    }

    #[test]
    fn tiny_hull_is_still_a_range() {
        let points = pts(&[(10.0, 45.0), (10.00001, 45.0), (10.0, 45.00001)]);
        let habitat = calculate_mcp(&points, &McpParams::default()).unwrap();
        assert!(habitat.area() > 0.0);
        assert!(habitat.area() < 1e-9);
        assert!(habitat.geometry().is_valid());
    }

    #[test]
    fn too_few_points_after_trim() {
        let points = pts(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (5.0, 5.0)]);
        let result = calculate_mcp(&points, &McpParams::new(Some(10.0)).unwrap());
        assert!(matches!(result, Err(NoResult::InsufficientPoints { .. })));
    }

    #[test]
    fn fewer_than_three_points() {
        let points = pts(&[(0.0, 0.0), (1.0, 1.0)]);
        assert_eq!(
            calculate_mcp(&points, &McpParams::default()),
            Err(NoResult::InsufficientPoints {
                required: 3,
                found: 2
            })
        );
    }
}
