//! Iso-density contour extraction with marching squares.
//!
//! The density grid is surrounded by a virtual ring of zero-density nodes
//! one step outside its edges, so every traced contour closes into a ring
//! even when the inside region touches the grid boundary. Crossing points
//! are keyed by the grid edge they lie on, which makes ring assembly an
//! exact lookup instead of a floating-point match.
//!
//! Each closed ring becomes a candidate polygon. Nested rings (holes in the
//! density surface) are filled by the final union, so the result is the
//! outer envelope of every region above the threshold.

use std::collections::HashMap;

use geo::{Area, BooleanOps, Coord, LineString, MultiPolygon, Polygon};

use crate::density::DensityGrid;
use crate::validate::{self, MIN_AREA};
use crate::{NoResult, stats};

/// Density threshold enclosing `level_percent` of the grid.
///
/// The `(100 - level_percent)`-th percentile of all grid densities, so a
/// level of 90 keeps the densest 90% of grid nodes inside the contour.
#[must_use]
pub fn density_threshold(grid: &DensityGrid, level_percent: f64) -> Option<f64> {
    stats::percentile(grid.values(), 100.0 - level_percent)
}

/// Lifts a zero threshold to half the smallest positive density.
///
/// Only nodes whose kernel sum underflows `f64` hold exactly zero, and the
/// threshold is zero only when more than `100 - level_percent` percent of
/// the grid does. Contouring at zero would pin every crossing onto those
/// nodes and make neighbouring rings touch, so the line is drawn just
/// above them instead.
fn lift_zero_threshold(grid: &DensityGrid, threshold: f64) -> Option<f64> {
    if threshold > 0.0 {
        return Some(threshold);
    }
    grid.values()
        .iter()
        .copied()
        .filter(|&v| v > 0.0)
        .reduce(f64::min)
        .map(|v| v / 2.0)
}

/// A grid edge between two adjacent nodes of the padded grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EdgeKey {
    /// From node `(col, row)` to `(col + 1, row)`.
    Horizontal(usize, usize),
    /// From node `(col, row)` to `(col, row + 1)`.
    Vertical(usize, usize),
}

/// The density grid plus its virtual zero border.
struct PaddedGrid<'a> {
    grid: &'a DensityGrid,
    cols: usize,
    rows: usize,
    dx: f64,
    dy: f64,
}

impl<'a> PaddedGrid<'a> {
    fn new(grid: &'a DensityGrid) -> Self {
        let xs = grid.xs();
        let ys = grid.ys();
        Self {
            grid,
            cols: xs.len() + 2,
            rows: ys.len() + 2,
            dx: xs[1] - xs[0],
            dy: ys[1] - ys[0],
        }
    }

    fn value(&self, col: usize, row: usize) -> f64 {
        if col == 0 || row == 0 || col == self.cols - 1 || row == self.rows - 1 {
            0.0
        } else {
            self.grid.value(row - 1, col - 1)
        }
    }

    fn x(&self, col: usize) -> f64 {
        let xs = self.grid.xs();
        if col == 0 {
            xs[0] - self.dx
        } else if col == self.cols - 1 {
            xs[xs.len() - 1] + self.dx
        } else {
            xs[col - 1]
        }
    }

    fn y(&self, row: usize) -> f64 {
        let ys = self.grid.ys();
        if row == 0 {
            ys[0] - self.dy
        } else if row == self.rows - 1 {
            ys[ys.len() - 1] + self.dy
        } else {
            ys[row - 1]
        }
    }

    /// Where the contour crosses `edge`, by linear interpolation.
    fn crossing(&self, edge: EdgeKey, threshold: f64) -> Coord<f64> {
        let ((c0, r0), (c1, r1)) = match edge {
            EdgeKey::Horizontal(c, r) => ((c, r), (c + 1, r)),
            EdgeKey::Vertical(c, r) => ((c, r), (c, r + 1)),
        };
        let v0 = self.value(c0, r0);
        let v1 = self.value(c1, r1);
        let t = if (v1 - v0).abs() > 0.0 {
            ((threshold - v0) / (v1 - v0)).clamp(0.0, 1.0)
        } else {
            0.5
        };
        let (x0, y0) = (self.x(c0), self.y(r0));
        let (x1, y1) = (self.x(c1), self.y(r1));
        Coord {
            x: t.mul_add(x1 - x0, x0),
            y: t.mul_add(y1 - y0, y0),
        }
    }
}

/// Traces the closed iso-lines at `threshold`.
///
/// A node is inside when its density is strictly above the threshold.
/// Every returned ring is closed and has at least three distinct vertices.
#[must_use]
pub fn trace_contours(grid: &DensityGrid, threshold: f64) -> Vec<LineString<f64>> {
    if grid.xs().len() < 2 || grid.ys().len() < 2 {
        return Vec::new();
    }
    let padded = PaddedGrid::new(grid);
    let segments = cell_segments(&padded, threshold);
    assemble_rings(&segments)
        .into_iter()
        .filter(|ring| ring.len() >= 3)
        .map(|ring| {
            let mut coords: Vec<Coord<f64>> = ring
                .iter()
                .map(|&edge| padded.crossing(edge, threshold))
                .collect();
            coords.push(coords[0]);
            LineString::new(coords)
        })
        .collect()
}

/// Emits one or two segments per cell that the contour passes through.
fn cell_segments(padded: &PaddedGrid<'_>, threshold: f64) -> Vec<(EdgeKey, EdgeKey)> {
    let mut segments = Vec::new();

    for row in 0..padded.rows - 1 {
        for col in 0..padded.cols - 1 {
            let bl = padded.value(col, row);
            let br = padded.value(col + 1, row);
            let tr = padded.value(col + 1, row + 1);
            let tl = padded.value(col, row + 1);

            let case = u8::from(bl > threshold)
                | (u8::from(br > threshold) << 1)
                | (u8::from(tr > threshold) << 2)
                | (u8::from(tl > threshold) << 3);

            let bottom = EdgeKey::Horizontal(col, row);
            let top = EdgeKey::Horizontal(col, row + 1);
            let left = EdgeKey::Vertical(col, row);
            let right = EdgeKey::Vertical(col + 1, row);

            match case {
                0 | 15 => {}
                1 | 14 => segments.push((left, bottom)),
                2 | 13 => segments.push((bottom, right)),
                4 | 11 => segments.push((right, top)),
                8 | 7 => segments.push((top, left)),
                3 | 12 => segments.push((left, right)),
                6 | 9 => segments.push((bottom, top)),
                5 | 10 => {
                    // Saddle: the cell centre decides which diagonal pair connects.
                    let centre_inside = (bl + br + tr + tl) / 4.0 > threshold;
                    let bl_tr_inside = case == 5;
                    if centre_inside == bl_tr_inside {
                        // Cut off the br and tl corners.
                        segments.push((bottom, right));
                        segments.push((top, left));
                    } else {
                        // Cut off the bl and tr corners.
                        segments.push((left, bottom));
                        segments.push((right, top));
                    }
                }
                _ => unreachable!("marching squares case is a 4-bit value"),
            }
        }
    }

    segments
}

/// Links segments that share a grid edge into closed rings.
///
/// Every crossed edge is shared by exactly two cells, so each edge key
/// joins exactly two segments and every walk returns to its start.
fn assemble_rings(segments: &[(EdgeKey, EdgeKey)]) -> Vec<Vec<EdgeKey>> {
    let mut incident: HashMap<EdgeKey, Vec<usize>> = HashMap::new();
    for (i, &(a, b)) in segments.iter().enumerate() {
        incident.entry(a).or_default().push(i);
        incident.entry(b).or_default().push(i);
    }

    let mut visited = vec![false; segments.len()];
    let mut rings = Vec::new();

    for start in 0..segments.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;

        let (first, mut current) = segments[start];
        let mut ring = vec![first, current];
        let mut closed = false;

        loop {
            let next = incident
                .get(&current)
                .and_then(|ids| ids.iter().copied().find(|&j| !visited[j]));
            let Some(next) = next else {
                break;
            };
            visited[next] = true;

            let (a, b) = segments[next];
            current = if a == current { b } else { a };
            if current == first {
                closed = true;
                break;
            }
            ring.push(current);
        }

        if closed {
            rings.push(ring);
        } else {
            log::warn!("Discarding open contour line with {} vertices", ring.len());
        }
    }

    rings
}

/// Extracts the habitat region enclosing `level_percent` of the density
/// surface.
///
/// Traced rings are validated (and repaired if needed), slivers below
/// [`MIN_AREA`] are dropped, and the survivors are unioned.
///
/// # Errors
///
/// * [`NoResult::FlatDensity`] if the surface has no variation
/// * [`NoResult::NoContour`] if no closed contour exists at the threshold
/// * [`NoResult::RepairFailed`] if no traced ring yields a valid polygon
pub fn extract_contour(
    grid: &DensityGrid,
    level_percent: f64,
) -> Result<MultiPolygon<f64>, NoResult> {
    let max = grid.max_density();
    let min = grid.min_density();
    if max <= 0.0 || max - min <= max * f64::EPSILON {
        log::info!("Density surface is flat (min {min}, max {max}); no contour");
        return Err(NoResult::FlatDensity);
    }

    let threshold = density_threshold(grid, level_percent)
        .and_then(|t| lift_zero_threshold(grid, t))
        .ok_or(NoResult::NoContour)?;
    let rings = trace_contours(grid, threshold);
    log::debug!(
        "Traced {} contour ring(s) at density {threshold} ({level_percent}% level)",
        rings.len()
    );
    if rings.is_empty() {
        log::info!("No closed contour at density {threshold}");
        return Err(NoResult::NoContour);
    }

    let traced = rings.len();
    let parts: Vec<MultiPolygon<f64>> = rings
        .into_iter()
        .filter_map(|ring| {
            let candidate = validate::validate_polygon(Polygon::new(ring, vec![]));
            if candidate.is_none() {
                log::warn!("Dropping contour ring that could not be made valid");
            }
            candidate
        })
        .collect();

    if parts.is_empty() {
        log::info!("None of {traced} contour ring(s) survived validation");
        return Err(NoResult::RepairFailed);
    }

    let merged = validate::drop_slivers(
        parts
            .iter()
            .skip(1)
            .fold(parts[0].clone(), |acc, part| acc.union(part)),
    );

    if merged.0.is_empty() || merged.unsigned_area() <= MIN_AREA {
        return Err(NoResult::RepairFailed);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use geo::{Contains, Point, Validation};
    use habitat_map_habitat_models::ObservationPoint;

    use super::*;
    use crate::density::estimate_density;

    fn blob(cx: f64, cy: f64) -> Vec<ObservationPoint> {
        let offsets = [
            (0.0, 0.0),
            (0.1, 0.0),
            (0.0, 0.1),
            (-0.1, 0.0),
            (0.0, -0.1),
            (0.07, 0.07),
            (-0.07, -0.07),
            (0.07, -0.07),
            (-0.07, 0.07),
        ];
        offsets
            .iter()
            .map(|&(dx, dy)| ObservationPoint::new(cx + dx, cy + dy))
            .collect()
    }

    #[test]
    fn threshold_is_lower_percentile() {
        let grid = estimate_density(&blob(0.0, 0.0), Some(0.1), 20).unwrap();
        let full = density_threshold(&grid, 100.0).unwrap();
        assert!((full - grid.min_density()).abs() < f64::EPSILON);
        let half = density_threshold(&grid, 50.0).unwrap();
        let tight = density_threshold(&grid, 10.0).unwrap();
        assert!(full <= half && half <= tight);
    }

    #[test]
    fn single_blob_yields_one_polygon_around_centre() {
        let grid = estimate_density(&blob(0.0, 0.0), Some(0.1), 40).unwrap();
        let region = extract_contour(&grid, 50.0).unwrap();

        assert!(region.is_valid());
        assert_eq!(region.0.len(), 1);
        assert!(region.contains(&Point::new(0.0, 0.0)));
        assert!(region.unsigned_area() > MIN_AREA);
    }

    #[test]
    fn separated_blobs_yield_multiple_polygons() {
        let mut points = blob(0.0, 0.0);
        points.extend(blob(5.0, 5.0));
        let grid = estimate_density(&points, Some(0.1), 100).unwrap();
        let region = extract_contour(&grid, 2.0).unwrap();

        assert!(region.is_valid());
        assert_eq!(region.0.len(), 2);
        assert!(region.contains(&Point::new(0.0, 0.0)));
        assert!(region.contains(&Point::new(5.0, 5.0)));
        assert!(!region.contains(&Point::new(2.5, 2.5)));
    }

    #[test]
    fn level_controls_share_of_grid_inside_for_narrow_kernels() {
        let mut points = blob(0.0, 0.0);
        points.extend(blob(5.0, 5.0));
        let grid = estimate_density(&points, Some(0.1), 100).unwrap();
        let region = extract_contour(&grid, 90.0).unwrap();
        assert!(region.is_valid());

        let inside = grid
            .ys()
            .iter()
            .flat_map(|&y| grid.xs().iter().map(move |&x| Point::new(x, y)))
            .filter(|node| region.contains(node))
            .count();
        let total = grid.values().len();

        // Nodes whose density underflows to zero (the far corners) can never
        // be inside, so the share sits a little below the nominal 90%.
        #[allow(clippy::cast_precision_loss)]
        let share = inside as f64 / total as f64;
        assert!(
            (0.8..=0.91).contains(&share),
            "level 90 region covers {inside} of {total} grid nodes"
        );
    }

    #[test]
    fn higher_level_encloses_more_area() {
        let grid = estimate_density(&blob(0.0, 0.0), Some(0.1), 40).unwrap();
        let small = extract_contour(&grid, 30.0).unwrap();
        let large = extract_contour(&grid, 80.0).unwrap();
        assert!(large.unsigned_area() > small.unsigned_area());
    }

    #[test]
    fn rings_touching_the_grid_edge_still_close() {
        let grid = estimate_density(&blob(0.0, 0.0), Some(0.1), 30).unwrap();
        let rings = trace_contours(&grid, grid.min_density());
        assert!(!rings.is_empty());
        for ring in &rings {
            assert!(ring.is_closed());
        }
    }

    #[test]
    fn zero_threshold_is_lifted_off_empty_nodes() {
        let grid = estimate_density(&blob(0.0, 0.0), Some(0.1), 20).unwrap();
        let smallest = grid
            .values()
            .iter()
            .copied()
            .filter(|&v| v > 0.0)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(lift_zero_threshold(&grid, 0.0), Some(smallest / 2.0));
        assert_eq!(lift_zero_threshold(&grid, 0.25), Some(0.25));
    }

    #[test]
    fn threshold_above_max_traces_nothing() {
        let grid = estimate_density(&blob(0.0, 0.0), Some(0.1), 20).unwrap();
        assert!(trace_contours(&grid, grid.max_density()).is_empty());
    }
}
