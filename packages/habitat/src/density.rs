//! Bivariate Gaussian kernel density evaluated on a regular grid.
//!
//! The grid spans the points' bounding box padded by a tenth of each
//! axis' range. Each node sums the kernel contributions of the points
//! within [`KERNEL_CUTOFF`] bandwidths, found through an R-tree. The cutoff
//! lies past the point where the kernel underflows, so every node holds
//! the full Gaussian sum and contour percentiles rank real densities.

use std::f64::consts::PI;

use habitat_map_habitat_models::{DensityGridSample, ObservationPoint};
use rstar::RTree;

use crate::{NoResult, finite_points, require_distinct, stats};

/// Fraction of each axis' range added as padding on both sides.
pub const PADDING_FRACTION: f64 = 0.1;

/// Padding used when an axis' range is effectively zero (degrees).
pub const MIN_PADDING: f64 = 0.1;

/// Axis ranges at or below this are treated as zero.
const NEAR_ZERO_RANGE: f64 = 1e-9;

/// Kernel contributions beyond this many bandwidths are skipped.
///
/// At 40 bandwidths the kernel is `exp(-800)`, below the smallest `f64`
/// subnormal, so nothing representable is lost.
pub const KERNEL_CUTOFF: f64 = 40.0;

/// Kernel density values on a regular longitude/latitude grid.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityGrid {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Row-major: `values[row * xs.len() + col]`, rows follow `ys`.
    values: Vec<f64>,
    bandwidth: f64,
    max_density: f64,
}

impl DensityGrid {
    /// Longitudes of the grid columns, ascending.
    #[must_use]
    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    /// Latitudes of the grid rows, ascending.
    #[must_use]
    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    /// Every density value, row-major.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Density at a grid node.
    #[must_use]
    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.xs.len() + col]
    }

    /// Kernel bandwidth the grid was evaluated with (degrees).
    #[must_use]
    pub const fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Highest density on the grid.
    #[must_use]
    pub const fn max_density(&self) -> f64 {
        self.max_density
    }

    /// Lowest density on the grid.
    #[must_use]
    pub fn min_density(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Grid nodes whose density is above `min_density`.
    #[must_use]
    pub fn samples_above(&self, min_density: f64) -> Vec<DensityGridSample> {
        let cols = self.xs.len();
        self.values
            .iter()
            .enumerate()
            .filter(|&(_, &density)| density > min_density)
            .map(|(i, &density)| DensityGridSample {
                lat: self.ys[i / cols],
                lng: self.xs[i % cols],
                density,
            })
            .collect()
    }
}

/// Evaluates a Gaussian kernel density estimate over a padded grid of
/// `grid_size × grid_size` nodes.
///
/// When `bandwidth` is `None` it is derived from the data with
/// [`stats::estimate_bandwidth`].
///
/// # Errors
///
/// Returns [`NoResult::InsufficientPoints`] for fewer than three distinct
/// points.
pub fn estimate_density(
    points: &[ObservationPoint],
    bandwidth: Option<f64>,
    grid_size: u32,
) -> Result<DensityGrid, NoResult> {
    let points = finite_points(points);
    require_distinct(&points)?;

    let h = bandwidth.unwrap_or_else(|| stats::estimate_bandwidth(&points));
    let n = grid_size.max(2) as usize;

    let (min_x, max_x) = bounds(points.iter().map(|p| p.longitude));
    let (min_y, max_y) = bounds(points.iter().map(|p| p.latitude));
    let pad_x = axis_padding(min_x, max_x);
    let pad_y = axis_padding(min_y, max_y);

    let xs = linspace(min_x - pad_x, max_x + pad_x, n);
    let ys = linspace(min_y - pad_y, max_y + pad_y, n);

    log::debug!(
        "Evaluating KDE of {} points on {n}x{n} grid with bandwidth {h}",
        points.len()
    );

    let tree = RTree::bulk_load(
        points
            .iter()
            .map(|p| [p.longitude, p.latitude])
            .collect::<Vec<_>>(),
    );

    #[allow(clippy::cast_precision_loss)]
    let norm = 1.0 / (points.len() as f64 * 2.0 * PI * h * h);
    let two_h_sq = 2.0 * h * h;
    let cutoff_sq = (KERNEL_CUTOFF * h).powi(2);

    let mut values = Vec::with_capacity(n * n);
    let mut max_density = 0.0_f64;
    for &y in &ys {
        for &x in &xs {
            let sum: f64 = tree
                .locate_within_distance([x, y], cutoff_sq)
                .map(|p| {
                    let d_sq = (p[0] - x).powi(2) + (p[1] - y).powi(2);
                    (-d_sq / two_h_sq).exp()
                })
                .sum();
            let mut density = sum * norm;
            // Subnormal sums carry no usable precision for contouring.
            if density < f64::MIN_POSITIVE {
                density = 0.0;
            }
            max_density = max_density.max(density);
            values.push(density);
        }
    }

    Ok(DensityGrid {
        xs,
        ys,
        values,
        bandwidth: h,
        max_density,
    })
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

/// Padding for one axis: a tenth of its range, or [`MIN_PADDING`] when the
/// range is effectively zero.
#[must_use]
pub fn axis_padding(min: f64, max: f64) -> f64 {
    let range = max - min;
    if range <= NEAR_ZERO_RANGE {
        MIN_PADDING
    } else {
        range * PADDING_FRACTION
    }
}

/// `n` evenly spaced values from `start` to `end` inclusive.
#[allow(clippy::cast_precision_loss)]
fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    let step = (end - start) / (n - 1) as f64;
    (0..n)
        .map(|i| if i == n - 1 { end } else { (i as f64).mul_add(step, start) })
        .collect()
}
