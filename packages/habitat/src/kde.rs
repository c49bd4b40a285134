//! Kernel density home ranges: density grid, then contour.

use habitat_map_habitat_models::{HabitatParams, KdeParams, ObservationPoint};

use crate::contour::extract_contour;
use crate::density::estimate_density;
use crate::{HabitatEstimate, HabitatPolygon, KdeDiagnostics, NoResult, finite_points};

/// Grids with more nodes per axis than this omit their density samples.
pub const MAX_SAMPLE_GRID_SIZE: u32 = 200;

/// Samples at or below this fraction of the peak density are omitted.
pub const NEGLIGIBLE_DENSITY_FRACTION: f64 = 1e-3;

/// Estimates a home range as the `level_percent` contour of a Gaussian
/// kernel density surface.
///
/// The returned diagnostics carry the bandwidth used, the peak density,
/// and (for grids up to [`MAX_SAMPLE_GRID_SIZE`] nodes per axis) every
/// grid node with non-negligible density.
///
/// # Errors
///
/// Returns [`NoResult`] for fewer than three distinct points, a flat
/// surface, or a level at which no valid contour exists.
pub fn calculate_kde(
    points: &[ObservationPoint],
    params: &KdeParams,
) -> Result<HabitatEstimate, NoResult> {
    let points = finite_points(points);
    let grid = estimate_density(&points, params.bandwidth(), params.grid_size())?;
    let geometry = extract_contour(&grid, params.level_percent())?;

    let density_samples = (params.grid_size() <= MAX_SAMPLE_GRID_SIZE)
        .then(|| grid.samples_above(grid.max_density() * NEGLIGIBLE_DENSITY_FRACTION));

    log::debug!(
        "KDE {}% range: {} part(s), bandwidth {}, peak density {}",
        params.level_percent(),
        geometry.0.len(),
        grid.bandwidth(),
        grid.max_density()
    );

    Ok(HabitatEstimate {
        polygon: HabitatPolygon::new(
            geometry,
            HabitatParams::Kde(*params),
            points.len(),
        ),
        diagnostics: Some(KdeDiagnostics {
            bandwidth: grid.bandwidth(),
            max_density: grid.max_density(),
            density_samples,
        }),
    })
}
