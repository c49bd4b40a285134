//! Small descriptive statistics used by the estimators.

use habitat_map_habitat_models::ObservationPoint;

/// Bandwidth used when the rule of thumb cannot be applied (degrees).
pub const FALLBACK_BANDWIDTH: f64 = 0.01;

/// Arithmetic mean, or `None` for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Unbiased sample variance (`n - 1` denominator).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some(ss / (values.len() - 1) as f64)
}

/// The `pct`-th percentile of `values`, interpolating linearly between
/// the two nearest ranks.
///
/// `pct` is clamped to `[0, 100]`. Returns `None` for an empty slice.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Rule-of-thumb isotropic kernel bandwidth for a 2-D point set.
///
/// Silverman's factor for two dimensions, `n^(-1/6)`, applied to the
/// pooled standard deviation of longitude and latitude. Falls back to
/// [`FALLBACK_BANDWIDTH`] when the spread is zero or undefined.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate_bandwidth(points: &[ObservationPoint]) -> f64 {
    let xs: Vec<f64> = points.iter().map(|p| p.longitude).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.latitude).collect();

    let (Some(var_x), Some(var_y)) = (sample_variance(&xs), sample_variance(&ys)) else {
        return FALLBACK_BANDWIDTH;
    };

    let sigma = f64::midpoint(var_x, var_y).sqrt();
    let h = sigma * (points.len() as f64).powf(-1.0 / 6.0);

    if h.is_finite() && h > 0.0 {
        h
    } else {
        FALLBACK_BANDWIDTH
    }
}
