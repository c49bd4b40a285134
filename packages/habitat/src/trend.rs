//! Sliding-window habitat trends.
//!
//! Steps run from the window's start to its end in `time_step`
//! increments. At each step only the observations inside
//! `[step - observation_window, step]` are used. A species with too few
//! observations in a window contributes an empty range for that step; the
//! run itself always completes.

use chrono::{DateTime, Utc};
use geo::{Centroid, MultiPoint, Point};
use habitat_map_habitat_models::{
    HabitatTimePoint, KdeParams, Observation, OverlapTrendPoint, TrendWindow,
};

use crate::kde::calculate_kde;
use crate::overlap::overlap_habitats;
use crate::{HabitatPolygon, MIN_POINTS, NoResult};

/// One species' observations, sorted by time for window lookups.
struct SpeciesTimeline {
    species_id: i64,
    observations: Vec<Observation>,
}

impl SpeciesTimeline {
    fn new(observations: &[Observation], species_id: i64) -> Self {
        let mut observations: Vec<Observation> = observations
            .iter()
            .filter(|o| o.species_id == species_id)
            .cloned()
            .collect();
        observations.sort_by_key(|o| o.timestamp);
        Self {
            species_id,
            observations,
        }
    }

    /// Observations with `from <= timestamp <= to`.
    fn between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> &[Observation] {
        let lo = self.observations.partition_point(|o| o.timestamp < from);
        let hi = self.observations.partition_point(|o| o.timestamp <= to);
        &self.observations[lo..hi]
    }
}

/// What one species looks like inside one window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSnapshot {
    /// Mean location, if the window has any located observation.
    pub centroid: Option<Point<f64>>,
    /// KDE range, if one could be estimated.
    pub habitat: Option<HabitatPolygon>,
    /// Observations in the window.
    pub observation_count: usize,
}

/// Summarizes a window's observations: centroid, KDE range, and count.
#[must_use]
pub fn snapshot(observations: &[Observation], kde: &KdeParams) -> WindowSnapshot {
    let points: Vec<_> = observations
        .iter()
        .map(Observation::point)
        .filter(|p| p.is_finite())
        .collect();

    let centroid = MultiPoint::from(
        points
            .iter()
            .map(|p| Point::new(p.longitude, p.latitude))
            .collect::<Vec<_>>(),
    )
    .centroid();

    let habitat = if points.len() >= MIN_POINTS {
        match calculate_kde(&points, kde) {
            Ok(estimate) => Some(estimate.polygon),
            Err(reason) => {
                log_no_result(reason);
                None
            }
        }
    } else {
        None
    };

    WindowSnapshot {
        centroid,
        habitat,
        observation_count: observations.len(),
    }
}

fn log_no_result(reason: NoResult) {
    log::debug!("No KDE range for window: {reason}");
}

/// Overlap of two species' KDE ranges at every step.
///
/// Steps where either species has no range report zero overlap.
#[must_use]
pub fn overlap_trend(
    observations: &[Observation],
    first_species: i64,
    second_species: i64,
    window: &TrendWindow,
    kde: &KdeParams,
) -> Vec<OverlapTrendPoint> {
    let first = SpeciesTimeline::new(observations, first_species);
    let second = SpeciesTimeline::new(observations, second_species);

    window
        .step_times()
        .into_iter()
        .map(|time| {
            let (from, to) = window.bounds_at(time);
            let a = snapshot(first.between(from, to), kde);
            let b = snapshot(second.between(from, to), kde);
            let overlap = overlap_habitats(a.habitat.as_ref(), b.habitat.as_ref());

            log::debug!(
                "Overlap at {time}: {} vs {} observations, index {}",
                a.observation_count,
                b.observation_count,
                overlap.metrics.overlap_index
            );

            OverlapTrendPoint {
                time,
                overlap_area: overlap.metrics.intersection_area,
                overlap_index: overlap.metrics.overlap_index,
            }
        })
        .collect()
}

/// Centroid and KDE range of each species at every step.
///
/// Emits one point per species per step, in step order and then in the
/// order of `species_ids`.
#[must_use]
pub fn habitat_evolution(
    observations: &[Observation],
    species_ids: &[i64],
    window: &TrendWindow,
    kde: &KdeParams,
) -> Vec<HabitatTimePoint> {
    let timelines: Vec<SpeciesTimeline> = species_ids
        .iter()
        .map(|&id| SpeciesTimeline::new(observations, id))
        .collect();

    let mut points = Vec::new();
    for time in window.step_times() {
        let (from, to) = window.bounds_at(time);
        for timeline in &timelines {
            let snap = snapshot(timeline.between(from, to), kde);
            points.push(HabitatTimePoint {
                time,
                species_id: timeline.species_id,
                centroid: snap
                    .centroid
                    .map(|c| geojson::Geometry::new(geojson::Value::from(&c))),
                polygon: snap.habitat.as_ref().map(HabitatPolygon::to_geojson),
                observation_count: snap.observation_count,
            });
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone as _};

    use super::*;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 12, 0, 0).unwrap()
    }

    fn obs(species_id: i64, d: u32, lon: f64, lat: f64) -> Observation {
        Observation {
            longitude: lon,
            latitude: lat,
            timestamp: day(d),
            species_id,
        }
    }

    /// A small ring of sightings around `(cx, cy)` on day `d`.
    fn cluster(species_id: i64, d: u32, cx: f64, cy: f64) -> Vec<Observation> {
        [
            (0.0, 0.0),
            (0.1, 0.0),
            (0.0, 0.1),
            (-0.1, 0.0),
            (0.0, -0.1),
            (0.07, 0.07),
            (-0.07, -0.07),
        ]
        .iter()
        .map(|&(dx, dy)| obs(species_id, d, cx + dx, cy + dy))
        .collect()
    }

    fn january(step_days: i64, window_days: i64) -> TrendWindow {
        TrendWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
            TimeDelta::days(step_days),
            TimeDelta::days(window_days),
        )
        .unwrap()
    }

    #[test]
    fn weekly_steps_over_january() {
        let trend = overlap_trend(&[], 1, 2, &january(7, 7), &KdeParams::default());
        let days: Vec<u32> = trend
            .iter()
            .map(|p| chrono::Datelike::day(&p.time))
            .collect();
        assert_eq!(days, vec![1, 8, 15, 22, 29]);
        assert!(trend.windows(2).all(|w| w[0].time < w[1].time));
        assert!(trend.iter().all(|p| p.overlap_index == 0.0 && p.overlap_area == 0.0));
    }

    #[test]
    fn overlap_appears_only_in_windows_with_both_species() {
        let mut observations = cluster(1, 5, 0.0, 0.0);
        observations.extend(cluster(2, 5, 0.02, 0.0));
        observations.extend(cluster(1, 20, 0.0, 0.0));

        let trend = overlap_trend(&observations, 1, 2, &january(7, 7), &KdeParams::default());
        assert_eq!(trend.len(), 5);
        // Steps on Jan 8 and Jan 15 look back over Jan 1-8 and Jan 8-15.
        assert!(trend[1].overlap_index > 0.0, "{:?}", trend[1]);
        assert!(trend[1].overlap_area > 0.0);
        assert!(trend[1].overlap_index <= 1.0);
        assert_eq!(trend[2].overlap_index, 0.0);
        // Only species 1 is seen around Jan 20.
        assert_eq!(trend[3].overlap_index, 0.0);
    }

    #[test]
    fn evolution_reports_every_species_every_step() {
        let mut observations = cluster(1, 5, 10.0, 45.0);
        observations.push(obs(2, 5, 11.0, 46.0));
        observations.push(obs(3, 5, 0.0, 0.0));

        let evolution =
            habitat_evolution(&observations, &[1, 2], &january(7, 7), &KdeParams::default());
        assert_eq!(evolution.len(), 10);

        let jan8: Vec<&HabitatTimePoint> =
            evolution.iter().filter(|p| p.time == evolution[2].time).collect();
        assert_eq!(jan8.len(), 2);

        let first = jan8[0];
        assert_eq!(first.species_id, 1);
        assert_eq!(first.observation_count, 7);
        assert!(first.centroid.is_some());
        assert!(first.polygon.is_some());

        let second = jan8[1];
        assert_eq!(second.species_id, 2);
        assert_eq!(second.observation_count, 1);
        assert!(second.centroid.is_some());
        assert!(second.polygon.is_none());

        // Jan 29 window (Jan 22-29) is empty for both.
        let last = &evolution[8];
        assert_eq!(last.observation_count, 0);
        assert!(last.centroid.is_none());
        assert!(last.polygon.is_none());
    }

    #[test]
    fn centroid_is_mean_location() {
        let observations = vec![obs(1, 3, 0.0, 0.0), obs(1, 3, 2.0, 0.0), obs(1, 3, 1.0, 3.0)];
        let snap = snapshot(&observations, &KdeParams::default());
        let centroid = snap.centroid.unwrap();
        assert!((centroid.x() - 1.0).abs() < 1e-12);
        assert!((centroid.y() - 1.0).abs() < 1e-12);
        assert_eq!(snap.observation_count, 3);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let observations = vec![obs(1, 1, 0.0, 0.0), obs(1, 8, 0.0, 0.0), obs(1, 9, 0.0, 0.0)];
        let timeline = SpeciesTimeline::new(&observations, 1);
        assert_eq!(timeline.between(day(1), day(8)).len(), 2);
        assert_eq!(timeline.between(day(2), day(8)).len(), 1);
        assert!(timeline.between(day(10), day(20)).is_empty());
    }

    #[test]
    fn reruns_are_identical() {
        let mut observations = cluster(1, 3, 0.0, 0.0);
        observations.extend(cluster(2, 4, 0.05, 0.05));
        let window = january(3, 10);
        let kde = KdeParams::new(None, 80.0, 40).unwrap();

        assert_eq!(
            overlap_trend(&observations, 1, 2, &window, &kde),
            overlap_trend(&observations, 1, 2, &window, &kde)
        );
    }
}
