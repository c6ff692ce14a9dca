//! Contour tracking: stable identities and smoothed shapes across frames.
//!
//! Each frame's contours are matched to the identities seen so far with a
//! two-phase greedy assignment: every (new contour, identity) pair whose
//! centroids are close enough is scored, the scores are sorted, and pairs
//! are consumed lowest first, skipping anything already claimed. This is
//! not a minimum-cost assignment; two contours crossing paths in one
//! frame can swap identities.
//!
//! Identity lifecycle: *unseen* → *tracked* → *matched* or *fading* →
//! *retired*. A fading identity keeps its last state (and keeps being
//! returned) until [`FADE_OUT_DURATION`] has passed without a match.

use std::collections::BTreeMap;

use tracing::debug;

use crate::types::{Contour, Point, TrackedContour, centroid};

/// Centroids farther apart than this (normalized units) never match.
pub const MAX_CENTROID_DISTANCE: f64 = 0.15;

/// Milliseconds an unmatched identity survives before retirement.
pub const FADE_OUT_DURATION: f64 = 200.0;

/// Weight of the area mismatch term in the match score.
const AREA_WEIGHT: f64 = 0.3;

/// Point-count change (fraction of the previous count) beyond which the
/// shape is considered to have changed topology and is not smoothed.
const MAX_POINT_COUNT_CHANGE: f64 = 0.5;

/// Tracks contour identities across frames.
///
/// Owns the identity map exclusively; identities are minted from a
/// monotonically increasing counter and never reused.
#[derive(Debug, Clone)]
pub struct ContourTracker {
    tracked: BTreeMap<u32, TrackedContour>,
    next_id: u32,
    last_timestamp: Option<f64>,
    smoothing: f64,
}

impl Default for ContourTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// A scored (new contour, identity) pairing.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    contour_index: usize,
    id: u32,
    score: f64,
}

impl ContourTracker {
    /// Default EMA smoothing factor.
    pub const DEFAULT_SMOOTHING: f64 = 0.5;

    /// Create an empty tracker with the default smoothing factor.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tracked: BTreeMap::new(),
            next_id: 0,
            last_timestamp: None,
            smoothing: Self::DEFAULT_SMOOTHING,
        }
    }

    /// Create an empty tracker with the given smoothing factor.
    #[must_use]
    pub fn with_smoothing(smoothing: f64) -> Self {
        let mut tracker = Self::new();
        tracker.set_smoothing(smoothing);
        tracker
    }

    /// Set the EMA factor: the weight given to the previous shape.
    ///
    /// Clamped to `0.0..=1.0`; `0.0` disables smoothing.
    pub fn set_smoothing(&mut self, value: f64) {
        self.smoothing = value.clamp(0.0, 1.0);
    }

    /// Current EMA factor.
    #[must_use]
    pub const fn smoothing(&self) -> f64 {
        self.smoothing
    }

    /// Number of live identities (matched or fading).
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Look up a live identity.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&TrackedContour> {
        self.tracked.get(&id)
    }

    /// Iterate live identities in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &TrackedContour> {
        self.tracked.values()
    }

    /// Drop every identity. The id counter and clock are kept, so ids
    /// minted afterwards still never collide with earlier ones.
    pub fn clear(&mut self) {
        self.tracked.clear();
    }

    /// Fold one frame of contours into the identity map.
    ///
    /// `timestamp` is in milliseconds and must not decrease between calls.
    /// Returns every live identity (matched, newly minted, and fading) in
    /// ascending id order.
    pub fn update(&mut self, contours: &[Contour], timestamp: f64) -> Vec<TrackedContour> {
        let delta_time = self.last_timestamp.map_or(0.0, |last| timestamp - last);
        self.last_timestamp = Some(timestamp);

        let mut claimed = vec![false; contours.len()];
        for (contour_index, id) in self.assign(contours) {
            claimed[contour_index] = true;
            if let Some(tracked) = self.tracked.get_mut(&id) {
                apply_match(
                    tracked,
                    &contours[contour_index],
                    delta_time,
                    timestamp,
                    self.smoothing,
                );
            }
        }

        for (contour, _) in contours.iter().zip(&claimed).filter(|&(_, c)| !c) {
            let id = self.next_id;
            self.next_id += 1;
            debug!(id, area = contour.area, "new contour identity");
            self.tracked.insert(id, new_identity(id, contour, timestamp));
        }

        self.tracked.retain(|&id, tracked| {
            let alive = timestamp - tracked.last_seen < FADE_OUT_DURATION;
            if !alive {
                debug!(id, age = tracked.age, "retired contour identity");
            }
            alive
        });

        self.tracked.values().cloned().collect()
    }

    /// Score every close-enough pair, then greedily consume lowest scores.
    ///
    /// Returns `(contour_index, id)` pairs, each side used at most once.
    fn assign(&self, contours: &[Contour]) -> Vec<(usize, u32)> {
        let mut candidates = Vec::new();
        for (contour_index, contour) in contours.iter().enumerate() {
            for (&id, tracked) in &self.tracked {
                let distance = contour.centroid.distance(tracked.centroid());
                if distance < MAX_CENTROID_DISTANCE {
                    let area_term = area_mismatch(contour.area, tracked.contour.area);
                    candidates.push(Candidate {
                        contour_index,
                        id,
                        score: area_term.mul_add(AREA_WEIGHT, distance),
                    });
                }
            }
        }

        // Stable sort: ties keep contour-major, ascending-id order.
        candidates.sort_by(|a, b| a.score.total_cmp(&b.score));

        let mut contour_taken = vec![false; contours.len()];
        let mut id_taken = Vec::new();
        let mut assignments = Vec::new();
        for candidate in candidates {
            if contour_taken[candidate.contour_index] || id_taken.contains(&candidate.id) {
                continue;
            }
            contour_taken[candidate.contour_index] = true;
            id_taken.push(candidate.id);
            assignments.push((candidate.contour_index, candidate.id));
        }
        assignments
    }
}

/// `|1 - clamp(new / old, 0.5, 2)|`: 0 for equal areas, at most 1.
fn area_mismatch(new_area: f64, old_area: f64) -> f64 {
    let ratio = if old_area > 0.0 {
        new_area / old_area
    } else if new_area > 0.0 {
        f64::INFINITY
    } else {
        1.0
    };
    (1.0 - ratio.clamp(0.5, 2.0)).abs()
}

fn new_identity(id: u32, contour: &Contour, timestamp: f64) -> TrackedContour {
    TrackedContour {
        contour: Contour {
            id,
            ..contour.clone()
        },
        velocity: 0.0,
        velocity_vector: Point::new(0.0, 0.0),
        age: 0,
        last_seen: timestamp,
        smoothed_points: contour.points.clone(),
    }
}

fn apply_match(
    tracked: &mut TrackedContour,
    contour: &Contour,
    delta_time: f64,
    timestamp: f64,
    smoothing: f64,
) {
    let previous = tracked.centroid();
    tracked.velocity_vector = if delta_time > 0.0 {
        let seconds = delta_time / 1000.0;
        Point::new(
            (contour.centroid.x - previous.x) / seconds,
            (contour.centroid.y - previous.y) / seconds,
        )
    } else {
        Point::new(0.0, 0.0)
    };
    tracked.velocity = tracked.velocity_vector.x.hypot(tracked.velocity_vector.y);

    tracked.smoothed_points = smooth_points(&tracked.smoothed_points, &contour.points, smoothing);
    tracked.contour = Contour {
        id: tracked.id(),
        centroid: centroid(&tracked.smoothed_points),
        ..contour.clone()
    };
    tracked.age += 1;
    tracked.last_seen = timestamp;
}

/// Exponential moving average of a shape.
///
/// `previous` is resampled onto `current`'s point count by proportional
/// index. When the counts differ by more than half the previous count the
/// topology is treated as changed and `current` is returned unsmoothed.
#[allow(clippy::cast_precision_loss)]
fn smooth_points(previous: &[Point], current: &[Point], factor: f64) -> Vec<Point> {
    let change = previous.len().abs_diff(current.len()) as f64;
    if previous.is_empty() || change > previous.len() as f64 * MAX_POINT_COUNT_CHANGE {
        return current.to_vec();
    }

    current
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let prev = previous[i * previous.len() / current.len()];
            Point::new(
                prev.x.mul_add(factor, p.x * (1.0 - factor)),
                prev.y.mul_add(factor, p.y * (1.0 - factor)),
            )
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Square contour of half-size `r` centered at `(cx, cy)`, 8 points.
    fn square(cx: f64, cy: f64, r: f64) -> Contour {
        let points = vec![
            Point::new(cx - r, cy - r),
            Point::new(cx, cy - r),
            Point::new(cx + r, cy - r),
            Point::new(cx + r, cy),
            Point::new(cx + r, cy + r),
            Point::new(cx, cy + r),
            Point::new(cx - r, cy + r),
            Point::new(cx - r, cy),
        ];
        Contour::new(0, points, true)
    }

    fn max_error(a: &[Point], b: &[Point]) -> f64 {
        a.iter()
            .zip(b)
            .map(|(p, q)| p.distance(*q))
            .fold(0.0, f64::max)
    }

    #[test]
    fn first_detection_mints_identity() {
        let mut tracker = ContourTracker::new();
        let out = tracker.update(&[square(0.5, 0.5, 0.1)], 0.0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), 0);
        assert_eq!(out[0].age, 0);
        assert!(out[0].velocity.abs() < f64::EPSILON);
        assert_eq!(out[0].smoothed_points, out[0].contour.points);
        assert!((out[0].last_seen - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn identity_survives_small_motion() {
        let mut tracker = ContourTracker::new();
        let first = tracker.update(&[square(0.5, 0.5, 0.1)], 0.0);
        let second = tracker.update(&[square(0.55, 0.52, 0.1)], 33.0);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].id(), second[0].id());
        assert_eq!(second[0].age, 1);
        assert!((second[0].last_seen - 33.0).abs() < f64::EPSILON);
    }

    #[test]
    fn distant_contour_gets_new_identity() {
        let mut tracker = ContourTracker::new();
        tracker.update(&[square(0.2, 0.5, 0.05)], 0.0);
        let out = tracker.update(&[square(0.8, 0.5, 0.05)], 16.0);
        // Old identity fading, new one minted.
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].id(), 1);
        assert_eq!(out[0].age, 0);
        assert!((out[0].last_seen - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn velocity_is_units_per_second() {
        let mut tracker = ContourTracker::with_smoothing(0.0);
        tracker.update(&[square(0.5, 0.5, 0.1)], 1000.0);
        let out = tracker.update(&[square(0.6, 0.5, 0.1)], 1500.0);
        // 0.1 units in 0.5 s.
        assert!((out[0].velocity_vector.x - 0.2).abs() < 1e-9);
        assert!(out[0].velocity_vector.y.abs() < 1e-9);
        assert!((out[0].velocity - 0.2).abs() < 1e-9);
    }

    #[test]
    fn zero_delta_time_gives_zero_velocity() {
        let mut tracker = ContourTracker::new();
        tracker.update(&[square(0.5, 0.5, 0.1)], 10.0);
        let out = tracker.update(&[square(0.6, 0.5, 0.1)], 10.0);
        assert!(out[0].velocity.abs() < f64::EPSILON);
    }

    #[test]
    fn fade_out_timing() {
        let mut tracker = ContourTracker::new();
        tracker.update(&[square(0.5, 0.5, 0.1)], 1000.0);

        assert_eq!(tracker.update(&[], 1100.0).len(), 1);
        assert_eq!(tracker.update(&[], 1199.9).len(), 1);
        assert_eq!(tracker.tracked_count(), 1);

        assert!(tracker.update(&[], 1200.0).is_empty());
        assert_eq!(tracker.tracked_count(), 0);
    }

    #[test]
    fn fading_identity_can_be_recovered() {
        let mut tracker = ContourTracker::new();
        tracker.update(&[square(0.5, 0.5, 0.1)], 0.0);
        tracker.update(&[], 100.0);
        let out = tracker.update(&[square(0.51, 0.5, 0.1)], 150.0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), 0);
        assert_eq!(out[0].age, 1);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut tracker = ContourTracker::new();
        tracker.update(&[square(0.5, 0.5, 0.1)], 0.0);
        tracker.update(&[], 500.0);
        tracker.clear();
        let out = tracker.update(&[square(0.5, 0.5, 0.1)], 600.0);
        assert_eq!(out[0].id(), 1);
    }

    #[test]
    fn clear_drops_identities() {
        let mut tracker = ContourTracker::new();
        tracker.update(&[square(0.3, 0.3, 0.05), square(0.7, 0.7, 0.05)], 0.0);
        assert_eq!(tracker.tracked_count(), 2);
        tracker.clear();
        assert_eq!(tracker.tracked_count(), 0);
        assert!(tracker.get(0).is_none());
    }

    #[test]
    fn greedy_matching_prefers_lowest_score() {
        let mut tracker = ContourTracker::new();
        tracker.update(&[square(0.45, 0.5, 0.05), square(0.55, 0.5, 0.05)], 0.0);
        // Both new contours are within range of both identities; each
        // should stay with its nearest.
        let out = tracker.update(&[square(0.57, 0.5, 0.05), square(0.47, 0.5, 0.05)], 16.0);
        assert_eq!(out.len(), 2);
        assert!((out[0].contour.points[0].x - 0.42).abs() < 1e-9);
        assert!((out[1].contour.points[0].x - 0.52).abs() < 1e-9);
    }

    #[test]
    fn one_identity_claims_at_most_one_contour() {
        let mut tracker = ContourTracker::new();
        tracker.update(&[square(0.5, 0.5, 0.05)], 0.0);
        let out = tracker.update(&[square(0.52, 0.5, 0.05), square(0.55, 0.5, 0.05)], 16.0);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id(), 0);
        assert_eq!(out[0].age, 1);
        assert_eq!(out[1].id(), 1);
        assert_eq!(out[1].age, 0);
    }

    #[test]
    fn area_mismatch_breaks_distance_ties() {
        let mut tracker = ContourTracker::new();
        tracker.update(&[square(0.5, 0.5, 0.05)], 0.0);
        // Same centroid, one matching size and one four times larger.
        let out = tracker.update(&[square(0.5, 0.5, 0.1), square(0.5, 0.5, 0.05)], 16.0);
        let matched = out.iter().find(|t| t.id() == 0).unwrap();
        assert!((matched.contour.area - square(0.5, 0.5, 0.05).area).abs() < 1e-12);
    }

    #[test]
    fn area_mismatch_bounds() {
        assert!(area_mismatch(1.0, 1.0).abs() < f64::EPSILON);
        assert!((area_mismatch(10.0, 1.0) - 1.0).abs() < f64::EPSILON);
        assert!((area_mismatch(0.1, 1.0) - 0.5).abs() < f64::EPSILON);
        assert!((area_mismatch(1.0, 0.0) - 1.0).abs() < f64::EPSILON);
        assert!(area_mismatch(0.0, 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn smoothing_converges_monotonically() {
        let start = square(0.50, 0.50, 0.1);
        let target = square(0.53, 0.51, 0.1);

        let mut tracker = ContourTracker::with_smoothing(0.6);
        tracker.update(std::slice::from_ref(&start), 0.0);

        let mut last_error = max_error(&start.points, &target.points);
        for frame in 1..=20 {
            let out = tracker.update(std::slice::from_ref(&target), f64::from(frame) * 16.0);
            let error = max_error(&out[0].smoothed_points, &target.points);
            assert!(error < last_error, "frame {frame}: {error} >= {last_error}");
            last_error = error;
        }
        assert!(last_error < 1e-4);
    }

    #[test]
    fn smoothed_centroid_lags_raw_centroid() {
        let mut tracker = ContourTracker::with_smoothing(0.5);
        tracker.update(&[square(0.5, 0.5, 0.1)], 0.0);
        let out = tracker.update(&[square(0.6, 0.5, 0.1)], 16.0);
        assert!((out[0].centroid().x - 0.55).abs() < 1e-9);
        assert_eq!(out[0].contour.points, square(0.6, 0.5, 0.1).points);
    }

    #[test]
    fn topology_change_skips_smoothing() {
        let mut tracker = ContourTracker::with_smoothing(0.9);
        tracker.update(&[square(0.5, 0.5, 0.1)], 0.0);

        // 8 points -> 3 points: change of 5 exceeds half of 8.
        let triangle = Contour::new(
            0,
            vec![
                Point::new(0.45, 0.45),
                Point::new(0.55, 0.45),
                Point::new(0.5, 0.55),
            ],
            true,
        );
        let out = tracker.update(std::slice::from_ref(&triangle), 16.0);
        assert_eq!(out[0].id(), 0);
        assert_eq!(out[0].smoothed_points, triangle.points);
    }

    #[test]
    fn smoothing_resamples_modest_count_changes() {
        let previous = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)];
        let current = vec![
            Point::new(0.0, 1.0),
            Point::new(0.5, 1.0),
            Point::new(1.0, 1.0),
        ];
        let smoothed = smooth_points(&previous, &current, 0.5);
        assert_eq!(smoothed.len(), 3);
        // Index 1 of 3 maps to index 0 of 2.
        assert_eq!(smoothed[1], Point::new(0.25, 0.5));
    }

    #[test]
    fn set_smoothing_clamps() {
        let mut tracker = ContourTracker::new();
        tracker.set_smoothing(1.7);
        assert!((tracker.smoothing() - 1.0).abs() < f64::EPSILON);
        tracker.set_smoothing(-0.2);
        assert!(tracker.smoothing().abs() < f64::EPSILON);
    }
}
