//! Per-identity motion trails.
//!
//! Every frame each tracked contour drops a [`TrailPoint`] at its
//! centroid. Trails are stored newest-first, pruned by age and length,
//! and garbage-collected once their identity has been gone for a full
//! trail duration.

use std::collections::{BTreeMap, VecDeque};

use tracing::debug;

use crate::spline::StrokePoint;
use crate::types::{RenderStyle, TrackedContour, TrailPoint};

/// Hard cap on samples per trail.
pub const MAX_TRAIL_POINTS: usize = 500;

/// Longest trail duration honored, in milliseconds.
pub const MAX_TRAIL_AGE_MS: f64 = 10_000.0;

/// Opacity floor at the tail when taper is zero.
const TAIL_OPACITY_FLOOR: f64 = 0.3;

/// Trail histories keyed by tracker identity.
#[derive(Debug, Clone, Default)]
pub struct TrailHistory {
    trails: BTreeMap<u32, VecDeque<TrailPoint>>,
}

impl TrailHistory {
    /// Create an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            trails: BTreeMap::new(),
        }
    }

    /// Record one frame of tracked contours.
    ///
    /// Pushes a sample for every contour, drops samples older than
    /// `min(trail_length_seconds * 1000, 10000)` ms, caps each trail at
    /// [`MAX_TRAIL_POINTS`], and removes trails whose identity is absent
    /// and whose newest sample has aged out.
    pub fn update(
        &mut self,
        contours: &[TrackedContour],
        timestamp: f64,
        trail_length_seconds: f64,
        style: &RenderStyle,
    ) {
        let max_age = max_age_ms(trail_length_seconds);

        for contour in contours {
            let centroid = contour.centroid();
            let trail = self.trails.entry(contour.id()).or_default();
            trail.push_front(TrailPoint {
                x: centroid.x,
                y: centroid.y,
                width: style.width_for_velocity(contour.velocity),
                opacity: 1.0,
                timestamp,
                contour_id: contour.id(),
            });
            trail.truncate(MAX_TRAIL_POINTS);
        }

        let before = self.trails.len();
        self.trails.retain(|_, trail| {
            while trail
                .back()
                .is_some_and(|p| timestamp - p.timestamp > max_age)
            {
                trail.pop_back();
            }
            !trail.is_empty()
        });
        if self.trails.len() < before {
            debug!(
                removed = before - self.trails.len(),
                remaining = self.trails.len(),
                "collected stale trails"
            );
        }
    }

    /// Samples for one identity, newest first.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&VecDeque<TrailPoint>> {
        self.trails.get(&id)
    }

    /// Number of identities with a trail.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trails.len()
    }

    /// Returns `true` if no trails are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trails.is_empty()
    }

    /// Drop every trail.
    pub fn clear(&mut self) {
        self.trails.clear();
    }
}

/// Trail cutoff in milliseconds for a duration in seconds.
#[must_use]
pub fn max_age_ms(trail_length_seconds: f64) -> f64 {
    (trail_length_seconds * 1000.0).min(MAX_TRAIL_AGE_MS)
}

/// Narrow and fade a newest-first trail toward its tail.
///
/// With `progress = i / (n - 1)`, width is scaled by
/// `1 - progress * taper` and opacity by `1 - progress * (1 - floor)`
/// where `floor = 0.3 + 0.7 * (1 - taper)`. The head is untouched; at
/// full taper the tail keeps 30% opacity and zero width. Positions are
/// copied unchanged in normalized units.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn taper<'a, I>(trail: I, taper_amount: f64) -> Vec<StrokePoint>
where
    I: IntoIterator<Item = &'a TrailPoint>,
    I::IntoIter: ExactSizeIterator,
{
    let iter = trail.into_iter();
    let last = iter.len().saturating_sub(1);
    let tail_floor = (1.0 - TAIL_OPACITY_FLOOR).mul_add(1.0 - taper_amount, TAIL_OPACITY_FLOOR);

    iter.enumerate()
        .map(|(i, p)| {
            let progress = if last == 0 {
                0.0
            } else {
                i as f64 / last as f64
            };
            StrokePoint::new(
                p.position(),
                p.width * progress.mul_add(-taper_amount, 1.0),
                p.opacity * progress.mul_add(-(1.0 - tail_floor), 1.0),
            )
        })
        .collect()
}
