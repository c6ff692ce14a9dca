//! Organic stroke rendering of tracked contours.
//!
//! Each frame draws every identity's tapered motion trail, then every live
//! smoothed outline, both as filled variable-width ribbons through a
//! Catmull-Rom spline. Everything is bracketed in one glow when the style
//! asks for it.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::canvas::Canvas;
use crate::ribbon::ribbon;
use crate::spline::{SEGMENTS_PER_SPAN, StrokePoint, catmull_rom};
use crate::trail::{TrailHistory, taper};
use crate::types::{Point, RenderStyle, TrackedContour, TrailPoint};

/// Shadow blur in pixels at full glow intensity.
pub const MAX_GLOW_BLUR: f64 = 20.0;

/// Minimum smoothed points for a live outline to be drawn.
const MIN_OUTLINE_POINTS: usize = 3;

/// What a render call drew.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderStats {
    /// Trail ribbons filled.
    pub trails: usize,
    /// Live outline ribbons filled.
    pub outlines: usize,
}

/// Draws tracked contours with trails. Owns the trail histories.
#[derive(Debug, Clone, Default)]
pub struct OrganicRenderer {
    trails: TrailHistory,
}

impl OrganicRenderer {
    /// Create a renderer with no trail history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            trails: TrailHistory::new(),
        }
    }

    /// Record this frame's centroids into the trail histories.
    ///
    /// See [`TrailHistory::update`].
    pub fn update_trails(
        &mut self,
        contours: &[TrackedContour],
        timestamp: f64,
        trail_length_seconds: f64,
        style: &RenderStyle,
    ) {
        self.trails
            .update(contours, timestamp, trail_length_seconds, style);
    }

    /// Draw trails and live outlines for `contours` onto `canvas`.
    ///
    /// Normalized coordinates are scaled to a `width` x `height` pixel
    /// surface. `timestamp` (ms) drives the fade of identities that are no
    /// longer being matched.
    pub fn render(
        &self,
        canvas: &mut impl Canvas,
        contours: &[TrackedContour],
        style: &RenderStyle,
        width: u32,
        height: u32,
        timestamp: f64,
    ) -> RenderStats {
        let scale = Point::new(f64::from(width), f64::from(height));
        let glow = style.glow_intensity > 0.0;
        if glow {
            canvas.begin_glow(style.glow_color, style.glow_intensity * MAX_GLOW_BLUR);
        }

        // Every trail first so no trail covers another identity's outline.
        let mut stats = RenderStats::default();
        for contour in contours {
            if let Some(trail) = self.trails.get(contour.id())
                && trail.len() >= 2
                && draw_trail(canvas, trail, style, scale)
            {
                stats.trails += 1;
            }
        }
        for contour in contours {
            if draw_outline(canvas, contour, style, scale, timestamp) {
                stats.outlines += 1;
            }
        }

        if glow {
            canvas.end_glow();
        }
        trace!(trails = stats.trails, outlines = stats.outlines, "rendered frame");
        stats
    }

    /// Drop every trail.
    pub fn clear_trails(&mut self) {
        self.trails.clear();
    }

    /// Trail samples for one identity, newest first.
    #[must_use]
    pub fn trail(&self, id: u32) -> Option<&std::collections::VecDeque<TrailPoint>> {
        self.trails.get(id)
    }

    /// Number of identities with a trail.
    #[must_use]
    pub fn trail_count(&self) -> usize {
        self.trails.len()
    }
}

fn draw_trail(
    canvas: &mut impl Canvas,
    trail: &std::collections::VecDeque<TrailPoint>,
    style: &RenderStyle,
    scale: Point,
) -> bool {
    let controls: Vec<StrokePoint> = taper(trail, style.taper_amount)
        .into_iter()
        .map(|s| to_surface(s, scale))
        .collect();
    fill_stroke(canvas, &controls, false, style)
}

fn draw_outline(
    canvas: &mut impl Canvas,
    contour: &TrackedContour,
    style: &RenderStyle,
    scale: Point,
    timestamp: f64,
) -> bool {
    if contour.smoothed_points.len() < MIN_OUTLINE_POINTS {
        return false;
    }
    let opacity = 1.0 - contour.fade_progress(timestamp);
    if opacity <= 0.0 {
        return false;
    }

    let width = style.width_for_velocity(contour.velocity);
    let controls: Vec<StrokePoint> = contour
        .smoothed_points
        .iter()
        .map(|&p| to_surface(StrokePoint::new(p, width, opacity), scale))
        .collect();
    fill_stroke(canvas, &controls, contour.contour.closed, style)
}

fn fill_stroke(
    canvas: &mut impl Canvas,
    controls: &[StrokePoint],
    closed: bool,
    style: &RenderStyle,
) -> bool {
    let samples = catmull_rom(controls, SEGMENTS_PER_SPAN, closed);
    let Some(shape) = ribbon(&samples) else {
        return false;
    };
    canvas.fill_path(&shape.outline, style.color, shape.opacity);
    true
}

const fn to_surface(s: StrokePoint, scale: Point) -> StrokePoint {
    StrokePoint::new(
        Point::new(s.point.x * scale.x, s.point.y * scale.y),
        s.width,
        s.opacity,
    )
}
