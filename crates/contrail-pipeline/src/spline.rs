//! Catmull-Rom interpolation of variable-width stroke points.

use serde::{Deserialize, Serialize};

use crate::types::Point;

/// Interpolated segments per span between two control points.
pub const SEGMENTS_PER_SPAN: usize = 10;

/// A stroke sample: position plus the width and opacity at that position.
///
/// Positions are in surface pixels once they reach the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    /// Position.
    pub point: Point,
    /// Full stroke width at this sample.
    pub width: f64,
    /// Opacity at this sample (`0.0..=1.0`).
    pub opacity: f64,
}

impl StrokePoint {
    /// Create a new stroke sample.
    #[must_use]
    pub const fn new(point: Point, width: f64, opacity: f64) -> Self {
        Self {
            point,
            width,
            opacity,
        }
    }
}

/// Uniform Catmull-Rom spline through `points`.
///
/// Each span `p1 → p2` is sampled at `segments` parameter steps using the
/// neighbors `p0` and `p3` as tangent controls; width and opacity are
/// linearly interpolated within the span. Open curves clamp the missing
/// end controls to the endpoints and yield `(n - 1) * segments + 1`
/// samples. Closed curves wrap their controls, add the span from the last
/// point back to the first, and end on the first point again, yielding
/// `n * segments + 1` samples.
///
/// Fewer than 2 points (or zero segments) are returned unchanged.
#[must_use = "returns the interpolated stroke"]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
pub fn catmull_rom(points: &[StrokePoint], segments: usize, closed: bool) -> Vec<StrokePoint> {
    let n = points.len();
    if n < 2 || segments == 0 {
        return points.to_vec();
    }

    let spans = if closed { n } else { n - 1 };
    let control = |i: isize| -> StrokePoint {
        if closed {
            points[i.rem_euclid(n as isize).unsigned_abs()]
        } else {
            points[i.clamp(0, n as isize - 1).unsigned_abs()]
        }
    };

    let mut out = Vec::with_capacity(spans * segments + 1);
    for span in 0..spans {
        let i = span as isize;
        let (p0, p1, p2, p3) = (control(i - 1), control(i), control(i + 1), control(i + 2));
        for step in 0..segments {
            let t = step as f64 / segments as f64;
            out.push(StrokePoint {
                point: Point::new(
                    interpolate(p0.point.x, p1.point.x, p2.point.x, p3.point.x, t),
                    interpolate(p0.point.y, p1.point.y, p2.point.y, p3.point.y, t),
                ),
                width: (p2.width - p1.width).mul_add(t, p1.width),
                opacity: (p2.opacity - p1.opacity).mul_add(t, p1.opacity),
            });
        }
    }
    out.push(if closed { points[0] } else { points[n - 1] });
    out
}

/// One coordinate of the Catmull-Rom basis at parameter `t`.
fn interpolate(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;
    let a = 2.0 * p1;
    let b = p2 - p0;
    let c = 2.0f64.mul_add(p0, -5.0 * p1) + 4.0f64.mul_add(p2, -p3);
    let d = 3.0f64.mul_add(p1, -p0) + 3.0f64.mul_add(-p2, p3);
    0.5 * d.mul_add(t3, c.mul_add(t2, b.mul_add(t, a)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp(x: f64, y: f64, width: f64, opacity: f64) -> StrokePoint {
        StrokePoint::new(Point::new(x, y), width, opacity)
    }

    fn zigzag() -> Vec<StrokePoint> {
        vec![
            sp(0.0, 0.0, 1.0, 1.0),
            sp(10.0, 5.0, 2.0, 0.8),
            sp(20.0, 0.0, 3.0, 0.6),
            sp(30.0, 5.0, 4.0, 0.4),
        ]
    }

    #[test]
    fn short_input_unchanged() {
        let one = vec![sp(1.0, 2.0, 3.0, 1.0)];
        assert_eq!(catmull_rom(&one, SEGMENTS_PER_SPAN, false), one);
        assert!(catmull_rom(&[], SEGMENTS_PER_SPAN, true).is_empty());
    }

    #[test]
    fn open_sample_count() {
        let out = catmull_rom(&zigzag(), SEGMENTS_PER_SPAN, false);
        assert_eq!(out.len(), 3 * SEGMENTS_PER_SPAN + 1);
    }

    #[test]
    fn closed_sample_count_and_loop() {
        let pts = zigzag();
        let out = catmull_rom(&pts, SEGMENTS_PER_SPAN, true);
        assert_eq!(out.len(), 4 * SEGMENTS_PER_SPAN + 1);
        assert_eq!(out[0].point, out[out.len() - 1].point);
    }

    #[test]
    fn passes_through_control_points() {
        let pts = zigzag();
        let out = catmull_rom(&pts, SEGMENTS_PER_SPAN, false);
        for (i, p) in pts.iter().enumerate() {
            let sample = out[i * SEGMENTS_PER_SPAN];
            assert!(
                sample.point.distance(p.point) < 1e-9,
                "control point {i}: {:?} vs {:?}",
                sample.point,
                p.point,
            );
            assert!((sample.width - p.width).abs() < 1e-12);
            assert!((sample.opacity - p.opacity).abs() < 1e-12);
        }
    }

    #[test]
    fn width_and_opacity_interpolate_linearly() {
        let out = catmull_rom(&zigzag(), SEGMENTS_PER_SPAN, false);
        let mid = out[SEGMENTS_PER_SPAN / 2];
        assert!((mid.width - 1.5).abs() < 1e-12);
        assert!((mid.opacity - 0.9).abs() < 1e-12);
    }

    #[test]
    fn collinear_input_stays_on_line() {
        let pts: Vec<StrokePoint> = (0..5)
            .map(|i| sp(f64::from(i) * 3.0, 7.0, 1.0, 1.0))
            .collect();
        for s in catmull_rom(&pts, SEGMENTS_PER_SPAN, false) {
            assert!((s.point.y - 7.0).abs() < 1e-12);
        }
    }
}
