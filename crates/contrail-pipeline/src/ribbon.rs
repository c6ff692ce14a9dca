//! Variable-width ribbon outlines around stroke centerlines.
//!
//! A ribbon is a single closed polygon: the left offsets walked forward,
//! a semicircular cap around the last sample, the right offsets walked
//! back, and a semicircular cap around the first sample. Filling it with
//! the non-zero rule yields the stroke.

use crate::spline::StrokePoint;
use crate::types::Point;

/// Interior points per semicircular end cap (plus the two shared
/// endpoints on the side offsets).
pub const CAP_SEGMENTS: usize = 8;

/// Tangents shorter than this reuse the previous normal.
const MIN_TANGENT_LENGTH: f64 = 1e-6;

/// A filled stroke shape ready for a canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Ribbon {
    /// Closed outline polygon.
    pub outline: Vec<Point>,
    /// Mean opacity of the centerline samples.
    pub opacity: f64,
}

/// Build the outline polygon of a variable-width stroke.
///
/// Returns `None` for fewer than 2 samples. Coincident samples never
/// produce NaN: a zero-length tangent reuses the last good normal
/// (initially pointing down the y axis).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ribbon(samples: &[StrokePoint]) -> Option<Ribbon> {
    let n = samples.len();
    if n < 2 {
        return None;
    }

    let frames = normals(samples);
    let mut left = Vec::with_capacity(n);
    let mut right = Vec::with_capacity(n);
    for (s, &(_, normal)) in samples.iter().zip(&frames) {
        let half = s.width / 2.0;
        left.push(offset(s.point, normal, half));
        right.push(offset(s.point, normal, -half));
    }

    let mut outline = Vec::with_capacity(2 * n + 2 * (CAP_SEGMENTS - 1));
    outline.extend_from_slice(&left);

    let (end_tangent, end_normal) = frames[n - 1];
    let end = samples[n - 1];
    push_cap(&mut outline, end.point, end.width / 2.0, end_normal, end_tangent);

    outline.extend(right.iter().rev());

    let (start_tangent, start_normal) = frames[0];
    let start = samples[0];
    push_cap(
        &mut outline,
        start.point,
        start.width / 2.0,
        negate(start_normal),
        negate(start_tangent),
    );

    let opacity = samples.iter().map(|s| s.opacity).sum::<f64>() / n as f64;
    Some(Ribbon { outline, opacity })
}

/// Unit `(tangent, normal)` at every sample.
///
/// Central differences inside, one-sided differences at the ends. The
/// normal is the tangent rotated a quarter turn: `(-ty, tx)`.
fn normals(samples: &[StrokePoint]) -> Vec<(Point, Point)> {
    let n = samples.len();
    let mut last_normal = Point::new(0.0, 1.0);
    let mut frames = Vec::with_capacity(n);
    for i in 0..n {
        let a = samples[i.saturating_sub(1)].point;
        let b = samples[(i + 1).min(n - 1)].point;
        let (dx, dy) = (b.x - a.x, b.y - a.y);
        let len = dx.hypot(dy);
        if len >= MIN_TANGENT_LENGTH {
            last_normal = Point::new(-dy / len, dx / len);
        }
        // Tangent recovered from the normal so the pair stays orthonormal.
        frames.push((Point::new(last_normal.y, -last_normal.x), last_normal));
    }
    frames
}

/// Semicircle from `center + r * normal` around `center + r * tangent`
/// to `center - r * normal`, excluding both endpoints.
#[allow(clippy::cast_precision_loss)]
fn push_cap(out: &mut Vec<Point>, center: Point, radius: f64, normal: Point, tangent: Point) {
    for k in 1..CAP_SEGMENTS {
        let theta = std::f64::consts::PI * k as f64 / CAP_SEGMENTS as f64;
        let (sin, cos) = theta.sin_cos();
        out.push(Point::new(
            radius.mul_add(normal.x.mul_add(cos, tangent.x * sin), center.x),
            radius.mul_add(normal.y.mul_add(cos, tangent.y * sin), center.y),
        ));
    }
}

fn offset(p: Point, normal: Point, distance: f64) -> Point {
    Point::new(normal.x.mul_add(distance, p.x), normal.y.mul_add(distance, p.y))
}

const fn negate(p: Point) -> Point {
    Point::new(-p.x, -p.y)
}
