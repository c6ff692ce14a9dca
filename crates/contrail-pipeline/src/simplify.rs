//! Contour simplification using the Ramer-Douglas-Peucker algorithm.
//!
//! Reduces point count in traced contours by removing points that lie
//! within a given tolerance of the chord between their neighbors.
//! Marching squares emits one point per boundary cell, so straight runs
//! collapse to their endpoints.

use crate::types::{Contour, Point};

/// Simplify a point sequence using the Ramer-Douglas-Peucker algorithm.
///
/// Points within `epsilon` (normalized units) of the chord between their
/// segment's endpoints are removed. An epsilon of 0.0 keeps every point
/// that deviates at all.
///
/// Sequences with fewer than 3 points are returned unchanged (nothing to
/// simplify). The result is idempotent: simplifying it again with the
/// same epsilon returns it unchanged.
#[must_use = "returns the simplified points"]
pub fn simplify(points: &[Point], epsilon: f64) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut kept = vec![false; points.len()];
    kept[0] = true;
    kept[points.len() - 1] = true;

    rdp_recurse(points, 0, points.len() - 1, epsilon, &mut kept);

    points
        .iter()
        .zip(&kept)
        .filter(|&(_, k)| *k)
        .map(|(&p, _)| p)
        .collect()
}

/// Simplify a contour's points and re-derive its metrics.
///
/// The id and `closed` flag carry over.
#[must_use = "returns the simplified contour"]
pub fn simplify_contour(contour: &Contour, epsilon: f64) -> Contour {
    Contour::new(
        contour.id,
        simplify(&contour.points, epsilon),
        contour.closed,
    )
}

/// Recursive step of the Ramer-Douglas-Peucker algorithm.
///
/// Finds the point between `start` and `end` that is farthest from the
/// chord between them. If that distance exceeds `epsilon`, the point is
/// kept and both sub-segments are processed recursively.
fn rdp_recurse(points: &[Point], start: usize, end: usize, epsilon: f64, kept: &mut [bool]) {
    if end <= start + 1 {
        return;
    }

    let mut max_dist = 0.0;
    let mut max_idx = start;

    for i in (start + 1)..end {
        let d = perpendicular_distance(points[i], points[start], points[end]);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }

    if max_dist > epsilon {
        kept[max_idx] = true;
        rdp_recurse(points, start, max_idx, epsilon, kept);
        rdp_recurse(points, max_idx, end, epsilon, kept);
    }
}

/// Perpendicular distance from point `p` to the line through `a` and `b`.
///
/// Uses |cross(b-a, p-a)| / |b-a|. When `a` and `b` coincide (a closed
/// trace whose first and last points meet), returns the distance from
/// `p` to `a`.
fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx.mul_add(dx, dy * dy);

    if length_sq == 0.0 {
        return p.distance(a);
    }

    let cross = dx.mul_add(a.y - p.y, -(dy * (a.x - p.x)));
    cross.abs() / length_sq.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zigzag() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(0.2, 0.5),
            Point::new(0.4, 0.0),
            Point::new(0.6, 0.5),
            Point::new(0.8, 0.0),
        ]
    }

    #[test]
    fn short_sequences_unchanged() {
        assert!(simplify(&[], 0.1).is_empty());
        let two = [Point::new(0.0, 0.0), Point::new(1.0, 0.0)];
        assert_eq!(simplify(&two, 0.1), two.to_vec());
    }

    #[test]
    fn collinear_points_collapse_to_endpoints() {
        let pts: Vec<Point> = (0..5)
            .map(|i| Point::new(f64::from(i) * 0.1, f64::from(i) * 0.1))
            .collect();
        let result = simplify(&pts, 0.01);
        assert_eq!(result, vec![pts[0], pts[4]]);
    }

    #[test]
    fn zigzag_retains_peaks_below_tolerance() {
        assert_eq!(simplify(&zigzag(), 0.1).len(), 5);
    }

    #[test]
    fn large_tolerance_collapses_zigzag() {
        assert_eq!(simplify(&zigzag(), 1.0).len(), 2);
    }

    #[test]
    fn simplify_is_idempotent() {
        let pts: Vec<Point> = (0..40)
            .map(|i| {
                let t = f64::from(i) * 0.157;
                Point::new(t.cos().mul_add(0.3, 0.5), (t * 1.7).sin().mul_add(0.2, 0.5))
            })
            .collect();
        for epsilon in [0.0, 0.005, 0.02, 0.1, 0.5] {
            let once = simplify(&pts, epsilon);
            let twice = simplify(&once, epsilon);
            assert_eq!(once, twice, "epsilon {epsilon}");
        }
    }

    #[test]
    fn coincident_endpoints_use_point_distance() {
        // A closed loop whose trace starts and ends at the same point.
        let loop_pts = vec![
            Point::new(0.0, 0.0),
            Point::new(0.3, 0.0),
            Point::new(0.3, 0.3),
            Point::new(0.0, 0.0),
        ];
        let result = simplify(&loop_pts, 0.1);
        assert!(result.contains(&Point::new(0.3, 0.3)));
    }

    #[test]
    fn simplify_contour_recomputes_metrics() {
        let mut points = vec![
            Point::new(0.0, 0.0),
            Point::new(0.5, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        let contour = Contour::new(3, points.clone(), true);
        let simplified = simplify_contour(&contour, 0.01);
        points.remove(1);
        assert_eq!(simplified.points, points);
        assert_eq!(simplified.id, 3);
        assert!(simplified.closed);
        assert!((simplified.area - 1.0).abs() < 1e-12);
        assert_eq!(simplified.centroid, Point::new(0.5, 0.5));
    }

    #[test]
    fn perpendicular_distance_on_axis() {
        let d = perpendicular_distance(
            Point::new(1.0, 3.0),
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
        );
        assert!((d - 3.0).abs() < 1e-10);
    }

    #[test]
    fn perpendicular_distance_coincident_endpoints() {
        let d = perpendicular_distance(
            Point::new(3.0, 4.0),
            Point::new(0.0, 0.0),
            Point::new(0.0, 0.0),
        );
        assert!((d - 5.0).abs() < 1e-10);
    }
}
