//! Contour extraction: marching squares over a thresholded frame.
//!
//! Every 2×2 block of pixels is a cell whose corners are classified on or
//! off, giving a 4-bit case index (`TL=8, TR=4, BR=2, BL=1`). Boundary
//! cells are walked one at a time, each step leaving through the edge the
//! case's boundary crosses. The direction table keeps the "on" region on
//! the right-hand side of travel (screen coordinates, y down), so every
//! closed boundary is traced with the same orientation.
//!
//! # Saddles
//!
//! Cases 5 and 10 (diagonal corners on) have two valid boundary
//! interpretations. [`SaddleResolution`] picks the rule; both emit the
//! cell center as the trace point.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::luminance::ThresholdGrid;
use crate::types::{Contour, Point, RgbaImage};

/// Traces shorter than this are discarded.
pub const MIN_CONTOUR_POINTS: usize = 3;

/// Selects how ambiguous saddle cells are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SaddleResolution {
    /// Treat the two "on" corners as separate regions and continue based
    /// only on the edge the trace entered through.
    ///
    /// Fast and deterministic, but not topologically exact: two blobs
    /// touching diagonally are always split.
    #[default]
    EntryDirection,

    /// Asymptotic decider: average the four corner luminances and treat
    /// the "on" corners as connected when the average meets the
    /// threshold.
    CenterAverage,
}

/// One step of a trace, from a cell to its neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Up,
    Down,
    Left,
    Right,
}

impl Step {
    const fn offset(self) -> (isize, isize) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }
}

/// Exit direction for a cell case, given how the trace entered the cell.
///
/// `connected` only matters for saddles: whether the diagonal "on"
/// corners belong to one region. Returns `None` for cases 0 and 15,
/// which carry no boundary.
const fn exit_step(case: u8, entered: Option<Step>, connected: bool) -> Option<Step> {
    let step = match case {
        1 | 9 | 13 => Step::Down,
        2 | 3 | 11 => Step::Right,
        4 | 6 | 7 => Step::Up,
        8 | 12 | 14 => Step::Left,
        // TR + BL on. Entered through the right edge when moving left.
        5 => {
            let from_right = matches!(entered, Some(Step::Left));
            if from_right != connected {
                Step::Up
            } else {
                Step::Down
            }
        }
        // TL + BR on. Entered through the bottom edge when moving up.
        10 => {
            let from_bottom = matches!(entered, Some(Step::Up));
            if from_bottom != connected {
                Step::Right
            } else {
                Step::Left
            }
        }
        _ => return None,
    };
    Some(step)
}

/// Marching-squares extractor configuration.
///
/// Holds no scan state: each call allocates its own scratch, so one
/// extractor can be reused freely across frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContourExtractor {
    /// Luminance threshold (`0.0..=255.0`).
    pub threshold: f32,
    /// Saddle disambiguation rule.
    pub saddle_resolution: SaddleResolution,
}

impl ContourExtractor {
    /// Extractor with the default saddle rule.
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self {
            threshold,
            saddle_resolution: SaddleResolution::EntryDirection,
        }
    }

    /// Replace the saddle rule.
    #[must_use]
    pub const fn with_saddle_resolution(mut self, saddle_resolution: SaddleResolution) -> Self {
        self.saddle_resolution = saddle_resolution;
        self
    }

    /// Extract contours from a tightly packed RGBA8 buffer.
    ///
    /// `pixels` must hold `width * height * 4` bytes.
    #[must_use = "returns the extracted contours"]
    pub fn extract(&self, pixels: &[u8], width: usize, height: usize) -> Vec<Contour> {
        let grid = ThresholdGrid::from_rgba(pixels, width, height, self.threshold);
        self.extract_grid(&grid)
    }

    /// Extract contours from a decoded RGBA image.
    #[must_use = "returns the extracted contours"]
    pub fn extract_image(&self, image: &RgbaImage) -> Vec<Contour> {
        let grid = ThresholdGrid::from_image(image, self.threshold);
        self.extract_grid(&grid)
    }

    /// Extract contours from an already thresholded grid.
    #[must_use = "returns the extracted contours"]
    pub fn extract_grid(&self, grid: &ThresholdGrid) -> Vec<Contour> {
        if grid.width() < 2 || grid.height() < 2 {
            return Vec::new();
        }

        let mut scan = Scan::new(grid, self.saddle_resolution);
        let mut contours = Vec::new();
        let mut next_id = 0;

        for y in 0..scan.cells_high {
            for x in 0..scan.cells_wide {
                let case = scan.case_at(x, y);
                if case == 0 || case == 15 || scan.is_visited(x, y, case) {
                    continue;
                }

                let (points, closed) = scan.trace(x, y);
                if points.len() < MIN_CONTOUR_POINTS {
                    continue;
                }
                contours.push(Contour::new(next_id, points, closed));
                next_id += 1;
            }
        }

        debug!(
            contours = contours.len(),
            width = grid.width(),
            height = grid.height(),
            "marching squares scan complete"
        );
        contours
    }
}

/// Extract contours with the default saddle rule.
///
/// `pixels` is an interleaved RGBA8 buffer of `width * height * 4` bytes;
/// a pixel is "on" when `0.299R + 0.587G + 0.114B >= threshold`. Uniform
/// frames produce no contours.
#[must_use = "returns the extracted contours"]
pub fn extract(pixels: &[u8], width: usize, height: usize, threshold: f32) -> Vec<Contour> {
    ContourExtractor::new(threshold).extract(pixels, width, height)
}

/// Per-call scan scratch: visited `(cell, case)` pairs and the grid view.
struct Scan<'a> {
    grid: &'a ThresholdGrid,
    saddle_resolution: SaddleResolution,
    cells_wide: usize,
    cells_high: usize,
    /// Bit `case` set once `(cell, case)` has been walked.
    visited: Vec<u16>,
    max_iterations: usize,
    span_x: f64,
    span_y: f64,
}

impl<'a> Scan<'a> {
    #[allow(clippy::cast_precision_loss)]
    fn new(grid: &'a ThresholdGrid, saddle_resolution: SaddleResolution) -> Self {
        let cells_wide = grid.width() - 1;
        let cells_high = grid.height() - 1;
        Self {
            grid,
            saddle_resolution,
            cells_wide,
            cells_high,
            visited: vec![0; cells_wide * cells_high],
            max_iterations: 2 * grid.width() * grid.height(),
            span_x: cells_wide as f64,
            span_y: cells_high as f64,
        }
    }

    fn case_at(&self, x: usize, y: usize) -> u8 {
        let g = self.grid;
        (u8::from(g.is_on(x, y)) << 3)
            | (u8::from(g.is_on(x + 1, y)) << 2)
            | (u8::from(g.is_on(x + 1, y + 1)) << 1)
            | u8::from(g.is_on(x, y + 1))
    }

    fn is_visited(&self, x: usize, y: usize, case: u8) -> bool {
        self.visited[y * self.cells_wide + x] & (1 << case) != 0
    }

    fn mark_visited(&mut self, x: usize, y: usize, case: u8) {
        self.visited[y * self.cells_wide + x] |= 1 << case;
    }

    /// Whether the diagonal "on" corners of a saddle cell are joined.
    fn saddle_connected(&self, x: usize, y: usize) -> bool {
        match self.saddle_resolution {
            SaddleResolution::EntryDirection => false,
            SaddleResolution::CenterAverage => {
                let g = self.grid;
                let sum = g.luma(x, y) + g.luma(x + 1, y) + g.luma(x + 1, y + 1) + g.luma(x, y + 1);
                sum / 4.0 >= g.threshold()
            }
        }
    }

    /// Normalized trace point for leaving cell `(x, y)` via `step`.
    #[allow(clippy::cast_precision_loss)]
    fn exit_point(&self, x: usize, y: usize, case: u8, step: Step) -> Point {
        let (x, y) = (x as f64, y as f64);
        let (px, py) = if case == 5 || case == 10 {
            (x + 0.5, y + 0.5)
        } else {
            match step {
                Step::Up => (x + 0.5, y),
                Step::Down => (x + 0.5, y + 1.0),
                Step::Left => (x, y + 0.5),
                Step::Right => (x + 1.0, y + 0.5),
            }
        };
        Point::new(px / self.span_x, py / self.span_y)
    }

    /// Walk one boundary starting at cell `(start_x, start_y)`.
    ///
    /// Returns the trace and whether it closed on its start cell.
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    fn trace(&mut self, start_x: usize, start_y: usize) -> (Vec<Point>, bool) {
        let mut points = Vec::new();
        let (mut x, mut y) = (start_x, start_y);
        let mut entered = None;

        for _ in 0..self.max_iterations {
            let case = self.case_at(x, y);
            let connected = (case == 5 || case == 10) && self.saddle_connected(x, y);
            let Some(step) = exit_step(case, entered, connected) else {
                trace!(x, y, case, "trace reached a cell with no boundary");
                return (points, false);
            };

            points.push(self.exit_point(x, y, case, step));
            self.mark_visited(x, y, case);

            let (dx, dy) = step.offset();
            let nx = x as isize + dx;
            let ny = y as isize + dy;
            if nx < 0 || ny < 0 || nx >= self.cells_wide as isize || ny >= self.cells_high as isize {
                trace!(start_x, start_y, len = points.len(), "trace left the raster");
                return (points, false);
            }
            (x, y) = (nx as usize, ny as usize);
            entered = Some(step);

            if x == start_x && y == start_y {
                return (points, true);
            }
        }

        trace!(start_x, start_y, "trace hit the iteration cap");
        (points, false)
    }
}
