//! Frame diagnostics: timing, counts, and other metrics for each stage.
//!
//! Every call to [`FramePipeline::process_frame`](crate::FramePipeline::process_frame)
//! collects diagnostics alongside its results. They are permanent
//! instrumentation for tuning thresholds and smoothing against real
//! footage.
//!
//! Durations are measured through the [`Clock`] trait so hosts can supply
//! their own time source; [`SystemClock`] uses the `web-time` crate,
//! which maps to `performance.now()` on WASM and `std::time::Instant` on
//! native. Durations are serialized as fractional seconds (`f64`) since
//! `std::time::Duration` does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Contour, TrackedContour};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// A monotonic time source for stage timing.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`web_time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Instant = web_time::Instant;

    fn now(&self) -> web_time::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &web_time::Instant) -> Duration {
        since.elapsed()
    }
}

/// Diagnostics collected from processing one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameDiagnostics {
    /// Stage 1: thresholding and marching-squares extraction.
    pub extraction: StageDiagnostics,
    /// Stage 2: open-trace and minimum-area filtering.
    pub filter: StageDiagnostics,
    /// Stage 3: RDP simplification.
    pub simplification: StageDiagnostics,
    /// Stage 4: identity matching and smoothing.
    pub tracking: StageDiagnostics,
    /// Stage 5: trail history update.
    pub trails: StageDiagnostics,
    /// Stage 6: drawing.
    pub render: StageDiagnostics,
    /// Total wall-clock duration of the frame (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts for the frame.
    pub summary: FrameSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Contour extraction metrics.
    Extraction {
        /// Luminance threshold.
        threshold: f32,
        /// Number of contours traced.
        contour_count: usize,
        /// How many of them did not close.
        open_count: usize,
        /// Total points across all contours.
        total_point_count: usize,
    },
    /// Contour filtering metrics.
    Filter {
        /// Minimum area kept.
        min_area: f64,
        /// Whether open traces were dropped.
        discard_open: bool,
        /// Contours before filtering.
        contours_before: usize,
        /// Contours after filtering.
        contours_after: usize,
    },
    /// Simplification metrics.
    Simplification {
        /// RDP tolerance in normalized units.
        epsilon: f64,
        /// Total points before simplification.
        points_before: usize,
        /// Total points after simplification.
        points_after: usize,
        /// `1.0 - (after / before)`.
        reduction_ratio: f64,
    },
    /// Tracking metrics.
    Tracking {
        /// Live identities after the update.
        tracked: usize,
        /// Identities matched this frame.
        matched: usize,
        /// Identities minted this frame.
        minted: usize,
        /// Identities unmatched but not yet retired.
        fading: usize,
    },
    /// Trail update metrics.
    Trails {
        /// Identities holding a trail.
        trail_count: usize,
    },
    /// Render metrics.
    Render {
        /// Trail ribbons drawn.
        trails: usize,
        /// Live outline ribbons drawn.
        outlines: usize,
    },
}

/// High-level summary for the frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSummary {
    /// Frame timestamp (ms).
    pub timestamp: f64,
    /// Raster width in pixels.
    pub width: u32,
    /// Raster height in pixels.
    pub height: u32,
    /// Contours handed to the tracker.
    pub contour_count: usize,
    /// Identities returned by the tracker.
    pub tracked_count: usize,
}

impl FrameDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "Frame @ {:.1}ms  {}x{}  total {:.3}ms",
            self.summary.timestamp,
            self.summary.width,
            self.summary.height,
            duration_ms(self.total_duration),
        ));
        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Extraction", &self.extraction),
            ("Filter", &self.filter),
            ("Simplification", &self.simplification),
            ("Tracking", &self.tracking),
            ("Trails", &self.trails),
            ("Render", &self.render),
        ];
        for (name, diag) in stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(format!(
            "Contours: {}  |  Tracked: {}",
            self.summary.contour_count, self.summary.tracked_count,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Extraction {
            threshold,
            contour_count,
            open_count,
            total_point_count,
        } => format!(
            "threshold={threshold:.1} {contour_count} contours ({open_count} open), {total_point_count} pts"
        ),
        StageMetrics::Filter {
            min_area,
            discard_open,
            contours_before,
            contours_after,
        } => format!(
            "min_area={min_area:.4} discard_open={discard_open} {contours_before}->{contours_after}"
        ),
        StageMetrics::Simplification {
            epsilon,
            points_before,
            points_after,
            reduction_ratio,
        } => format!(
            "eps={epsilon:.4} {points_before}->{points_after} pts ({:.1}% reduction)",
            reduction_ratio * 100.0,
        ),
        StageMetrics::Tracking {
            tracked,
            matched,
            minted,
            fading,
        } => format!("{tracked} live ({matched} matched, {minted} new, {fading} fading)"),
        StageMetrics::Trails { trail_count } => format!("{trail_count} trails"),
        StageMetrics::Render { trails, outlines } => {
            format!("{trails} trails, {outlines} outlines")
        }
    }
}

/// Total points across a slice of contours.
pub(crate) fn total_points(contours: &[Contour]) -> usize {
    contours.iter().map(Contour::len).sum()
}

/// `1.0 - (after / before)`, or `0.0` when there was nothing to reduce.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn reduction_ratio(before: usize, after: usize) -> f64 {
    if before == 0 {
        0.0
    } else {
        1.0 - after as f64 / before as f64
    }
}

/// Split tracker output into `(matched, minted, fading)` counts at `timestamp`.
#[allow(clippy::float_cmp)]
pub(crate) fn tracking_counts(tracked: &[TrackedContour], timestamp: f64) -> (usize, usize, usize) {
    tracked
        .iter()
        .fold((0, 0, 0), |(matched, minted, fading), t| {
            if t.last_seen != timestamp {
                (matched, minted, fading + 1)
            } else if t.age == 0 {
                (matched, minted + 1, fading)
            } else {
                (matched + 1, minted, fading)
            }
        })
}
