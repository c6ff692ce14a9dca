//! Per-frame composition of extraction, tracking, and rendering.
//!
//! [`FramePipeline`] owns one tracker and one renderer and runs the whole
//! chain for each video frame:
//!
//! ```rust
//! # use contrail_pipeline::{Dimensions, FramePipeline, PipelineConfig, PipelineError, RecordingCanvas};
//! # fn run(frames: &[(Vec<u8>, f64)]) -> Result<(), PipelineError> {
//! let mut pipeline = FramePipeline::new(PipelineConfig::default())?;
//! let frame = Dimensions { width: 320, height: 180 };
//! let mut canvas = RecordingCanvas::new();
//!
//! for (pixels, timestamp) in frames {
//!     let output = pipeline.process_frame(pixels, frame, *timestamp, &mut canvas, frame)?;
//!     println!("{}", output.diagnostics.report());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The pipeline adds no semantics of its own: it validates the buffer,
//! then extracts, filters, simplifies, tracks, updates trails, and draws.

use tracing::debug;

use crate::canvas::Canvas;
use crate::contour::ContourExtractor;
use crate::diagnostics::{
    Clock, FrameDiagnostics, FrameSummary, StageDiagnostics, StageMetrics, SystemClock,
    reduction_ratio, total_points, tracking_counts,
};
use crate::render::{OrganicRenderer, RenderStats};
use crate::simplify::simplify_contour;
use crate::tracker::ContourTracker;
use crate::types::{Contour, Dimensions, PipelineConfig, PipelineError, TrackedContour};

/// Everything one frame produced.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    /// Live identities after this frame, ascending by id.
    pub contours: Vec<TrackedContour>,
    /// What was drawn.
    pub render: RenderStats,
    /// Per-stage timing and counts.
    pub diagnostics: FrameDiagnostics,
}

/// Stateful extract → track → render chain for a video stream.
#[derive(Debug, Clone)]
pub struct FramePipeline {
    config: PipelineConfig,
    extractor: ContourExtractor,
    tracker: ContourTracker,
    renderer: OrganicRenderer,
}

impl FramePipeline {
    /// Create a pipeline with empty tracking and trail state.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` fails
    /// [`PipelineConfig::validate`].
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            extractor: extractor_for(&config),
            tracker: ContourTracker::with_smoothing(config.smoothing),
            renderer: OrganicRenderer::new(),
            config,
        })
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Replace the configuration, keeping identities and trails.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` fails
    /// validation; the previous configuration stays in effect.
    pub fn set_config(&mut self, config: PipelineConfig) -> Result<(), PipelineError> {
        config.validate()?;
        self.extractor = extractor_for(&config);
        self.tracker.set_smoothing(config.smoothing);
        self.config = config;
        Ok(())
    }

    /// The identity tracker.
    #[must_use]
    pub const fn tracker(&self) -> &ContourTracker {
        &self.tracker
    }

    /// The renderer and its trail histories.
    #[must_use]
    pub const fn renderer(&self) -> &OrganicRenderer {
        &self.renderer
    }

    /// Forget every identity and trail.
    pub fn reset(&mut self) {
        self.tracker.clear();
        self.renderer.clear_trails();
    }

    /// Extract, filter, and simplify one frame's contours.
    ///
    /// Stateless with respect to tracking.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::BufferSize`] if `pixels` is not exactly
    /// `frame.width * frame.height * 4` bytes.
    pub fn extract_contours(
        &self,
        pixels: &[u8],
        frame: Dimensions,
    ) -> Result<Vec<Contour>, PipelineError> {
        check_buffer(pixels, frame)?;
        let raw = self.extract_raw(pixels, frame);
        Ok(self.simplify(self.filter(raw)))
    }

    /// Run the full chain for one frame with the system clock.
    ///
    /// `frame` describes the pixel buffer; `surface` is the pixel size
    /// the canvas draws at. `timestamp` is in milliseconds and must not
    /// decrease between calls.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::BufferSize`] if `pixels` is not exactly
    /// `frame.width * frame.height * 4` bytes. Tracking and trail state are
    /// untouched on error.
    pub fn process_frame(
        &mut self,
        pixels: &[u8],
        frame: Dimensions,
        timestamp: f64,
        canvas: &mut impl Canvas,
        surface: Dimensions,
    ) -> Result<FrameOutput, PipelineError> {
        self.process_frame_with_clock(pixels, frame, timestamp, canvas, surface, &SystemClock)
    }

    /// [`process_frame`](Self::process_frame) timed by a caller-supplied clock.
    ///
    /// # Errors
    ///
    /// Same as [`process_frame`](Self::process_frame).
    pub fn process_frame_with_clock<C: Clock>(
        &mut self,
        pixels: &[u8],
        frame: Dimensions,
        timestamp: f64,
        canvas: &mut impl Canvas,
        surface: Dimensions,
        clock: &C,
    ) -> Result<FrameOutput, PipelineError> {
        check_buffer(pixels, frame)?;
        let frame_start = clock.now();

        // 1. Extraction.
        let start = clock.now();
        let raw = self.extract_raw(pixels, frame);
        let extraction = StageDiagnostics {
            duration: clock.elapsed(&start),
            metrics: StageMetrics::Extraction {
                threshold: self.config.threshold,
                contour_count: raw.len(),
                open_count: raw.iter().filter(|c| !c.closed).count(),
                total_point_count: total_points(&raw),
            },
        };

        // 2. Filtering.
        let start = clock.now();
        let contours_before = raw.len();
        let kept = self.filter(raw);
        let filter = StageDiagnostics {
            duration: clock.elapsed(&start),
            metrics: StageMetrics::Filter {
                min_area: self.config.min_area,
                discard_open: self.config.discard_open_contours,
                contours_before,
                contours_after: kept.len(),
            },
        };

        // 3. Simplification.
        let start = clock.now();
        let points_before = total_points(&kept);
        let simplified = self.simplify(kept);
        let points_after = total_points(&simplified);
        let simplification = StageDiagnostics {
            duration: clock.elapsed(&start),
            metrics: StageMetrics::Simplification {
                epsilon: self.config.simplify_epsilon,
                points_before,
                points_after,
                reduction_ratio: reduction_ratio(points_before, points_after),
            },
        };

        // 4. Tracking.
        let start = clock.now();
        let tracked = self.tracker.update(&simplified, timestamp);
        let (matched, minted, fading) = tracking_counts(&tracked, timestamp);
        let tracking = StageDiagnostics {
            duration: clock.elapsed(&start),
            metrics: StageMetrics::Tracking {
                tracked: tracked.len(),
                matched,
                minted,
                fading,
            },
        };

        // 5. Trails.
        let start = clock.now();
        self.renderer.update_trails(
            &tracked,
            timestamp,
            self.config.trail_length,
            &self.config.style,
        );
        let trails = StageDiagnostics {
            duration: clock.elapsed(&start),
            metrics: StageMetrics::Trails {
                trail_count: self.renderer.trail_count(),
            },
        };

        // 6. Render.
        let start = clock.now();
        let render_stats = self.renderer.render(
            canvas,
            &tracked,
            &self.config.style,
            surface.width,
            surface.height,
            timestamp,
        );
        let render = StageDiagnostics {
            duration: clock.elapsed(&start),
            metrics: StageMetrics::Render {
                trails: render_stats.trails,
                outlines: render_stats.outlines,
            },
        };

        debug!(
            timestamp,
            contours = simplified.len(),
            tracked = tracked.len(),
            minted,
            fading,
            "processed frame"
        );

        let diagnostics = FrameDiagnostics {
            extraction,
            filter,
            simplification,
            tracking,
            trails,
            render,
            total_duration: clock.elapsed(&frame_start),
            summary: FrameSummary {
                timestamp,
                width: frame.width,
                height: frame.height,
                contour_count: simplified.len(),
                tracked_count: tracked.len(),
            },
        };

        Ok(FrameOutput {
            contours: tracked,
            render: render_stats,
            diagnostics,
        })
    }

    fn extract_raw(&self, pixels: &[u8], frame: Dimensions) -> Vec<Contour> {
        self.extractor
            .extract(pixels, frame.width as usize, frame.height as usize)
    }

    fn filter(&self, contours: Vec<Contour>) -> Vec<Contour> {
        contours
            .into_iter()
            .filter(|c| c.closed || !self.config.discard_open_contours)
            .filter(|c| c.area >= self.config.min_area)
            .collect()
    }

    fn simplify(&self, contours: Vec<Contour>) -> Vec<Contour> {
        if self.config.simplify_epsilon <= 0.0 {
            return contours;
        }
        contours
            .iter()
            .map(|c| simplify_contour(c, self.config.simplify_epsilon))
            .collect()
    }
}

fn extractor_for(config: &PipelineConfig) -> ContourExtractor {
    ContourExtractor::new(config.threshold).with_saddle_resolution(config.saddle_resolution)
}

fn check_buffer(pixels: &[u8], frame: Dimensions) -> Result<(), PipelineError> {
    let expected = frame.rgba_len();
    if pixels.len() == expected {
        Ok(())
    } else {
        Err(PipelineError::BufferSize {
            expected,
            actual: pixels.len(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration;

    use super::*;
    use crate::canvas::RecordingCanvas;

    const FRAME: Dimensions = Dimensions {
        width: 40,
        height: 30,
    };

    /// Dark frame with a bright axis-aligned rectangle.
    fn frame_with_rect(x0: u32, y0: u32, w: u32, h: u32) -> Vec<u8> {
        let mut pixels = vec![0u8; FRAME.rgba_len()];
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                let i = ((y * FRAME.width + x) * 4) as usize;
                pixels[i..i + 4].copy_from_slice(&[255, 255, 255, 255]);
            }
        }
        pixels
    }

    /// Clock that advances one millisecond per reading.
    struct TickClock(Cell<u64>);

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get() + 1;
            self.0.set(t);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.0.get() - since)
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = PipelineConfig {
            smoothing: 2.0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            FramePipeline::new(config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let mut pipeline = FramePipeline::new(PipelineConfig::default()).unwrap();
        let mut canvas = RecordingCanvas::new();
        let result = pipeline.process_frame(&[0; 12], FRAME, 0.0, &mut canvas, FRAME);
        assert!(matches!(
            result,
            Err(PipelineError::BufferSize {
                expected: 4800,
                actual: 12
            })
        ));
        assert_eq!(pipeline.tracker().tracked_count(), 0);
        assert!(canvas.commands().is_empty());
    }

    #[test]
    fn single_rect_is_tracked_and_drawn() {
        let mut pipeline = FramePipeline::new(PipelineConfig::default()).unwrap();
        let mut canvas = RecordingCanvas::new();
        let output = pipeline
            .process_frame(&frame_with_rect(10, 10, 8, 6), FRAME, 0.0, &mut canvas, FRAME)
            .unwrap();
        assert_eq!(output.contours.len(), 1);
        assert_eq!(output.render.outlines, 1);
        assert_eq!(output.diagnostics.summary.tracked_count, 1);
        assert!(canvas.fill_count() >= 1);
    }

    #[test]
    fn identity_persists_across_frames() {
        let mut pipeline = FramePipeline::new(PipelineConfig::default()).unwrap();
        let mut canvas = RecordingCanvas::new();
        for (x, i) in (10..16).zip(0u32..) {
            let t = 33.0 * f64::from(i);
            let output = pipeline
                .process_frame(&frame_with_rect(x, 10, 8, 6), FRAME, t, &mut canvas, FRAME)
                .unwrap();
            assert_eq!(output.contours.len(), 1);
            assert_eq!(output.contours[0].id(), 0);
        }
        assert_eq!(pipeline.renderer().trail(0).unwrap().len(), 6);
    }

    #[test]
    fn min_area_filters_small_blobs() {
        let config = PipelineConfig {
            min_area: 0.5,
            ..PipelineConfig::default()
        };
        let pipeline = FramePipeline::new(config).unwrap();
        let contours = pipeline
            .extract_contours(&frame_with_rect(10, 10, 8, 6), FRAME)
            .unwrap();
        assert!(contours.is_empty());
    }

    #[test]
    fn open_traces_can_be_discarded() {
        // Touches the left edge, so the trace walks off the raster.
        let pixels = frame_with_rect(0, 10, 8, 6);
        let keep = FramePipeline::new(PipelineConfig::default()).unwrap();
        let kept = keep.extract_contours(&pixels, FRAME).unwrap();
        assert!(kept.iter().any(|c| !c.closed));

        let discard = FramePipeline::new(PipelineConfig {
            discard_open_contours: true,
            ..PipelineConfig::default()
        })
        .unwrap();
        assert!(discard.extract_contours(&pixels, FRAME).unwrap().is_empty());
    }

    #[test]
    fn simplification_reduces_points() {
        let mut config = PipelineConfig {
            simplify_epsilon: 0.0,
            ..PipelineConfig::default()
        };
        let pixels = frame_with_rect(10, 10, 12, 8);
        let raw = FramePipeline::new(config.clone())
            .unwrap()
            .extract_contours(&pixels, FRAME)
            .unwrap();
        config.simplify_epsilon = 0.01;
        let simplified = FramePipeline::new(config)
            .unwrap()
            .extract_contours(&pixels, FRAME)
            .unwrap();
        assert!(total_points(&simplified) < total_points(&raw));
    }

    #[test]
    fn stage_durations_come_from_clock() {
        let mut pipeline = FramePipeline::new(PipelineConfig::default()).unwrap();
        let mut canvas = RecordingCanvas::new();
        let clock = TickClock(Cell::new(0));
        let output = pipeline
            .process_frame_with_clock(
                &frame_with_rect(10, 10, 8, 6),
                FRAME,
                0.0,
                &mut canvas,
                FRAME,
                &clock,
            )
            .unwrap();
        let diag = output.diagnostics;
        // Each stage reads the clock once at its start.
        assert_eq!(diag.extraction.duration, Duration::ZERO);
        assert_eq!(diag.total_duration, Duration::from_millis(6));
        assert!(diag.report().contains("Tracking"));
    }

    #[test]
    fn set_config_updates_smoothing_and_rejects_invalid() {
        let mut pipeline = FramePipeline::new(PipelineConfig::default()).unwrap();
        pipeline
            .set_config(PipelineConfig {
                smoothing: 0.9,
                ..PipelineConfig::default()
            })
            .unwrap();
        assert!((pipeline.tracker().smoothing() - 0.9).abs() < f64::EPSILON);

        let bad = PipelineConfig {
            threshold: -1.0,
            ..PipelineConfig::default()
        };
        assert!(pipeline.set_config(bad).is_err());
        assert!((pipeline.config().smoothing - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn reset_forgets_identities_and_trails() {
        let mut pipeline = FramePipeline::new(PipelineConfig::default()).unwrap();
        let mut canvas = RecordingCanvas::new();
        pipeline
            .process_frame(&frame_with_rect(10, 10, 8, 6), FRAME, 0.0, &mut canvas, FRAME)
            .unwrap();
        pipeline.reset();
        assert_eq!(pipeline.tracker().tracked_count(), 0);
        assert_eq!(pipeline.renderer().trail_count(), 0);
    }
}
