//! contrail-pipeline: contour extraction, tracking, and organic stroke
//! rendering for video frames (sans-IO).
//!
//! Three components form a strict per-frame chain:
//!
//! 1. [`contour`]: marching squares over a luminance-thresholded frame
//!    yields boundary polylines with centroid, area, and bounds.
//! 2. [`tracker`]: greedy nearest-centroid matching assigns stable
//!    identities, smooths shapes over time, and fades out lost ones.
//! 3. [`render`]: per-identity trails and live outlines are drawn as
//!    variable-width Catmull-Rom ribbons onto a [`Canvas`].
//!
//! [`FramePipeline`] sequences them (with RDP simplification and area
//! filtering in between) and reports per-stage [`diagnostics`].
//!
//! This crate has **no I/O dependencies**: frames arrive as in-memory
//! RGBA buffers and drawing goes through the [`Canvas`] trait.

pub mod blur;
pub mod canvas;
pub mod contour;
pub mod diagnostics;
pub mod luminance;
pub mod pipeline;
pub mod render;
pub mod ribbon;
pub mod simplify;
pub mod spline;
pub mod tracker;
pub mod trail;
pub mod types;

pub use canvas::{Canvas, DrawCommand, PixmapCanvas, RecordingCanvas};
pub use contour::{ContourExtractor, SaddleResolution, extract};
pub use diagnostics::{Clock, FrameDiagnostics, SystemClock};
pub use luminance::decode_rgba;
pub use pipeline::{FrameOutput, FramePipeline};
pub use render::{OrganicRenderer, RenderStats};
pub use simplify::{simplify, simplify_contour};
pub use tracker::ContourTracker;
pub use types::{
    BoundingBox, Color, Contour, Dimensions, PipelineConfig, PipelineError, Point, RenderStyle,
    RgbaImage, TrackedContour, TrailPoint,
};
