//! Shared types for the contrail contour pipeline.

use serde::{Deserialize, Serialize};

use crate::contour::SaddleResolution;

/// Re-export `RgbaImage` so downstream crates can hand frames to the
/// extractor without depending on `image` directly.
pub use image::RgbaImage;

/// A 2D point in normalized raster coordinates.
///
/// Both axes run from `0.0` to `1.0` across the working raster, measured
/// against `width - 1` and `height - 1` so the last sample sits exactly
/// at `1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (fraction of the raster width).
    pub x: f64,
    /// Vertical position (fraction of the raster height).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Linear interpolation: `self` at `t = 0`, `other` at `t = 1`.
    #[must_use]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self::new(
            (other.x - self.x).mul_add(t, self.x),
            (other.y - self.y).mul_add(t, self.y),
        )
    }
}

/// Axis-aligned bounding box in normalized units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Horizontal extent (never negative).
    pub width: f64,
    /// Vertical extent (never negative).
    pub height: f64,
}

impl BoundingBox {
    /// Smallest box containing every point. Empty input yields a zero box.
    #[must_use]
    pub fn from_points(points: &[Point]) -> Self {
        let Some(first) = points.first() else {
            return Self::default();
        };

        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }
}

/// Arithmetic mean of a point set (not area-weighted).
///
/// Returns the origin for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn centroid(points: &[Point]) -> Point {
    if points.is_empty() {
        return Point::new(0.0, 0.0);
    }
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let n = points.len() as f64;
    Point::new(sx / n, sy / n)
}

/// Absolute polygon area via the shoelace formula.
///
/// The polygon is implicitly closed (last point connects back to the
/// first). Fewer than 3 points have no area.
#[must_use]
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0;
    for (i, a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        twice_area += a.x.mul_add(b.y, -(b.x * a.y));
    }
    (twice_area / 2.0).abs()
}

/// One boundary polyline produced by a single extraction pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    /// Sequential id, unique only within the extraction call that made it.
    pub id: u32,
    /// Ordered boundary trace.
    pub points: Vec<Point>,
    /// Mean of `points`.
    pub centroid: Point,
    /// Shoelace area of `points` in normalized units squared.
    pub area: f64,
    /// Extent of `points`.
    pub bounding_box: BoundingBox,
    /// Whether the trace returned to its start cell.
    ///
    /// Open traces left the raster or hit the iteration cap; their area
    /// is measured across the implicit closing edge.
    pub closed: bool,
}

impl Contour {
    /// Build a contour from a trace, deriving centroid, area, and bounds.
    #[must_use]
    pub fn new(id: u32, points: Vec<Point>, closed: bool) -> Self {
        Self {
            id,
            centroid: centroid(&points),
            area: polygon_area(&points),
            bounding_box: BoundingBox::from_points(&points),
            points,
            closed,
        }
    }

    /// Number of points in the trace.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if the trace has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A contour with a persistent identity and temporal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedContour {
    /// Latest matched geometry. `contour.id` is the persistent identity
    /// minted by the tracker, not the per-extraction id.
    #[serde(flatten)]
    pub contour: Contour,
    /// Centroid speed in normalized units per second.
    pub velocity: f64,
    /// Centroid velocity in normalized units per second.
    pub velocity_vector: Point,
    /// Consecutive matched frames; `0` on first detection.
    pub age: u32,
    /// Timestamp (ms) of the last successful match.
    pub last_seen: f64,
    /// Temporally smoothed shape; what rendering treats as current.
    pub smoothed_points: Vec<Point>,
}

impl TrackedContour {
    /// Persistent identity.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.contour.id
    }

    /// Centroid of the smoothed shape.
    #[must_use]
    pub const fn centroid(&self) -> Point {
        self.contour.centroid
    }

    /// How far through its fade-out window this identity is at `now`.
    ///
    /// `0.0` while matched this frame, rising linearly to `1.0` at
    /// [`FADE_OUT_DURATION`](crate::tracker::FADE_OUT_DURATION) ms since
    /// the last match.
    #[must_use]
    pub fn fade_progress(&self, now: f64) -> f64 {
        ((now - self.last_seen) / crate::tracker::FADE_OUT_DURATION).clamp(0.0, 1.0)
    }
}

/// One history sample of a tracked contour, stored newest-first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailPoint {
    /// Centroid x at sample time (normalized).
    pub x: f64,
    /// Centroid y at sample time (normalized).
    pub y: f64,
    /// Stroke width at sample time (pixels).
    pub width: f64,
    /// Stroke opacity at sample time (`0.0..=1.0`).
    pub opacity: f64,
    /// Sample timestamp (ms).
    pub timestamp: f64,
    /// Identity the sample belongs to.
    pub contour_id: u32,
}

impl TrailPoint {
    /// Sample position as a point.
    #[must_use]
    pub const fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// An 8-bit straight-alpha RGBA color.
///
/// Serialized as a `#rrggbbaa` hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel (`255` = opaque).
    pub a: u8,
}

impl Color {
    /// Opaque white.
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    /// Opaque color from RGB channels.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#rrggbb` or `#rrggbbaa` (the leading `#` is optional).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the string is not six
    /// or eight hex digits.
    pub fn from_hex(s: &str) -> Result<Self, PipelineError> {
        let digits = s.strip_prefix('#').unwrap_or(s);
        let invalid = || PipelineError::InvalidConfig(format!("invalid hex color '{s}'"));
        if !(digits.len() == 6 || digits.len() == 8) || !digits.is_ascii() {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid());
        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
            a: if digits.len() == 8 { channel(6)? } else { 255 },
        })
    }

    /// Format as `#rrggbbaa`.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

impl TryFrom<String> for Color {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// Stroke styling supplied fresh on every render call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderStyle {
    /// Stroke fill color.
    pub color: Color,
    /// Stroke width at rest, in surface pixels.
    pub base_width: f64,
    /// How strongly motion thins the stroke (`0.0..=1.0`).
    pub velocity_response: f64,
    /// How strongly trails narrow and fade toward their tail (`0.0..=1.0`).
    pub taper_amount: f64,
    /// Glow strength (`0.0..=1.0`); the shadow blur is `20 × intensity`.
    pub glow_intensity: f64,
    /// Glow color.
    pub glow_color: Color,
}

impl RenderStyle {
    /// Default stroke width in pixels.
    pub const DEFAULT_BASE_WIDTH: f64 = 3.0;
    /// Default velocity response.
    pub const DEFAULT_VELOCITY_RESPONSE: f64 = 0.5;
    /// Default taper amount.
    pub const DEFAULT_TAPER_AMOUNT: f64 = 0.7;
    /// Default glow intensity.
    pub const DEFAULT_GLOW_INTENSITY: f64 = 0.3;

    /// Stroke width for a contour moving at `velocity` (units/second).
    ///
    /// Faster motion thins the stroke; the result never drops below 0.5.
    #[must_use]
    pub fn width_for_velocity(&self, velocity: f64) -> f64 {
        let speed_factor = (velocity / 2.0).min(1.0);
        (self.base_width * speed_factor.mul_add(-self.velocity_response, 1.0)).max(0.5)
    }
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            base_width: Self::DEFAULT_BASE_WIDTH,
            velocity_response: Self::DEFAULT_VELOCITY_RESPONSE,
            taper_amount: Self::DEFAULT_TAPER_AMOUNT,
            glow_intensity: Self::DEFAULT_GLOW_INTENSITY,
            glow_color: Color::rgb(120, 200, 255),
        }
    }
}

/// Raster dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Byte length of a tightly packed RGBA8 buffer of these dimensions.
    #[must_use]
    pub const fn rgba_len(self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Configuration for one [`FramePipeline`](crate::FramePipeline).
///
/// Every field has a default matching the reference behavior; see the
/// `DEFAULT_*` associated constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Luminance threshold (`0.0..=255.0`); pixels at or above it are "on".
    pub threshold: f32,

    /// How marching-squares saddle cells are resolved.
    pub saddle_resolution: SaddleResolution,

    /// Drop traces that did not close (touching the raster edge).
    pub discard_open_contours: bool,

    /// Contours with a smaller area (normalized units squared) are dropped
    /// before tracking.
    pub min_area: f64,

    /// Ramer-Douglas-Peucker tolerance in normalized units. `0.0` keeps
    /// every traced point.
    pub simplify_epsilon: f64,

    /// Tracker EMA factor (`0.0..=1.0`); weight of the previous shape.
    pub smoothing: f64,

    /// Trail duration in seconds (capped at 10 s when pruning).
    pub trail_length: f64,

    /// Stroke styling.
    pub style: RenderStyle,
}

impl PipelineConfig {
    /// Default luminance threshold.
    pub const DEFAULT_THRESHOLD: f32 = 128.0;
    /// Default minimum contour area.
    pub const DEFAULT_MIN_AREA: f64 = 0.0005;
    /// Default RDP tolerance.
    pub const DEFAULT_SIMPLIFY_EPSILON: f64 = 0.002;
    /// Default EMA smoothing factor.
    pub const DEFAULT_SMOOTHING: f64 = 0.5;
    /// Default trail duration in seconds.
    pub const DEFAULT_TRAIL_LENGTH: f64 = 2.0;

    /// Check every field against its documented range.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first field
    /// that is out of range or not finite.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(0.0..=255.0).contains(&self.threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "threshold must be within 0..=255, got {}",
                self.threshold
            )));
        }
        non_negative("min_area", self.min_area)?;
        non_negative("simplify_epsilon", self.simplify_epsilon)?;
        non_negative("trail_length", self.trail_length)?;
        non_negative("style.base_width", self.style.base_width)?;
        unit_interval("smoothing", self.smoothing)?;
        unit_interval("style.velocity_response", self.style.velocity_response)?;
        unit_interval("style.taper_amount", self.style.taper_amount)?;
        unit_interval("style.glow_intensity", self.style.glow_intensity)?;
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
            saddle_resolution: SaddleResolution::default(),
            discard_open_contours: false,
            min_area: Self::DEFAULT_MIN_AREA,
            simplify_epsilon: Self::DEFAULT_SIMPLIFY_EPSILON,
            smoothing: Self::DEFAULT_SMOOTHING,
            trail_length: Self::DEFAULT_TRAIL_LENGTH,
            style: RenderStyle::default(),
        }
    }
}

fn non_negative(name: &str, value: f64) -> Result<(), PipelineError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(PipelineError::InvalidConfig(format!(
            "{name} must be finite and non-negative, got {value}"
        )))
    }
}

fn unit_interval(name: &str, value: f64) -> Result<(), PipelineError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PipelineError::InvalidConfig(format!(
            "{name} must be within 0..=1, got {value}"
        )))
    }
}

/// Errors raised at the fallible edges around the contour core.
///
/// Extraction, tracking, and rendering themselves never fail; these
/// cover configuration, frame hand-off, surfaces, and image loading.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode an input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// The frame buffer does not hold `width * height` RGBA pixels.
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    BufferSize {
        /// Required byte length.
        expected: usize,
        /// Supplied byte length.
        actual: usize,
    },

    /// A drawing surface cannot have a zero dimension.
    #[error("cannot create a {width}x{height} drawing surface")]
    EmptySurface {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
}

/// Serde-compatible proxy for `PipelineError`.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    ImageDecode(String),
    EmptyInput,
    InvalidConfig(String),
    BufferSize { expected: usize, actual: usize },
    EmptySurface { width: u32, height: u32 },
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s.clone()),
            Self::BufferSize { expected, actual } => PipelineErrorProxy::BufferSize {
                expected: *expected,
                actual: *actual,
            },
            Self::EmptySurface { width, height } => PipelineErrorProxy::EmptySurface {
                width: *width,
                height: *height,
            },
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            // The typed image error cannot be rebuilt; keep its message.
            PipelineErrorProxy::ImageDecode(msg) => {
                Self::InvalidConfig(format!("image decode error: {msg}"))
            }
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
            PipelineErrorProxy::BufferSize { expected, actual } => {
                Self::BufferSize { expected, actual }
            }
            PipelineErrorProxy::EmptySurface { width, height } => {
                Self::EmptySurface { width, height }
            }
        })
    }
}
