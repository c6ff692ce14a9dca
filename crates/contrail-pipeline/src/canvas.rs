//! Drawing surfaces the renderer paints onto.
//!
//! The renderer only ever fills closed outlines and brackets some of them
//! with a glow. [`PixmapCanvas`] rasterizes with `tiny-skia`;
//! [`RecordingCanvas`] keeps the commands for a host to replay.

use serde::{Deserialize, Serialize};
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, PixmapPaint, Transform};
use tracing::trace;

use crate::blur::blur_premultiplied;
use crate::types::{Color, PipelineError, Point, RgbaImage};

/// A 2D surface that can fill polygons and draw a blurred glow under them.
pub trait Canvas {
    /// Fill a closed polygon (non-zero rule) in `color`, scaled by `opacity`.
    ///
    /// Coordinates are surface pixels.
    fn fill_path(&mut self, outline: &[Point], color: Color, opacity: f64);

    /// Start a glow: fills until [`end_glow`](Self::end_glow) cast a
    /// shadow of `color` blurred by `blur` pixels.
    fn begin_glow(&mut self, color: Color, blur: f64);

    /// Finish the current glow.
    fn end_glow(&mut self);
}

/// One recorded canvas call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DrawCommand {
    /// [`Canvas::fill_path`].
    FillPath {
        /// Closed outline in surface pixels.
        outline: Vec<Point>,
        /// Fill color.
        color: Color,
        /// Opacity multiplier.
        opacity: f64,
    },
    /// [`Canvas::begin_glow`].
    BeginGlow {
        /// Shadow color.
        color: Color,
        /// Shadow blur in pixels.
        blur: f64,
    },
    /// [`Canvas::end_glow`].
    EndGlow,
}

/// Canvas that records every call.
#[derive(Debug, Clone, Default)]
pub struct RecordingCanvas {
    commands: Vec<DrawCommand>,
}

impl RecordingCanvas {
    /// Create an empty recording.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Commands recorded so far, in call order.
    #[must_use]
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Take the recorded commands, leaving the recording empty.
    pub fn take(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Number of recorded fills.
    #[must_use]
    pub fn fill_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::FillPath { .. }))
            .count()
    }

    /// Replay the recording onto another canvas.
    pub fn replay(&self, target: &mut impl Canvas) {
        for command in &self.commands {
            match command {
                DrawCommand::FillPath {
                    outline,
                    color,
                    opacity,
                } => target.fill_path(outline, *color, *opacity),
                DrawCommand::BeginGlow { color, blur } => target.begin_glow(*color, *blur),
                DrawCommand::EndGlow => target.end_glow(),
            }
        }
    }
}

impl Canvas for RecordingCanvas {
    fn fill_path(&mut self, outline: &[Point], color: Color, opacity: f64) {
        self.commands.push(DrawCommand::FillPath {
            outline: outline.to_vec(),
            color,
            opacity,
        });
    }

    fn begin_glow(&mut self, color: Color, blur: f64) {
        self.commands.push(DrawCommand::BeginGlow { color, blur });
    }

    fn end_glow(&mut self) {
        self.commands.push(DrawCommand::EndGlow);
    }
}

/// An in-progress glow: the fills it covers, held back until the blurred
/// shadow has been composited beneath them.
#[derive(Debug)]
struct Glow {
    color: Color,
    blur: f64,
    fills: Vec<(tiny_skia::Path, Color, f64)>,
}

/// Anti-aliased raster surface backed by a `tiny-skia` pixmap.
#[derive(Debug)]
pub struct PixmapCanvas {
    pixmap: Pixmap,
    glow: Option<Glow>,
}

impl PixmapCanvas {
    /// Create a transparent surface.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptySurface`] if either dimension is zero
    /// (or the surface is too large to allocate).
    pub fn new(width: u32, height: u32) -> Result<Self, PipelineError> {
        let pixmap = Pixmap::new(width, height).ok_or(PipelineError::EmptySurface { width, height })?;
        Ok(Self { pixmap, glow: None })
    }

    /// Surface width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    /// Surface height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Fill the whole surface with `color`, discarding what was drawn.
    pub fn clear(&mut self, color: Color) {
        self.pixmap.fill(skia_color(color, 1.0));
    }

    /// The underlying premultiplied pixmap.
    #[must_use]
    pub const fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Copy the surface out as a straight-alpha image.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_rgba_image(&self) -> RgbaImage {
        let data = self.pixmap.data();
        let mut img = RgbaImage::new(self.width(), self.height());
        for (pixel, px) in img.pixels_mut().zip(data.chunks_exact(4)) {
            let a = px[3];
            *pixel = if a == 0 {
                image::Rgba([0, 0, 0, 0])
            } else {
                // Un-premultiply: channel = premultiplied * 255 / alpha.
                let channel = |c: u8| (u16::from(c) * 255 / u16::from(a)) as u8;
                image::Rgba([channel(px[0]), channel(px[1]), channel(px[2]), a])
            };
        }
        img
    }

    fn paint_now(&mut self, path: &tiny_skia::Path, color: Color, opacity: f64) {
        let paint = paint(color, opacity);
        self.pixmap
            .fill_path(path, &paint, FillRule::Winding, Transform::identity(), None);
    }

    /// Render the held-back fills in the glow color, blur them, composite
    /// the result, then draw the fills themselves on top.
    #[allow(clippy::cast_possible_truncation)]
    fn flush_glow(&mut self, glow: Glow) {
        if glow.fills.is_empty() {
            return;
        }

        if let Some(mut layer) = Pixmap::new(self.width(), self.height()) {
            for (path, _, opacity) in &glow.fills {
                let paint = paint(glow.color, *opacity);
                layer.fill_path(path, &paint, FillRule::Winding, Transform::identity(), None);
            }
            let sigma = (glow.blur / 2.0) as f32;
            blur_premultiplied(&mut layer, sigma);
            trace!(fills = glow.fills.len(), sigma, "composited glow layer");
            self.pixmap.draw_pixmap(
                0,
                0,
                layer.as_ref(),
                &PixmapPaint::default(),
                Transform::identity(),
                None,
            );
        }

        for (path, color, opacity) in &glow.fills {
            self.paint_now(path, *color, *opacity);
        }
    }
}

impl Canvas for PixmapCanvas {
    fn fill_path(&mut self, outline: &[Point], color: Color, opacity: f64) {
        let Some(path) = build_path(outline) else {
            return;
        };
        match &mut self.glow {
            Some(glow) => glow.fills.push((path, color, opacity)),
            None => self.paint_now(&path, color, opacity),
        }
    }

    fn begin_glow(&mut self, color: Color, blur: f64) {
        if let Some(previous) = self.glow.take() {
            self.flush_glow(previous);
        }
        self.glow = Some(Glow {
            color,
            blur,
            fills: Vec::new(),
        });
    }

    fn end_glow(&mut self) {
        if let Some(glow) = self.glow.take() {
            self.flush_glow(glow);
        }
    }
}

/// Closed `tiny-skia` path through `outline`; `None` if degenerate.
#[allow(clippy::cast_possible_truncation)]
fn build_path(outline: &[Point]) -> Option<tiny_skia::Path> {
    let (first, rest) = outline.split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(first.x as f32, first.y as f32);
    for p in rest {
        pb.line_to(p.x as f32, p.y as f32);
    }
    pb.close();
    pb.finish()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled_alpha(color: Color, opacity: f64) -> u8 {
    (f64::from(color.a) * opacity.clamp(0.0, 1.0)).round() as u8
}

fn skia_color(color: Color, opacity: f64) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba8(color.r, color.g, color.b, scaled_alpha(color, opacity))
}

fn paint(color: Color, opacity: f64) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, scaled_alpha(color, opacity));
    paint.anti_alias = true;
    paint
}
