//! Luminance thresholding and frame decoding.
//!
//! Turns an interleaved RGBA8 frame into the binary on/off grid the
//! marching-squares scan walks, keeping the per-pixel luminance around
//! for saddle disambiguation.

use crate::types::{PipelineError, RgbaImage};

/// Rec. 601 luma: `0.299*R + 0.587*G + 0.114*B`.
#[must_use]
pub fn luminance(r: u8, g: u8, b: u8) -> f32 {
    0.114f32.mul_add(
        f32::from(b),
        0.299f32.mul_add(f32::from(r), 0.587 * f32::from(g)),
    )
}

/// Per-pixel luminance plus its thresholded on/off state.
#[derive(Debug, Clone)]
pub struct ThresholdGrid {
    width: usize,
    height: usize,
    threshold: f32,
    luma: Vec<f32>,
    on: Vec<bool>,
}

impl ThresholdGrid {
    /// Threshold a tightly packed RGBA8 buffer.
    ///
    /// A pixel is "on" iff its luminance is at least `threshold`. The
    /// alpha channel is ignored. `pixels` must hold `width * height * 4`
    /// bytes; shorter buffers panic on indexing.
    #[must_use]
    pub fn from_rgba(pixels: &[u8], width: usize, height: usize, threshold: f32) -> Self {
        debug_assert_eq!(
            pixels.len(),
            width * height * 4,
            "RGBA buffer length does not match {width}x{height}"
        );

        let count = width * height;
        let mut luma = Vec::with_capacity(count);
        let mut on = Vec::with_capacity(count);
        for px in pixels[..count * 4].chunks_exact(4) {
            let l = luminance(px[0], px[1], px[2]);
            luma.push(l);
            on.push(l >= threshold);
        }

        Self {
            width,
            height,
            threshold,
            luma,
            on,
        }
    }

    /// Threshold a decoded RGBA image.
    #[must_use]
    pub fn from_image(image: &RgbaImage, threshold: f32) -> Self {
        Self::from_rgba(
            image.as_raw(),
            image.width() as usize,
            image.height() as usize,
            threshold,
        )
    }

    /// Grid width in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Grid height in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// The threshold the grid was built with.
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Whether the pixel at `(x, y)` is on.
    #[must_use]
    pub fn is_on(&self, x: usize, y: usize) -> bool {
        self.on[y * self.width + x]
    }

    /// Luminance of the pixel at `(x, y)`.
    #[must_use]
    pub fn luma(&self, x: usize, y: usize) -> f32 {
        self.luma[y * self.width + x]
    }
}

/// Decode raw image bytes (PNG, JPEG, BMP, WebP) into RGBA8.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgba8())
}
