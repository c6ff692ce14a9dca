//! Gaussian blur for the glow layer.
//!
//! Wraps [`imageproc::filter::gaussian_blur_f32`], which only accepts
//! single-channel images: the pixmap is split into four channels,
//! each is blurred, and the results are reassembled. Blur is linear and
//! per-channel, so this matches blurring in color space.
//!
//! The glow layer is premultiplied (it comes straight out of a
//! `tiny-skia` pixmap), which is the representation a blur should run
//! in: transparent pixels contribute nothing to their neighbors' color.

use image::GrayImage;
use tiny_skia::Pixmap;

/// Blur a premultiplied pixmap in place.
///
/// Color channels are clamped to the blurred alpha afterwards so rounding
/// can never leave an invalid premultiplied pixel. Non-positive sigma is
/// a no-op.
pub fn blur_premultiplied(pixmap: &mut Pixmap, sigma: f32) {
    if sigma <= 0.0 {
        return;
    }

    let (w, h) = (pixmap.width(), pixmap.height());
    let channels: [GrayImage; 4] = {
        let data = pixmap.data();
        std::array::from_fn(|c| {
            GrayImage::from_fn(w, h, |x, y| {
                image::Luma([data[(y as usize * w as usize + x as usize) * 4 + c]])
            })
        })
    };
    let blurred = blur_channels(&channels, sigma);

    let coords = (0..h).flat_map(|y| (0..w).map(move |x| (x, y)));
    for (px, (x, y)) in pixmap.data_mut().chunks_exact_mut(4).zip(coords) {
        let alpha = blurred[3].get_pixel(x, y).0[0];
        for c in 0..3 {
            px[c] = blurred[c].get_pixel(x, y).0[0].min(alpha);
        }
        px[3] = alpha;
    }
}

fn blur_channels(channels: &[GrayImage; 4], sigma: f32) -> [GrayImage; 4] {
    std::array::from_fn(|c| imageproc::filter::gaussian_blur_f32(&channels[c], sigma))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{Rgba, RgbaImage};
    use tiny_skia::PremultipliedColorU8;

    use super::*;

    /// Straight per-channel blur of an RGBA image, with no premultiplied
    /// clamping.
    fn blur_rgba_channels(image: &RgbaImage, sigma: f32) -> RgbaImage {
        let (w, h) = (image.width(), image.height());
        let channels: [GrayImage; 4] = std::array::from_fn(|c| {
            GrayImage::from_fn(w, h, |x, y| image::Luma([image.get_pixel(x, y).0[c]]))
        });
        let blurred = blur_channels(&channels, sigma);
        RgbaImage::from_fn(w, h, |x, y| {
            Rgba(std::array::from_fn(|c| blurred[c].get_pixel(x, y).0[0]))
        })
    }

    /// 21x21 transparent pixmap with an opaque 5x5 square in the middle.
    fn square_pixmap() -> Pixmap {
        let mut pixmap = Pixmap::new(21, 21).unwrap();
        let color = PremultipliedColorU8::from_rgba(200, 100, 50, 255).unwrap();
        for y in 8..13 {
            for x in 8..13 {
                pixmap.pixels_mut()[y * 21 + x] = color;
            }
        }
        pixmap
    }

    #[test]
    fn zero_sigma_leaves_pixmap_unchanged() {
        let mut pixmap = square_pixmap();
        let before = pixmap.data().to_vec();
        blur_premultiplied(&mut pixmap, 0.0);
        assert_eq!(pixmap.data(), &before[..]);
        blur_premultiplied(&mut pixmap, -2.0);
        assert_eq!(pixmap.data(), &before[..]);
    }

    #[test]
    fn blur_spreads_alpha_outside_shape() {
        let mut pixmap = square_pixmap();
        blur_premultiplied(&mut pixmap, 2.0);
        let outside = pixmap.pixel(6, 10).unwrap();
        assert!(outside.alpha() > 0, "expected glow outside the square");
        let center = pixmap.pixel(10, 10).unwrap();
        assert!(center.alpha() < 255, "expected the center to soften");
        assert!(pixmap.pixel(0, 0).unwrap().alpha() < outside.alpha());
    }

    #[test]
    fn blurred_pixels_stay_premultiplied() {
        let mut pixmap = square_pixmap();
        blur_premultiplied(&mut pixmap, 3.0);
        for px in pixmap.pixels() {
            assert!(px.red() <= px.alpha());
            assert!(px.green() <= px.alpha());
            assert!(px.blue() <= px.alpha());
        }
    }

    #[test]
    fn uniform_pixmap_unchanged_by_blur() {
        let mut pixmap = Pixmap::new(10, 10).unwrap();
        let color = PremultipliedColorU8::from_rgba(100, 150, 200, 250).unwrap();
        pixmap.pixels_mut().fill(color);
        blur_premultiplied(&mut pixmap, 1.4);
        for px in pixmap.pixels() {
            for (got, exp) in [
                (px.red(), 100u8),
                (px.green(), 150),
                (px.blue(), 200),
                (px.alpha(), 250),
            ] {
                let diff = i16::from(got) - i16::from(exp);
                assert!(diff.abs() <= 1, "expected ~{exp}, got {got}");
            }
        }
    }

    #[test]
    fn pixmap_blur_matches_channelwise_blur_clamped_to_alpha() {
        let pixmap = square_pixmap();
        let image =
            RgbaImage::from_raw(pixmap.width(), pixmap.height(), pixmap.data().to_vec()).unwrap();

        let mut blurred_pixmap = pixmap;
        blur_premultiplied(&mut blurred_pixmap, 1.5);
        let blurred_image = blur_rgba_channels(&image, 1.5);

        for (a, b) in blurred_pixmap
            .data()
            .chunks_exact(4)
            .zip(blurred_image.pixels())
        {
            assert_eq!(a[3], b.0[3]);
            for c in 0..3 {
                assert_eq!(a[c], b.0[c].min(b.0[3]));
            }
        }
    }
}
