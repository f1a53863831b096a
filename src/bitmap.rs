use egui::Color32;
use image::{Rgba, RgbaImage};

use crate::geometry::{color_matches, to_rgba};
use crate::layer::TransparencyColors;

/// RGB tolerance used when keying transparency colors out of a bitmap
pub const TRANSPARENCY_TOLERANCE: u8 = 10;

/// Make every visible pixel within `tolerance` of either key color fully transparent.
///
/// Pixels that are already transparent are left alone so the bitmap's own alpha survives.
pub fn apply_transparency_colors(image: &mut RgbaImage, colors: &TransparencyColors, tolerance: u8) -> usize {
    let keys: Vec<Rgba<u8>> = colors.iter().flatten().map(|tint| to_rgba(tint.color())).collect();
    if keys.is_empty() {
        return 0;
    }

    let mut keyed = 0;
    for pixel in image.pixels_mut() {
        if pixel[3] == 0 {
            continue;
        }
        if keys.iter().any(|key| color_matches(*pixel, *key, tolerance)) {
            pixel[3] = 0;
            keyed += 1;
        }
    }
    keyed
}

/// Multiply a pixel's color channels by `tint`. White leaves the pixel unchanged.
pub fn tint_pixel(pixel: Rgba<u8>, tint: Color32) -> Rgba<u8> {
    let mul = |channel: u8, factor: u8| ((channel as u16 * factor as u16 + 127) / 255) as u8;
    Rgba([
        mul(pixel[0], tint.r()),
        mul(pixel[1], tint.g()),
        mul(pixel[2], tint.b()),
        pixel[3],
    ])
}

/// Scale a pixel's alpha by `opacity` in `[0, 1]`
pub fn with_opacity(pixel: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let alpha = (pixel[3] as f32 * opacity.clamp(0.0, 1.0)).round() as u8;
    Rgba([pixel[0], pixel[1], pixel[2], alpha])
}

/// Source-over compositing of straight-alpha pixels
pub fn blend_over(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    let src_a = src[3] as f32 / 255.0;
    if src_a <= 0.0 {
        return;
    }
    if src_a >= 1.0 {
        *dst = src;
        return;
    }

    let dst_a = dst[3] as f32 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    for c in 0..3 {
        let blended = (src[c] as f32 * src_a + dst[c] as f32 * dst_a * (1.0 - src_a)) / out_a;
        dst[c] = blended.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round() as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Tint;

    #[test]
    fn test_keying_respects_tolerance_and_existing_alpha() {
        let mut image = RgbaImage::from_fn(4, 1, |x, _| match x {
            0 => Rgba([255, 0, 255, 255]),
            1 => Rgba([250, 8, 250, 255]),
            2 => Rgba([200, 0, 200, 255]),
            _ => Rgba([255, 0, 255, 0]),
        });
        let colors = [Some(Tint::from_rgb(255, 0, 255)), None];

        let keyed = apply_transparency_colors(&mut image, &colors, TRANSPARENCY_TOLERANCE);
        assert_eq!(keyed, 2);
        assert_eq!(image.get_pixel(0, 0)[3], 0);
        assert_eq!(image.get_pixel(1, 0)[3], 0);
        assert_eq!(image.get_pixel(2, 0)[3], 255);
    }

    #[test]
    fn test_no_colors_is_a_no_op() {
        let mut image = RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255]));
        assert_eq!(apply_transparency_colors(&mut image, &[None, None], 10), 0);
    }

    #[test]
    fn test_tint_and_blend() {
        assert_eq!(tint_pixel(Rgba([200, 100, 50, 255]), Color32::WHITE), Rgba([200, 100, 50, 255]));
        assert_eq!(tint_pixel(Rgba([200, 100, 50, 255]), Color32::BLACK), Rgba([0, 0, 0, 255]));

        let mut dst = Rgba([0, 0, 0, 0]);
        blend_over(&mut dst, Rgba([255, 0, 0, 128]));
        assert_eq!(dst, Rgba([255, 0, 0, 128]));

        let mut dst = Rgba([0, 0, 255, 255]);
        blend_over(&mut dst, Rgba([255, 0, 0, 255]));
        assert_eq!(dst, Rgba([255, 0, 0, 255]));
    }
}
