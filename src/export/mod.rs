pub mod batch;
pub mod render;

use egui::Rect;
use image::{ImageFormat, Rgba, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use thiserror::Error;

use crate::config::ExportSettings;
use crate::geometry::{color_matches, pad_and_clamp, union_bounds};
use crate::layer::{Layer, Size};

pub use render::{BitmapCache, BitmapLoader, FsBitmapLoader, MemoryBitmapLoader, SoftwareRenderer};

/// Failures of the raster export pipeline. None of them are retried.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("No content to export")]
    NoContent,

    #[error("Invalid crop bounds: {0}")]
    InvalidCropBounds(String),

    #[error("Render failed: {0}")]
    RenderFailed(String),

    #[error("Failed to encode PNG: {0}")]
    Encode(#[from] image::ImageError),
}

pub type ExportResult<T> = Result<T, ExportError>;

/// Rasterizes layers onto a transparent surface
pub trait SurfaceRenderer {
    /// Render `layers` in order onto a `surface`-sized board at `pixel_ratio` pixels per unit
    fn render(&mut self, layers: &[Layer], surface: Size, pixel_ratio: f32) -> ExportResult<RgbaImage>;
}

/// Geometric content bounds in canvas units.
///
/// Each layer contributes its rotation-aware box. The union is padded, with the min corner
/// clamped at zero and the max corner free to overflow the board.
pub fn content_bounds(layers: &[Layer], padding: f32) -> ExportResult<Rect> {
    let union = union_bounds(layers.iter().map(Layer::rotated_bounds)).ok_or(ExportError::NoContent)?;
    let bounds = pad_and_clamp(union, padding);

    let (width, height) = (bounds.width(), bounds.height());
    if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
        log::warn!("Invalid export bounds calculated: {:?}", bounds);
        return Err(ExportError::NoContent);
    }
    Ok(bounds)
}

/// How a pixel is compared with the detected background
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundMatcher {
    /// Alpha below the threshold counts as background
    Transparent { alpha_threshold: u8 },
    /// RGB within tolerance of the color counts as background; alpha is ignored
    Color { color: Rgba<u8>, tolerance: u8 },
}

impl BackgroundMatcher {
    pub fn is_background(&self, pixel: Rgba<u8>) -> bool {
        match *self {
            Self::Transparent { alpha_threshold } => pixel[3] < alpha_threshold,
            Self::Color { color, tolerance } => color_matches(pixel, color, tolerance),
        }
    }
}

/// Pixels stepped diagonally inward from each of the four corners
fn corner_samples(image: &RgbaImage, per_corner: u32) -> Vec<Rgba<u8>> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let steps = per_corner.min(width).min(height);
    let mut samples = Vec::with_capacity(steps as usize * 4);
    for (flip_x, flip_y) in [(false, false), (true, false), (false, true), (true, true)] {
        for i in 0..steps {
            let x = if flip_x { width - 1 - i } else { i };
            let y = if flip_y { height - 1 - i } else { i };
            samples.push(*image.get_pixel(x, y));
        }
    }
    samples
}

/// Pick the most frequent corner sample as the background.
///
/// Ties go to the sample seen first. A near-transparent background switches matching to alpha.
pub fn detect_background(image: &RgbaImage, settings: &ExportSettings) -> BackgroundMatcher {
    let samples = corner_samples(image, settings.background_samples);

    let mut counts: HashMap<Rgba<u8>, usize> = HashMap::new();
    let mut order: Vec<Rgba<u8>> = Vec::new();
    for sample in samples {
        let count = counts.entry(sample).or_insert(0);
        if *count == 0 {
            order.push(sample);
        }
        *count += 1;
    }

    let mut background = Rgba([0, 0, 0, 0]);
    let mut best = 0;
    for color in order {
        let count = counts[&color];
        if count > best {
            best = count;
            background = color;
        }
    }

    if background[3] < settings.alpha_threshold {
        BackgroundMatcher::Transparent {
            alpha_threshold: settings.alpha_threshold,
        }
    } else {
        BackgroundMatcher::Color {
            color: background,
            tolerance: settings.color_tolerance,
        }
    }
}

/// A rectangle of whole pixels; `x + width` and `y + height` are exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Grow by `padding` on every side, clamped to a `width` x `height` bitmap
    pub fn padded(&self, padding: u32, width: u32, height: u32) -> Self {
        let x = self.x.saturating_sub(padding);
        let y = self.y.saturating_sub(padding);
        let right = self.right().saturating_add(padding).min(width);
        let bottom = self.bottom().saturating_add(padding).min(height);
        Self {
            x,
            y,
            width: right.saturating_sub(x),
            height: bottom.saturating_sub(y),
        }
    }
}

/// Tightest box around non-background pixels, found with four scan passes.
///
/// Rows are scanned from the top and from the bottom; columns are then scanned from the
/// left and from the right within the rows found. Returns `None` when every pixel is background.
pub fn find_content_box(image: &RgbaImage, matcher: &BackgroundMatcher) -> Option<PixelRect> {
    let (width, height) = image.dimensions();
    let is_content = |x: u32, y: u32| !matcher.is_background(*image.get_pixel(x, y));
    let row_has_content = |y: u32| (0..width).any(|x| is_content(x, y));

    let top = (0..height).find(|&y| row_has_content(y))?;
    let bottom = (0..height).rev().find(|&y| row_has_content(y))? + 1;

    let column_has_content = |x: u32| (top..bottom).any(|y| is_content(x, y));
    let left = (0..width).find(|&x| column_has_content(x))?;
    let right = (0..width).rev().find(|&x| column_has_content(x))? + 1;

    Some(PixelRect {
        x: left,
        y: top,
        width: right - left,
        height: bottom - top,
    })
}

/// Copy `rect` out of `image` into a buffer of exactly that size
pub fn crop(image: &RgbaImage, rect: PixelRect) -> ExportResult<RgbaImage> {
    let (width, height) = image.dimensions();
    if rect.width == 0 || rect.height == 0 || rect.right() > width || rect.bottom() > height {
        return Err(ExportError::InvalidCropBounds(format!(
            "{rect:?} in a {width}x{height} bitmap"
        )));
    }
    Ok(image::imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image())
}

pub fn encode_png(image: &RgbaImage) -> ExportResult<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

/// Turns a layer sequence into a tightly cropped, background-free bitmap
pub struct RasterExporter<R> {
    renderer: R,
    settings: ExportSettings,
    canvas_size: Size,
}

impl<R: SurfaceRenderer> RasterExporter<R> {
    pub fn new(renderer: R, settings: ExportSettings, canvas_size: Size) -> Self {
        Self {
            renderer,
            settings,
            canvas_size,
        }
    }

    /// Render the whole board, detect the background and crop to the content
    pub fn export(&mut self, layers: &[Layer]) -> ExportResult<RgbaImage> {
        if layers.is_empty() {
            return Err(ExportError::NoContent);
        }
        let bounds = content_bounds(layers, self.settings.bounds_padding)?;

        // Content may overflow the board; the surface grows to cover it
        let surface = Size::new(
            self.canvas_size.width.max(bounds.max.x),
            self.canvas_size.height.max(bounds.max.y),
        );
        log::info!(
            "Exporting {} layers, bounds {:?}, surface {}x{}",
            layers.len(),
            bounds,
            surface.width,
            surface.height
        );

        let rendered = self.renderer.render(layers, surface, self.settings.pixel_ratio)?;
        let matcher = detect_background(&rendered, &self.settings);
        let content = find_content_box(&rendered, &matcher).ok_or_else(|| {
            ExportError::InvalidCropBounds("no content pixel found".to_owned())
        })?;

        let (width, height) = rendered.dimensions();
        let crop_box = content.padded(self.settings.crop_padding, width, height);
        log::info!("Auto-cropped to {:?} with background {:?}", crop_box, matcher);

        crop(&rendered, crop_box)
    }

    pub fn export_png(&mut self, layers: &[Layer]) -> ExportResult<Vec<u8>> {
        let image = self.export(layers)?;
        encode_png(&image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_on(size: u32, background: Rgba<u8>, square: (u32, u32, u32), color: Rgba<u8>) -> RgbaImage {
        let (sx, sy, side) = square;
        RgbaImage::from_fn(size, size, |x, y| {
            if (sx..sx + side).contains(&x) && (sy..sy + side).contains(&y) {
                color
            } else {
                background
            }
        })
    }

    #[test]
    fn test_transparent_background_crop() {
        let image = square_on(500, Rgba([0, 0, 0, 0]), (200, 200, 50), Rgba([255, 0, 0, 255]));
        let settings = ExportSettings::default();

        let matcher = detect_background(&image, &settings);
        assert_eq!(matcher, BackgroundMatcher::Transparent { alpha_threshold: 10 });

        let content = find_content_box(&image, &matcher).unwrap();
        assert_eq!(content, PixelRect { x: 200, y: 200, width: 50, height: 50 });

        let padded = content.padded(settings.crop_padding, 500, 500);
        assert_eq!(padded, PixelRect { x: 195, y: 195, width: 60, height: 60 });

        let cropped = crop(&image, padded).unwrap();
        assert_eq!(cropped.dimensions(), (60, 60));
        assert_eq!(cropped.get_pixel(5, 5)[3], 255);
        assert_eq!(cropped.get_pixel(4, 4)[3], 0);
        assert_eq!(cropped.get_pixel(54, 54)[3], 255);
        assert_eq!(cropped.get_pixel(55, 55)[3], 0);
    }

    #[test]
    fn test_opaque_background_uses_rgb_tolerance() {
        let mut image = square_on(100, Rgba([240, 240, 240, 255]), (10, 20, 30), Rgba([20, 20, 20, 255]));
        // Slight noise inside tolerance does not count as content
        image.put_pixel(90, 90, Rgba([243, 238, 240, 255]));

        let matcher = detect_background(&image, &ExportSettings::default());
        assert!(matches!(matcher, BackgroundMatcher::Color { .. }));
        let content = find_content_box(&image, &matcher).unwrap();
        assert_eq!(content, PixelRect { x: 10, y: 20, width: 30, height: 30 });
    }

    #[test]
    fn test_padding_clamps_to_bitmap() {
        let image = square_on(20, Rgba([0, 0, 0, 0]), (0, 0, 4), Rgba([1, 2, 3, 255]));
        let matcher = detect_background(&image, &ExportSettings::default());
        let content = find_content_box(&image, &matcher).unwrap();
        assert_eq!(content.padded(5, 20, 20), PixelRect { x: 0, y: 0, width: 9, height: 9 });
    }

    #[test]
    fn test_background_only_has_no_content_box() {
        let image = RgbaImage::from_pixel(30, 30, Rgba([0, 0, 0, 0]));
        let matcher = detect_background(&image, &ExportSettings::default());
        assert!(find_content_box(&image, &matcher).is_none());
    }

    #[test]
    fn test_crop_rejects_degenerate_rect() {
        let image = RgbaImage::new(10, 10);
        let empty = PixelRect { x: 2, y: 2, width: 0, height: 4 };
        assert!(matches!(crop(&image, empty), Err(ExportError::InvalidCropBounds(_))));
        let outside = PixelRect { x: 8, y: 8, width: 4, height: 4 };
        assert!(matches!(crop(&image, outside), Err(ExportError::InvalidCropBounds(_))));
    }

    #[test]
    fn test_empty_layers_have_no_content() {
        assert!(matches!(content_bounds(&[], 5.0), Err(ExportError::NoContent)));
    }

    #[test]
    fn test_encode_png_signature() {
        let png = encode_png(&RgbaImage::new(3, 2)).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
