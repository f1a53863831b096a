use egui::{Color32, Pos2, Vec2, pos2};
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::{ExportError, ExportResult, SurfaceRenderer};
use crate::bitmap::{TRANSPARENCY_TOLERANCE, apply_transparency_colors, blend_over, tint_pixel, with_opacity};
use crate::geometry::to_rgba;
use crate::layer::{Layer, LayerContent, Size};

/// Largest surface side, in pixels, the software renderer will allocate
pub const MAX_SURFACE_SIDE: u32 = 16_384;

/// Drawn in place of image layers whose bitmap is missing
const PLACEHOLDER: Rgba<u8> = Rgba([204, 204, 204, 255]);

/// Loads bitmaps by their layer `src`
pub trait BitmapLoader {
    fn load(&mut self, src: &str) -> image::ImageResult<RgbaImage>;
}

/// Reads bitmaps from disk, resolving relative sources against `root`
#[derive(Debug, Clone, Default)]
pub struct FsBitmapLoader {
    root: Option<PathBuf>,
}

impl FsBitmapLoader {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }
}

impl BitmapLoader for FsBitmapLoader {
    fn load(&mut self, src: &str) -> image::ImageResult<RgbaImage> {
        let path = match &self.root {
            Some(root) => root.join(src),
            None => PathBuf::from(src),
        };
        log::debug!("Loading bitmap from {}", path.display());
        Ok(image::open(&path)?.to_rgba8())
    }
}

/// Bitmaps registered up front
#[derive(Debug, Clone, Default)]
pub struct MemoryBitmapLoader {
    bitmaps: HashMap<String, RgbaImage>,
}

impl MemoryBitmapLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, src: impl Into<String>, bitmap: RgbaImage) {
        self.bitmaps.insert(src.into(), bitmap);
    }
}

impl BitmapLoader for MemoryBitmapLoader {
    fn load(&mut self, src: &str) -> image::ImageResult<RgbaImage> {
        self.bitmaps.get(src).cloned().ok_or_else(|| {
            image::ImageError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no bitmap registered for {src}"),
            ))
        })
    }
}

/// Least-recently-used cache of decoded bitmaps, keyed by source
pub struct BitmapCache {
    bitmaps: HashMap<String, Arc<RgbaImage>>,
    /// Tracks when each bitmap was last used
    last_used: HashMap<String, u64>,
    /// Current frame counter for LRU tracking
    current_frame: u64,
    max_cache_size: usize,
}

impl BitmapCache {
    pub fn new(max_cache_size: usize) -> Self {
        Self {
            bitmaps: HashMap::new(),
            last_used: HashMap::new(),
            current_frame: 0,
            max_cache_size,
        }
    }

    /// Should be called once per render
    pub fn begin_frame(&mut self) {
        self.current_frame += 1;
    }

    pub fn get_or_load<L: BitmapLoader>(&mut self, src: &str, loader: &mut L) -> image::ImageResult<Arc<RgbaImage>> {
        if let Some(bitmap) = self.bitmaps.get(src) {
            self.last_used.insert(src.to_owned(), self.current_frame);
            return Ok(Arc::clone(bitmap));
        }

        let bitmap = Arc::new(loader.load(src)?);
        self.bitmaps.insert(src.to_owned(), Arc::clone(&bitmap));
        self.last_used.insert(src.to_owned(), self.current_frame);
        self.prune_cache_if_needed();
        Ok(bitmap)
    }

    pub fn invalidate(&mut self, src: &str) {
        self.bitmaps.remove(src);
        self.last_used.remove(src);
    }

    fn prune_cache_if_needed(&mut self) {
        if self.bitmaps.len() <= self.max_cache_size {
            return;
        }

        let mut entries: Vec<(String, u64)> = self
            .last_used
            .iter()
            .map(|(src, frame)| (src.clone(), *frame))
            .collect();
        // Oldest first
        entries.sort_by_key(|(_, frame)| *frame);

        let to_remove = entries.len() - self.max_cache_size;
        for (src, _) in entries.into_iter().take(to_remove) {
            self.bitmaps.remove(&src);
            self.last_used.remove(&src);
        }
    }

    pub fn cache_size(&self) -> usize {
        self.bitmaps.len()
    }

    pub fn contains(&self, src: &str) -> bool {
        self.bitmaps.contains_key(src)
    }
}

/// What a layer paints at a point of its own unit square
enum Fill {
    Bitmap(Arc<RgbaImage>),
    Solid(Rgba<u8>),
}

impl Fill {
    fn sample(&self, u: f32, v: f32) -> Rgba<u8> {
        match self {
            Self::Solid(color) => *color,
            Self::Bitmap(bitmap) => {
                let (width, height) = bitmap.dimensions();
                let x = ((u * width as f32) as u32).min(width.saturating_sub(1));
                let y = ((v * height as f32) as u32).min(height.saturating_sub(1));
                *bitmap.get_pixel(x, y)
            }
        }
    }
}

/// CPU rasterizer for export surfaces.
///
/// Layers are painted in order with source-over blending, each rotated about its own
/// center. Text glyphs are not shaped; a text layer paints its background box only.
pub struct SoftwareRenderer<L> {
    loader: L,
    cache: BitmapCache,
}

impl<L: BitmapLoader> SoftwareRenderer<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            cache: BitmapCache::new(64),
        }
    }

    fn fill_for(&mut self, layer: &Layer) -> Option<Fill> {
        match &layer.content {
            LayerContent::Text(style) => {
                if style.background_opacity <= 0.0 {
                    return None;
                }
                let alpha = (style.background_opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
                Some(Fill::Solid(Rgba([255, 255, 255, alpha])))
            }
            LayerContent::Image => {
                let Some(src) = layer.src.as_deref() else {
                    return Some(Fill::Solid(PLACEHOLDER));
                };
                match self.cache.get_or_load(src, &mut self.loader) {
                    Ok(bitmap) if bitmap.width() > 0 && bitmap.height() > 0 => {
                        let bitmap = if layer.has_transparency_colors() {
                            let mut keyed = (*bitmap).clone();
                            apply_transparency_colors(&mut keyed, &layer.transparency_colors, TRANSPARENCY_TOLERANCE);
                            Arc::new(keyed)
                        } else {
                            bitmap
                        };
                        Some(Fill::Bitmap(bitmap))
                    }
                    Ok(_) => Some(Fill::Solid(PLACEHOLDER)),
                    Err(err) => {
                        log::warn!("Error loading image for layer {}: {}: {}", layer.name, src, err);
                        Some(Fill::Solid(PLACEHOLDER))
                    }
                }
            }
        }
    }

    fn paint_layer(&mut self, surface: &mut RgbaImage, layer: &Layer, pixel_ratio: f32) {
        let size = layer.size();
        if size.x <= 0.0 || size.y <= 0.0 || layer.opacity <= 0.0 {
            return;
        }
        let Some(fill) = self.fill_for(layer) else {
            return;
        };
        let tint = match layer.content {
            LayerContent::Image => layer.tint.color(),
            LayerContent::Text(_) => Color32::WHITE,
        };

        let (surface_w, surface_h) = surface.dimensions();
        let bounds = layer.rotated_bounds();
        let x0 = ((bounds.min.x * pixel_ratio).floor().max(0.0) as u32).min(surface_w);
        let y0 = ((bounds.min.y * pixel_ratio).floor().max(0.0) as u32).min(surface_h);
        let x1 = ((bounds.max.x * pixel_ratio).ceil().max(0.0) as u32).min(surface_w);
        let y1 = ((bounds.max.y * pixel_ratio).ceil().max(0.0) as u32).min(surface_h);

        let center = layer.bounds().center();
        let (sin, cos) = (-layer.rotation).to_radians().sin_cos();
        let half = size / 2.0;

        for py in y0..y1 {
            for px in x0..x1 {
                // Pixel center back into the layer's unrotated frame
                let point = pos2((px as f32 + 0.5) / pixel_ratio, (py as f32 + 0.5) / pixel_ratio);
                let local = unrotate(point, center, sin, cos);
                if local.x < -half.x || local.x >= half.x || local.y < -half.y || local.y >= half.y {
                    continue;
                }
                let u = (local.x + half.x) / size.x;
                let v = (local.y + half.y) / size.y;

                let color = with_opacity(tint_pixel(fill.sample(u, v), tint), layer.opacity);
                blend_over(surface.get_pixel_mut(px, py), color);
            }
        }
    }
}

fn unrotate(point: Pos2, center: Pos2, sin: f32, cos: f32) -> Vec2 {
    let d = point - center;
    Vec2::new(d.x * cos - d.y * sin, d.x * sin + d.y * cos)
}

impl<L: BitmapLoader> SurfaceRenderer for SoftwareRenderer<L> {
    fn render(&mut self, layers: &[Layer], surface: Size, pixel_ratio: f32) -> ExportResult<RgbaImage> {
        let width = (surface.width * pixel_ratio).ceil();
        let height = (surface.height * pixel_ratio).ceil();
        if !(width.is_finite() && height.is_finite()) || width < 1.0 || height < 1.0 {
            return Err(ExportError::RenderFailed(format!("invalid surface {width}x{height}")));
        }
        if width > MAX_SURFACE_SIDE as f32 || height > MAX_SURFACE_SIDE as f32 {
            return Err(ExportError::RenderFailed(format!(
                "surface {width}x{height} exceeds {MAX_SURFACE_SIDE} pixels per side"
            )));
        }

        self.cache.begin_frame();
        let mut image = RgbaImage::from_pixel(width as u32, height as u32, to_rgba(Color32::TRANSPARENT));
        for layer in layers {
            self.paint_layer(&mut image, layer, pixel_ratio);
        }
        Ok(image)
    }
}
