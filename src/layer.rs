use egui::{Color32, Pos2, Rect, Vec2, vec2};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

use crate::asset::{AssetDescriptor, AssetKind};
use crate::config::LayerDefaults;
use crate::geometry::{parse_hex_color, rotated_bounds, to_hex};

/// A unique identifier for a layer.
///
/// Freshly created layers get a random UUID; ids read back from documents are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(String);

impl LayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for LayerId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Width and height in canvas units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn to_vec2(self) -> Vec2 {
        vec2(self.width, self.height)
    }
}

/// An opaque color, stored in documents as `#rrggbb`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tint(pub Color32);

impl Tint {
    pub const WHITE: Tint = Tint(Color32::WHITE);
    pub const BLACK: Tint = Tint(Color32::BLACK);

    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self(Color32::from_rgb(r, g, b))
    }

    pub fn color(self) -> Color32 {
        self.0
    }
}

impl Serialize for Tint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_hex(self.0))
    }
}

/// Unreadable colors fall back to white instead of failing the whole record
impl<'de> Deserialize<'de> for Tint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Ok(parse_hex_color(&hex).map(Tint).unwrap_or_else(|| {
            log::warn!("Invalid color {:?}, using white", hex);
            Tint::WHITE
        }))
    }
}

/// Up to two colors keyed out of an image layer's bitmap
pub type TransparencyColors = [Option<Tint>; 2];

/// Older documents may carry `null` instead of a pair
fn nullable_transparency<'de, D>(deserializer: D) -> Result<TransparencyColors, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<TransparencyColors>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Image,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

fn default_font_size() -> f32 {
    18.0
}

fn default_font_family() -> String {
    "Arial".to_owned()
}

fn default_background_opacity() -> f32 {
    1.0
}

fn default_opacity() -> f32 {
    1.0
}

/// Text-only attributes. Missing fields are back-filled when reading older documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default)]
    pub font_bold: bool,
    #[serde(default)]
    pub font_italic: bool,
    #[serde(default)]
    pub font_underline: bool,
    #[serde(default)]
    pub font_strikethrough: bool,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default)]
    pub text_align: TextAlign,
    /// 0 = transparent box, 1 = opaque box
    #[serde(default = "default_background_opacity")]
    pub background_opacity: f32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_size: default_font_size(),
            font_bold: false,
            font_italic: false,
            font_underline: false,
            font_strikethrough: false,
            font_family: default_font_family(),
            text_align: TextAlign::default(),
            background_opacity: default_background_opacity(),
        }
    }
}

/// Kind-specific part of a layer, tagged by `type` in JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerContent {
    Image,
    Text(TextStyle),
}

/// One positioned, transformable visual element of the composition.
///
/// Paint order is the order of the owning sequence, later layers on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: LayerId,
    /// Catalog entry this layer was created from; `None` for orphaned layers
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub content: LayerContent,
    /// Resolved bitmap source. Derived from the catalog, never authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    /// Top-left offset in canvas space
    pub position: Pos2,
    pub scale: Vec2,
    /// Unscaled size, fixed at creation
    pub base_size: Size,
    /// Degrees, applied about the layer's own center
    #[serde(default)]
    pub rotation: f32,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    pub tint: Tint,
    #[serde(default, deserialize_with = "nullable_transparency")]
    pub transparency_colors: TransparencyColors,
    #[serde(default)]
    pub locked: bool,
}

impl Layer {
    /// Synthesize a layer from a catalog asset with the default transform
    pub fn from_asset(asset: &AssetDescriptor, position: Option<Pos2>, defaults: &LayerDefaults) -> Self {
        let [x, y] = defaults.drop_position;
        let (content, base_size, tint) = match asset.kind {
            AssetKind::Text => (
                LayerContent::Text(TextStyle {
                    text: defaults.placeholder_text.clone(),
                    font_size: defaults.font_size,
                    font_family: defaults.font_family.clone(),
                    ..TextStyle::default()
                }),
                defaults.text_size,
                Tint::BLACK,
            ),
            AssetKind::Image => (LayerContent::Image, defaults.image_size, Tint::WHITE),
        };

        Self {
            id: LayerId::new(),
            asset_id: Some(asset.id.clone()),
            name: asset.name.clone(),
            content,
            src: asset.src.clone(),
            position: position.unwrap_or(Pos2::new(x, y)),
            scale: Vec2::new(1.0, 1.0),
            base_size,
            rotation: 0.0,
            opacity: 1.0,
            tint,
            transparency_colors: [None, None],
            locked: false,
        }
    }

    pub fn kind(&self) -> LayerKind {
        match self.content {
            LayerContent::Image => LayerKind::Image,
            LayerContent::Text(_) => LayerKind::Text,
        }
    }

    pub fn text_style(&self) -> Option<&TextStyle> {
        match &self.content {
            LayerContent::Text(style) => Some(style),
            LayerContent::Image => None,
        }
    }

    pub fn text_style_mut(&mut self) -> Option<&mut TextStyle> {
        match &mut self.content {
            LayerContent::Text(style) => Some(style),
            LayerContent::Image => None,
        }
    }

    /// Scaled size in canvas units
    pub fn size(&self) -> Vec2 {
        self.base_size.to_vec2() * self.scale
    }

    /// Unrotated box in canvas space
    pub fn bounds(&self) -> Rect {
        Rect::from_min_size(self.position, self.size())
    }

    /// Axis-aligned box containing the rotated layer
    pub fn rotated_bounds(&self) -> Rect {
        rotated_bounds(self.bounds(), self.rotation)
    }

    /// Copy with a fresh id, shifted by `offset`
    pub fn duplicate(&self, offset: Vec2) -> Self {
        Self {
            id: LayerId::new(),
            position: self.position + offset,
            ..self.clone()
        }
    }

    pub fn has_transparency_colors(&self) -> bool {
        self.transparency_colors.iter().any(Option::is_some)
    }

    /// Merge one field group into this layer
    pub fn apply(&mut self, patch: LayerPatch) {
        match patch {
            LayerPatch::Name(name) => self.name = name,
            LayerPatch::Position(position) => self.position = position,
            LayerPatch::Scale(scale) => {
                self.apply_axis(TransformTarget::Scale, AxisPatch::both(scale.x, scale.y))
            }
            LayerPatch::Rotation(rotation) => self.rotation = rotation,
            LayerPatch::Opacity(opacity) => self.opacity = opacity,
            LayerPatch::Tint(tint) => self.tint = tint,
            LayerPatch::TransparencyColors(colors) => self.transparency_colors = colors,
            LayerPatch::Locked(locked) => self.locked = locked,
            LayerPatch::Text(patch) => match self.text_style_mut() {
                Some(style) => patch.apply_to(style),
                None => log::debug!("Ignoring text patch on image layer {}", self.id),
            },
        }
    }

    /// Merge the given axes into either `position` or `scale`, leaving the other untouched
    pub fn apply_axis(&mut self, target: TransformTarget, patch: AxisPatch) {
        match target {
            TransformTarget::Position => {
                if let Some(x) = patch.x {
                    self.position.x = x;
                }
                if let Some(y) = patch.y {
                    self.position.y = y;
                }
            }
            TransformTarget::Scale => {
                if let Some(x) = patch.x {
                    if valid_scale(x) {
                        self.scale.x = x;
                    } else {
                        log::warn!("Rejected scale x={} for layer {}", x, self.id);
                    }
                }
                if let Some(y) = patch.y {
                    if valid_scale(y) {
                        self.scale.y = y;
                    } else {
                        log::warn!("Rejected scale y={} for layer {}", y, self.id);
                    }
                }
            }
        }
    }
}

fn valid_scale(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

/// Which transform sub-object an [`AxisPatch`] targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformTarget {
    Position,
    Scale,
}

/// Partial update of an `{x, y}` pair
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisPatch {
    pub x: Option<f32>,
    pub y: Option<f32>,
}

impl AxisPatch {
    pub fn both(x: f32, y: f32) -> Self {
        Self { x: Some(x), y: Some(y) }
    }

    pub fn x(x: f32) -> Self {
        Self { x: Some(x), y: None }
    }

    pub fn y(y: f32) -> Self {
        Self { x: None, y: Some(y) }
    }
}

/// Partial update of a text layer's style
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextPatch {
    pub text: Option<String>,
    pub font_size: Option<f32>,
    pub font_bold: Option<bool>,
    pub font_italic: Option<bool>,
    pub font_underline: Option<bool>,
    pub font_strikethrough: Option<bool>,
    pub font_family: Option<String>,
    pub text_align: Option<TextAlign>,
    pub background_opacity: Option<f32>,
}

impl TextPatch {
    fn apply_to(self, style: &mut TextStyle) {
        if let Some(text) = self.text {
            style.text = text;
        }
        if let Some(font_size) = self.font_size {
            style.font_size = font_size;
        }
        if let Some(bold) = self.font_bold {
            style.font_bold = bold;
        }
        if let Some(italic) = self.font_italic {
            style.font_italic = italic;
        }
        if let Some(underline) = self.font_underline {
            style.font_underline = underline;
        }
        if let Some(strikethrough) = self.font_strikethrough {
            style.font_strikethrough = strikethrough;
        }
        if let Some(family) = self.font_family {
            style.font_family = family;
        }
        if let Some(align) = self.text_align {
            style.text_align = align;
        }
        if let Some(opacity) = self.background_opacity {
            style.background_opacity = opacity;
        }
    }
}

/// A typed update of one field group of a [`Layer`]
#[derive(Debug, Clone, PartialEq)]
pub enum LayerPatch {
    Name(String),
    Position(Pos2),
    Scale(Vec2),
    Rotation(f32),
    Opacity(f32),
    Tint(Tint),
    TransparencyColors(TransparencyColors),
    Locked(bool),
    Text(TextPatch),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetDescriptor;

    fn image_asset() -> AssetDescriptor {
        AssetDescriptor::image("../assets/cards/a.png", "a", "Cards", "/srv/assets/cards/a.png")
    }

    #[test]
    fn test_from_asset_defaults() {
        let defaults = LayerDefaults::default();
        let image = Layer::from_asset(&image_asset(), None, &defaults);
        assert_eq!(image.kind(), LayerKind::Image);
        assert_eq!(image.position, Pos2::new(180.0, 160.0));
        assert_eq!(image.base_size, Size::new(200.0, 260.0));
        assert_eq!(image.tint, Tint::WHITE);
        assert!(image.text_style().is_none());

        let text = Layer::from_asset(&AssetDescriptor::text_box(), Some(Pos2::new(1.0, 2.0)), &defaults);
        assert_eq!(text.kind(), LayerKind::Text);
        assert_eq!(text.position, Pos2::new(1.0, 2.0));
        assert_eq!(text.base_size, Size::new(260.0, 120.0));
        assert_eq!(text.tint, Tint::BLACK);
        let style = text.text_style().unwrap();
        assert_eq!(style.text, "Double-click to edit text");
        assert_eq!(style.font_family, "Arial");
        assert_eq!(style.text_align, TextAlign::Center);
        assert_eq!(style.background_opacity, 1.0);
        assert_ne!(image.id, text.id);
    }

    #[test]
    fn test_axis_patch_leaves_other_transform_alone() {
        let mut layer = Layer::from_asset(&image_asset(), None, &LayerDefaults::default());
        layer.apply_axis(TransformTarget::Position, AxisPatch::x(42.0));
        assert_eq!(layer.position, Pos2::new(42.0, 160.0));
        assert_eq!(layer.scale, Vec2::new(1.0, 1.0));

        layer.apply_axis(TransformTarget::Scale, AxisPatch::y(2.5));
        assert_eq!(layer.scale, Vec2::new(1.0, 2.5));
        assert_eq!(layer.position, Pos2::new(42.0, 160.0));
    }

    #[test]
    fn test_non_positive_scale_is_rejected() {
        let mut layer = Layer::from_asset(&image_asset(), None, &LayerDefaults::default());
        layer.apply(LayerPatch::Scale(Vec2::new(0.0, -1.0)));
        assert_eq!(layer.scale, Vec2::new(1.0, 1.0));

        layer.apply_axis(TransformTarget::Scale, AxisPatch::both(f32::NAN, 0.5));
        assert_eq!(layer.scale, Vec2::new(1.0, 0.5));
    }

    #[test]
    fn test_text_patch_only_touches_text_layers() {
        let defaults = LayerDefaults::default();
        let mut text = Layer::from_asset(&AssetDescriptor::text_box(), None, &defaults);
        text.apply(LayerPatch::Text(TextPatch {
            text: Some("**Fire** Drake".to_owned()),
            font_bold: Some(true),
            ..TextPatch::default()
        }));
        let style = text.text_style().unwrap();
        assert_eq!(style.text, "**Fire** Drake");
        assert!(style.font_bold);
        assert!(!style.font_italic);

        let mut image = Layer::from_asset(&image_asset(), None, &defaults);
        let before = image.clone();
        image.apply(LayerPatch::Text(TextPatch {
            text: Some("nope".to_owned()),
            ..TextPatch::default()
        }));
        assert_eq!(image, before);
    }

    #[test]
    fn test_json_field_names() {
        let layer = Layer::from_asset(&AssetDescriptor::text_box(), None, &LayerDefaults::default());
        let value = serde_json::to_value(&layer).unwrap();
        assert_eq!(value["type"], "text");
        assert_eq!(value["assetId"], "text-box");
        assert_eq!(value["baseSize"]["width"], 260.0);
        assert_eq!(value["fontSize"], 18.0);
        assert_eq!(value["textAlign"], "center");
        assert_eq!(value["tint"], "#000000");
        assert_eq!(value["transparencyColors"], serde_json::json!([null, null]));
        assert!(value.get("src").is_none());
    }

    #[test]
    fn test_older_records_are_back_filled() {
        let json = r##"{
            "id": "1712-abc",
            "assetId": "text-box",
            "name": "Text Box",
            "type": "text",
            "text": "hello",
            "position": { "x": 10, "y": 20 },
            "scale": { "x": 1, "y": 1 },
            "baseSize": { "width": 260, "height": 120 },
            "rotation": 0,
            "opacity": 1,
            "tint": "#000000",
            "transparencyColors": null
        }"##;
        let layer: Layer = serde_json::from_str(json).unwrap();
        assert_eq!(layer.id.as_str(), "1712-abc");
        assert_eq!(layer.transparency_colors, [None, None]);
        assert!(!layer.locked);
        let style = layer.text_style().unwrap();
        assert_eq!(style.text, "hello");
        assert_eq!(style.font_size, 18.0);
        assert_eq!(style.font_family, "Arial");
        assert_eq!(style.text_align, TextAlign::Center);
        assert_eq!(style.background_opacity, 1.0);
        assert!(!style.font_bold && !style.font_italic && !style.font_underline && !style.font_strikethrough);
    }

    #[test]
    fn test_short_and_invalid_tints() {
        let short: Tint = serde_json::from_str(r##""#f00""##).unwrap();
        assert_eq!(short, Tint::from_rgb(255, 0, 0));
        let invalid: Tint = serde_json::from_str(r#""red""#).unwrap();
        assert_eq!(invalid, Tint::WHITE);
    }

    #[test]
    fn test_duplicate_offsets_and_renews_id() {
        let layer = Layer::from_asset(&image_asset(), Some(Pos2::new(100.0, 100.0)), &LayerDefaults::default());
        let copy = layer.duplicate(Vec2::splat(20.0));
        assert_ne!(copy.id, layer.id);
        assert_eq!(copy.position, Pos2::new(120.0, 120.0));
        assert_eq!(copy.name, layer.name);
    }
}
