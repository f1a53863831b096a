use egui::{Color32, Pos2, Rect, Vec2, pos2};
use image::Rgba;

/// Rotate `rect` about its own center by `degrees` and return the axis-aligned box
/// around the rotated corners.
///
/// The result always contains the rotated rectangle, though it is looser than the
/// rotated silhouette itself. A zero rotation returns `rect` unchanged.
pub fn rotated_bounds(rect: Rect, degrees: f32) -> Rect {
    if degrees == 0.0 {
        return rect;
    }

    let center = rect.center();
    let (sin, cos) = degrees.to_radians().sin_cos();
    let corners = [
        rect.left_top(),
        rect.right_top(),
        rect.left_bottom(),
        rect.right_bottom(),
    ];

    let rotated = corners.map(|corner| {
        let d = corner - center;
        pos2(
            center.x + d.x * cos - d.y * sin,
            center.y + d.x * sin + d.y * cos,
        )
    });

    calculate_bounds(&rotated, 0.0)
}

/// Calculate the bounding box for a set of points
pub fn calculate_bounds(points: &[Pos2], padding: f32) -> Rect {
    if points.is_empty() {
        return Rect::NOTHING;
    }

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;

    for point in points {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }

    Rect::from_min_max(
        Pos2::new(min_x - padding, min_y - padding),
        Pos2::new(max_x + padding, max_y + padding),
    )
}

/// Union of all rectangles, or `None` for an empty iterator
pub fn union_bounds(rects: impl IntoIterator<Item = Rect>) -> Option<Rect> {
    rects.into_iter().reduce(|acc, rect| acc.union(rect))
}

/// Grow `rect` by `padding` on every side, keeping the min corner out of negative space.
/// The max corner is left unclamped so content may overflow the board.
pub fn pad_and_clamp(rect: Rect, padding: f32) -> Rect {
    Rect::from_min_max(
        pos2((rect.min.x - padding).max(0.0), (rect.min.y - padding).max(0.0)),
        rect.max + Vec2::splat(padding),
    )
}

/// Per-channel RGB comparison; alpha is ignored.
pub fn color_matches(a: Rgba<u8>, b: Rgba<u8>, tolerance: u8) -> bool {
    a[0].abs_diff(b[0]) <= tolerance
        && a[1].abs_diff(b[1]) <= tolerance
        && a[2].abs_diff(b[2]) <= tolerance
}

/// Opaque pixel value of an (opaque) color
pub fn to_rgba(color: Color32) -> Rgba<u8> {
    Rgba(color.to_srgba_unmultiplied())
}

/// Parse `#rrggbb` or the `#rgb` shorthand (leading `#` optional, case-insensitive)
pub fn parse_hex_color(hex: &str) -> Option<Color32> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match digits.len() {
        6 => {
            let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
            Some(Color32::from_rgb(channel(0)?, channel(2)?, channel(4)?))
        }
        3 => {
            // `#f80` is `#ff8800`
            let channel = |i: usize| u8::from_str_radix(&digits[i..i + 1], 16).ok().map(|v| v * 17);
            Some(Color32::from_rgb(channel(0)?, channel(1)?, channel(2)?))
        }
        _ => None,
    }
}

/// Format as lowercase `#rrggbb`
pub fn to_hex(color: Color32) -> String {
    format!("#{:02x}{:02x}{:02x}", color.r(), color.g(), color.b())
}
