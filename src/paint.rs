use std::collections::HashMap;

use lightningcss::traits::Parse;
use lightningcss::values::color::{CssColor, SRGB};

use crate::error::ElementError;
use crate::types::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMethod {
    NoCycle,
    Reflect,
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    pub offset: f32, // 0..=1
    pub color: Color,
}

/// Linear gradient in user space, any gradient transform already applied to the
/// endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearGradient {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub cycle: CycleMethod,
    pub stops: Vec<GradientStop>,
}

/// Radial gradient in user space. The focal point is expressed relative to the
/// center: `focus_angle` in degrees (center to focus), `focus_distance` as a
/// fraction of `radius`.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialGradient {
    pub focus_angle: f32,
    pub focus_distance: f32,
    pub cx: f32,
    pub cy: f32,
    pub radius: f32,
    pub cycle: CycleMethod,
    pub stops: Vec<GradientStop>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Paint {
    Color(Color),
    Linear(LinearGradient),
    Radial(RadialGradient),
}

impl Paint {
    pub fn as_color(&self) -> Option<Color> {
        match self {
            Paint::Color(c) => Some(*c),
            _ => None,
        }
    }

    pub fn stops(&self) -> &[GradientStop] {
        match self {
            Paint::Color(_) => &[],
            Paint::Linear(g) => &g.stops,
            Paint::Radial(g) => &g.stops,
        }
    }
}

impl From<Color> for Paint {
    fn from(value: Color) -> Self {
        Paint::Color(value)
    }
}

/// Resolves a paint string: `none` is no paint, `url(#id)` is looked up in the
/// gradient table (unknown ids are no paint), anything else must be a web color.
pub fn resolve_paint(
    value: &str,
    gradients: &HashMap<String, Paint>,
) -> Result<Option<Paint>, ElementError> {
    let v = value.trim();
    if v.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    if v.to_ascii_lowercase().starts_with("url(") {
        return Ok(parse_url_ref(v).and_then(|id| gradients.get(&id).cloned()));
    }
    parse_web_color(v)
        .map(|c| Some(Paint::Color(c)))
        .ok_or_else(|| ElementError::InvalidColor(v.to_string()))
}

/// Hex (`#rgb`, `#rrggbb`, `#rrggbbaa`), named and functional CSS colors.
pub fn parse_web_color(input: &str) -> Option<Color> {
    let color = CssColor::parse_string(input.trim()).ok()?;
    if let CssColor::RGBA(rgba) = &color {
        return Some(Color::rgba(
            rgba.red as f32 / 255.0,
            rgba.green as f32 / 255.0,
            rgba.blue as f32 / 255.0,
            rgba.alpha as f32 / 255.0,
        ));
    }
    SRGB::try_from(&color)
        .ok()
        .map(|srgb| Color::rgba(srgb.r, srgb.g, srgb.b, srgb.alpha))
}

/// `url(#id)` -> `id`.
pub(crate) fn parse_url_ref(input: &str) -> Option<String> {
    let s = input.trim();
    let open = s.find('(')?;
    let close = s.rfind(')')?;
    if close <= open + 1 {
        return None;
    }
    let inner = s[open + 1..close]
        .trim()
        .trim_matches('"')
        .trim_matches('\'');
    let id = inner.strip_prefix('#')?;
    if id.is_empty() {
        return None;
    }
    Some(id.to_string())
}

/// Appends `round(opacity * 255)` as two hex digits to a `#rrggbb` literal.
pub(crate) fn fold_alpha_suffix(color: &str, opacity: f32) -> String {
    let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
    format!("{}{:02x}", color.trim(), alpha)
}
