use std::collections::HashMap;

use crate::diagnostics::Diagnostics;
use crate::error::{ElementError, HandlerError};
use crate::event::{StartTag, parse_number};
use crate::paint::{Paint, fold_alpha_suffix, resolve_paint};
use crate::scene::{LineCap, LineJoin, Node, ShapeStyle};
use crate::transform::parse_transform;

/// `name:value` pairs of an inline style string, names lower-cased. Declarations
/// without a colon are returned with an empty name so callers can report them.
pub(crate) fn declarations(input: &str) -> impl Iterator<Item = (String, &str)> {
    input
        .split(';')
        .map(str::trim)
        .filter(|decl| !decl.is_empty())
        .map(|decl| match decl.split_once(':') {
            Some((k, v)) => (k.trim().to_ascii_lowercase(), v.trim()),
            None => (String::new(), decl),
        })
}

/// Presentation attributes first, then the inline `style` attribute, which wins
/// per property. Non-shape nodes are left untouched.
pub(crate) fn apply_shape_style(
    node: &mut Node,
    tag: &StartTag,
    gradients: &HashMap<String, Paint>,
    diagnostics: &mut Diagnostics,
) -> Result<(), ElementError> {
    let mut style_opacity = None;
    {
        let Some(shape) = node.as_shape_mut() else {
            return Ok(());
        };
        let style = &mut shape.style;

        apply_presentation_attributes(style, tag, gradients, diagnostics)?;

        if let Some(inline) = tag.attr("style") {
            style_opacity = apply_inline_style(style, tag, inline, gradients, diagnostics)?;
        }
    }
    if let Some(opacity) = style_opacity {
        node.opacity = opacity;
    }
    Ok(())
}

fn apply_presentation_attributes(
    style: &mut ShapeStyle,
    tag: &StartTag,
    gradients: &HashMap<String, Paint>,
    diagnostics: &mut Diagnostics,
) -> Result<(), ElementError> {
    if let Some(fill) = tag.attr("fill") {
        style.fill = match tag.attr("fill-opacity") {
            Some(opacity) => {
                let opacity = parse_number(&tag.name, "fill-opacity", opacity)?;
                fill_with_opacity(fill, opacity, gradients)?
            }
            None => resolve_paint(fill, gradients)?,
        };
    }

    // stroke is not inherited from an earlier pass
    style.stroke = match tag.attr("stroke") {
        Some(stroke) => resolve_paint(stroke, gradients)?,
        None => None,
    };

    if let Some(width) = tag.number("stroke-width")? {
        style.stroke_width = width.max(0.0);
    }
    if let Some(cap) = tag.attr("stroke-linecap") {
        set_line_cap(style, cap, &tag.name, diagnostics);
    }
    if let Some(join) = tag.attr("stroke-linejoin") {
        set_line_join(style, join, &tag.name, diagnostics);
    }
    if let Some(limit) = tag.number("stroke-miterlimit")? {
        style.miter_limit = limit;
    }
    if let Some(dashes) = tag.attr("stroke-dasharray") {
        style.dash_array = parse_dash_array(&tag.name, dashes)?;
    }
    if let Some(offset) = tag.number("stroke-dashoffset")? {
        style.dash_offset = offset;
    }
    Ok(())
}

/// Returns the `opacity` declaration, which belongs to the node rather than the
/// shape style.
fn apply_inline_style(
    style: &mut ShapeStyle,
    tag: &StartTag,
    inline: &str,
    gradients: &HashMap<String, Paint>,
    diagnostics: &mut Diagnostics,
) -> Result<Option<f32>, ElementError> {
    let mut opacity = None;
    for (name, value) in declarations(inline) {
        match name.as_str() {
            "fill" => style.fill = resolve_paint(value, gradients)?,
            "stroke" => style.stroke = resolve_paint(value, gradients)?,
            "stroke-width" => {
                style.stroke_width = parse_number(&tag.name, "stroke-width", value)?.max(0.0)
            }
            "stroke-linecap" => set_line_cap(style, value, &tag.name, diagnostics),
            "stroke-linejoin" => set_line_join(style, value, &tag.name, diagnostics),
            "stroke-miterlimit" => {
                style.miter_limit = parse_number(&tag.name, "stroke-miterlimit", value)?
            }
            "stroke-dasharray" => style.dash_array = parse_dash_array(&tag.name, value)?,
            "stroke-dashoffset" => {
                style.dash_offset = parse_number(&tag.name, "stroke-dashoffset", value)?
            }
            "opacity" => {
                opacity = Some(parse_number(&tag.name, "opacity", value)?.clamp(0.0, 1.0))
            }
            _ => diagnostics.info(
                "unsupported-style",
                format!("No support style: '{}' on <{}>", value_or_decl(&name, value), tag.name),
            ),
        }
    }
    Ok(opacity)
}

fn value_or_decl(name: &str, value: &str) -> String {
    if name.is_empty() {
        value.to_string()
    } else {
        format!("{}:{}", name, value)
    }
}

/// `#rrggbb` literals get the opacity as a two digit alpha suffix. Other color
/// forms get the same alpha byte set directly; gradients are left as they are.
fn fill_with_opacity(
    fill: &str,
    opacity: f32,
    gradients: &HashMap<String, Paint>,
) -> Result<Option<Paint>, ElementError> {
    let trimmed = fill.trim();
    let is_hex6 = trimmed.len() == 7
        && trimmed.starts_with('#')
        && trimmed[1..].chars().all(|c| c.is_ascii_hexdigit());
    if is_hex6 {
        return resolve_paint(&fold_alpha_suffix(trimmed, opacity), gradients);
    }
    let paint = resolve_paint(trimmed, gradients)?;
    Ok(paint.map(|paint| match paint {
        Paint::Color(color) => {
            let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() / 255.0;
            Paint::Color(color.with_alpha(alpha))
        }
        other => other,
    }))
}

fn set_line_cap(style: &mut ShapeStyle, value: &str, element: &str, diagnostics: &mut Diagnostics) {
    match value {
        "butt" => style.line_cap = LineCap::Butt,
        "round" => style.line_cap = LineCap::Round,
        "square" => style.line_cap = LineCap::Square,
        other => diagnostics.info(
            "unsupported-style",
            format!("No support style: 'stroke-linecap:{}' on <{}>", other, element),
        ),
    }
}

fn set_line_join(style: &mut ShapeStyle, value: &str, element: &str, diagnostics: &mut Diagnostics) {
    match value {
        "miter" => style.line_join = LineJoin::Miter,
        "bevel" => style.line_join = LineJoin::Bevel,
        "round" => style.line_join = LineJoin::Round,
        other => diagnostics.info(
            "unsupported-style",
            format!("No support style: 'stroke-linejoin:{}' on <{}>", other, element),
        ),
    }
}

fn parse_dash_array(element: &str, input: &str) -> Result<Vec<f32>, ElementError> {
    if input.trim().eq_ignore_ascii_case("none") {
        return Ok(Vec::new());
    }
    input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| parse_number(element, "stroke-dasharray", s))
        .collect()
}

/// `display="none"` hides the node; every other value leaves it visible.
pub(crate) fn apply_display(node: &mut Node, tag: &StartTag) {
    if let Some(display) = tag.attr("display") {
        if display.trim() == "none" {
            node.visible = false;
        }
    }
}

pub(crate) fn apply_opacity(node: &mut Node, tag: &StartTag) -> Result<(), ElementError> {
    if let Some(opacity) = tag.number("opacity")? {
        node.opacity = opacity.clamp(0.0, 1.0);
    }
    Ok(())
}

pub(crate) fn apply_transform(node: &mut Node, tag: &StartTag) -> Result<(), HandlerError> {
    if let Some(value) = tag.attr("transform") {
        if let Some(matrix) = parse_transform(&tag.name, "transform", value)? {
            node.transforms.push(matrix);
        }
    }
    Ok(())
}
