use crate::builder::BuildContext;
use crate::error::{ElementError, HandlerError};
use crate::event::{Event, EventSource, StartTag, parse_number};
use crate::resources::resolve_image_href;
use crate::scene::{Font, Geometry, Image, Node, NodeKind};
use crate::types::Point;

/// Builds a fresh node from an element record. Stored by `use` references and
/// clip paths so every reuse constructs a new node.
pub(crate) type ShapeBuilder = fn(&StartTag, &BuildContext) -> Result<Node, ElementError>;

/// The routine that rebuilds elements named `name`, for the kinds that can be
/// referenced. Text, groups and gradients have none.
pub(crate) fn rebuild_routine(name: &str) -> Option<ShapeBuilder> {
    let routine: ShapeBuilder = match name {
        "rect" => build_rect,
        "circle" => build_circle,
        "ellipse" => build_ellipse,
        "path" => build_path,
        "polygon" => build_polygon,
        "polyline" => build_polyline,
        "line" => build_line,
        "image" => build_image,
        _ => return None,
    };
    Some(routine)
}

fn build_rect(tag: &StartTag, _ctx: &BuildContext) -> Result<Node, ElementError> {
    let x = tag.number("x")?.unwrap_or(0.0);
    let y = tag.number("y")?.unwrap_or(0.0);
    let width = tag.required_number("width")?;
    let height = tag.required_number("height")?;
    let rx = tag.number("rx")?;
    let ry = tag.number("ry")?;
    // one radius implies the other
    let (rx, ry) = match (rx, ry) {
        (Some(rx), Some(ry)) => (rx, ry),
        (Some(r), None) | (None, Some(r)) => (r, r),
        (None, None) => (0.0, 0.0),
    };
    Ok(Node::shape(Geometry::Rectangle {
        x,
        y,
        width,
        height,
        rx,
        ry,
    }))
}

fn build_circle(tag: &StartTag, _ctx: &BuildContext) -> Result<Node, ElementError> {
    Ok(Node::shape(Geometry::Circle {
        cx: tag.required_number("cx")?,
        cy: tag.required_number("cy")?,
        r: tag.required_number("r")?,
    }))
}

fn build_ellipse(tag: &StartTag, _ctx: &BuildContext) -> Result<Node, ElementError> {
    Ok(Node::shape(Geometry::Ellipse {
        cx: tag.required_number("cx")?,
        cy: tag.required_number("cy")?,
        rx: tag.required_number("rx")?,
        ry: tag.required_number("ry")?,
    }))
}

fn build_path(tag: &StartTag, _ctx: &BuildContext) -> Result<Node, ElementError> {
    let data = tag.required_attr("d")?;
    Ok(Node::shape(Geometry::Path {
        data: data.to_string(),
    }))
}

fn build_polygon(tag: &StartTag, _ctx: &BuildContext) -> Result<Node, ElementError> {
    let points = parse_points(tag)?;
    Ok(Node::shape(Geometry::Polygon { points }))
}

fn build_polyline(tag: &StartTag, _ctx: &BuildContext) -> Result<Node, ElementError> {
    let points = parse_points(tag)?;
    Ok(Node::shape(Geometry::Polyline { points }))
}

fn build_line(tag: &StartTag, _ctx: &BuildContext) -> Result<Node, ElementError> {
    Ok(Node::shape(Geometry::Line {
        x1: tag.required_number("x1")?,
        y1: tag.required_number("y1")?,
        x2: tag.required_number("x2")?,
        y2: tag.required_number("y2")?,
    }))
}

fn build_image(tag: &StartTag, ctx: &BuildContext) -> Result<Node, ElementError> {
    let width = tag.required_number("width")?;
    let height = tag.required_number("height")?;
    let href = tag.required_attr("href")?;
    let source = resolve_image_href(href, ctx.base_url.as_ref())?;
    Ok(Node::new(NodeKind::Image(Image {
        x: tag.number("x")?.unwrap_or(0.0),
        y: tag.number("y")?.unwrap_or(0.0),
        width,
        height,
        source,
        preserve_ratio: true,
    })))
}

/// `x,y x,y ...`; commas and whitespace are interchangeable separators.
fn parse_points(tag: &StartTag) -> Result<Vec<Point>, ElementError> {
    let raw = tag.required_attr("points")?;
    let values = raw
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| parse_number(&tag.name, "points", s))
        .collect::<Result<Vec<f32>, _>>()?;
    if values.len() % 2 != 0 {
        return Err(ElementError::InvalidNumber {
            element: tag.name.clone(),
            attribute: "points".to_string(),
            value: raw.to_string(),
        });
    }
    Ok(values
        .chunks_exact(2)
        .map(|pair| Point {
            x: pair[0],
            y: pair[1],
        })
        .collect())
}

/// Text content is the character data event that immediately follows the start
/// tag. A font is set only when both family and size are given.
pub(crate) fn build_text(
    source: &mut dyn EventSource,
    tag: &StartTag,
) -> Result<Node, HandlerError> {
    let font = match (tag.attr("font-family"), tag.number("font-size")?) {
        (Some(family), Some(size)) => Some(Font {
            family: family.replace(['\'', '"'], "").trim().to_string(),
            size,
        }),
        _ => None,
    };
    let content = match source.next_event()? {
        Some(Event::Text(text)) => text,
        _ => {
            return Err(ElementError::UnexpectedContent {
                element: tag.name.clone(),
            }
            .into());
        }
    };
    Ok(Node::shape(Geometry::Text {
        x: tag.number("x")?.unwrap_or(0.0),
        y: tag.number("y")?.unwrap_or(0.0),
        content,
        font,
    }))
}
