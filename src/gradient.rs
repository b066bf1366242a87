use crate::builder::BuildContext;
use crate::diagnostics::Diagnostics;
use crate::error::{ElementError, HandlerError};
use crate::event::{Event, EventSource, StartTag, parse_number, skip_element};
use crate::paint::{
    CycleMethod, GradientStop, LinearGradient, Paint, RadialGradient, parse_url_ref,
    parse_web_color,
};
use crate::style::declarations;
use crate::transform::{Matrix, parse_transform};

/// Checks `gradientUnits`, id and transform, then consumes the stops. Returns
/// `None` when the gradient cannot be used; the element has been fully consumed
/// either way.
fn open_gradient(
    source: &mut dyn EventSource,
    tag: &StartTag,
    ctx: &mut BuildContext,
) -> Result<Option<(String, Option<Matrix>, Vec<GradientStop>)>, HandlerError> {
    if let Some(units) = tag.attr("gradientUnits") {
        if units != "userSpaceOnUse" {
            ctx.diagnostics.info(
                "unsupported-units",
                format!("<{}> supports only userSpaceOnUse, got '{}'", tag.name, units),
            );
            skip_element(source, &tag.name)?;
            return Ok(None);
        }
    }

    let mut stops = read_stops(source, &tag.name, &mut ctx.diagnostics)?;

    let transform = match tag.attr("gradientTransform") {
        Some(value) => parse_transform(&tag.name, "gradientTransform", value)?,
        None => None,
    };

    let Some(id) = tag.id() else {
        ctx.diagnostics.info(
            "missing-definition-id",
            format!("<{}> without an id cannot be referenced", tag.name),
        );
        return Ok(None);
    };

    if stops.is_empty() {
        if let Some(inherited) = tag.attr("href").and_then(|href| inherited_stops(href, ctx)) {
            stops = inherited;
        }
    }

    Ok(Some((id.to_string(), transform, stops)))
}

fn inherited_stops(href: &str, ctx: &mut BuildContext) -> Option<Vec<GradientStop>> {
    let id = href.trim().strip_prefix('#').map(str::to_string).or_else(|| parse_url_ref(href))?;
    match ctx.gradients.get(&id) {
        Some(paint) => Some(paint.stops().to_vec()),
        None => {
            ctx.diagnostics.info(
                "unsupported-reference",
                format!("gradient href '{}' does not name an earlier gradient", href),
            );
            None
        }
    }
}

pub(crate) fn build_linear(
    source: &mut dyn EventSource,
    tag: &StartTag,
    ctx: &mut BuildContext,
) -> Result<(), HandlerError> {
    let Some((id, transform, stops)) = open_gradient(source, tag, ctx)? else {
        return Ok(());
    };

    let mut x1 = tag.required_number("x1")?;
    let mut y1 = tag.required_number("y1")?;
    let mut x2 = tag.required_number("x2")?;
    let mut y2 = tag.required_number("y2")?;

    if let Some(m) = transform {
        (x1, y1) = m.apply(x1, y1);
        (x2, y2) = m.apply(x2, y2);
    }

    let gradient = LinearGradient {
        x1,
        y1,
        x2,
        y2,
        cycle: CycleMethod::NoCycle,
        stops,
    };
    ctx.gradients.insert(id, Paint::Linear(gradient));
    Ok(())
}

pub(crate) fn build_radial(
    source: &mut dyn EventSource,
    tag: &StartTag,
    ctx: &mut BuildContext,
) -> Result<(), HandlerError> {
    let Some((id, transform, stops)) = open_gradient(source, tag, ctx)? else {
        return Ok(());
    };

    let cx = tag.required_number("cx")?;
    let cy = tag.required_number("cy")?;
    let r = tag.required_number("r")?;
    let fx = tag.number("fx")?.unwrap_or(cx);
    let fy = tag.number("fy")?.unwrap_or(cy);

    let gradient = radial_geometry(cx, cy, r, fx, fy, transform.unwrap_or_default(), stops);
    ctx.gradients.insert(id, Paint::Radial(gradient));
    Ok(())
}

/// Maps center and focus through `m` and expresses the focus as an angle (degrees,
/// measured from the center towards the focus) and a distance relative to the
/// mapped radius. The radius scales by sqrt(|det|), which is exact for similarity
/// transforms and the area-preserving mean otherwise.
pub(crate) fn radial_geometry(
    cx: f32,
    cy: f32,
    r: f32,
    fx: f32,
    fy: f32,
    m: Matrix,
    stops: Vec<GradientStop>,
) -> RadialGradient {
    let (cx, cy) = m.apply(cx, cy);
    let (fx, fy) = m.apply(fx, fy);
    let radius = r * m.scale_factor();

    let dx = fx - cx;
    let dy = fy - cy;
    let offset = libm::hypotf(dx, dy);
    let (focus_angle, focus_distance) = if offset == 0.0 || radius == 0.0 {
        (0.0, 0.0)
    } else {
        (libm::atan2f(dy, dx).to_degrees(), offset / radius)
    };

    RadialGradient {
        focus_angle,
        focus_distance,
        cx,
        cy,
        radius,
        cycle: CycleMethod::NoCycle,
        stops,
    }
}

/// Reads `stop` children up to the end tag `closing`. Stops that lack an offset
/// or a usable color are reported and left out.
fn read_stops(
    source: &mut dyn EventSource,
    closing: &str,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<GradientStop>, HandlerError> {
    let mut stops = Vec::new();
    while let Some(event) = source.next_event()? {
        match event {
            Event::End(name) if name == closing => break,
            Event::Start(tag) if tag.name == "stop" => match read_stop(&tag, diagnostics) {
                Ok(stop) => stops.push(stop),
                Err(err) => diagnostics.element_dropped(&err),
            },
            Event::Start(tag) => {
                diagnostics.info(
                    "unsupported-element",
                    format!("<{}> does not support <{}>", closing, tag.name),
                );
                skip_element(source, &tag.name)?;
            }
            _ => {}
        }
    }
    Ok(stops)
}

fn read_stop(tag: &StartTag, diagnostics: &mut Diagnostics) -> Result<GradientStop, ElementError> {
    let raw_offset = tag.required_attr("offset")?;
    let offset = parse_offset(raw_offset).ok_or_else(|| ElementError::InvalidNumber {
        element: "stop".to_string(),
        attribute: "offset".to_string(),
        value: raw_offset.to_string(),
    })?;

    let mut color = tag.attr("stop-color").map(str::to_string);
    let mut opacity = match tag.attr("stop-opacity") {
        Some(value) => parse_number("stop", "stop-opacity", value)?,
        None => 1.0,
    };

    if let Some(inline) = tag.attr("style") {
        for (name, value) in declarations(inline) {
            match name.as_str() {
                "stop-color" => color = Some(value.to_string()),
                "stop-opacity" => opacity = parse_number("stop", "stop-opacity", value)?,
                _ => diagnostics.info(
                    "unsupported-stop-property",
                    format!("Stop does not support '{}'", inline_item(&name, value)),
                ),
            }
        }
    }

    let color = color.ok_or(ElementError::MissingAttribute {
        element: "stop".to_string(),
        attribute: "stop-color",
    })?;
    let parsed = parse_web_color(&color).ok_or(ElementError::InvalidColor(color))?;
    Ok(GradientStop {
        offset: offset.clamp(0.0, 1.0),
        color: parsed.with_alpha(parsed.a * opacity.clamp(0.0, 1.0)),
    })
}

fn inline_item(name: &str, value: &str) -> String {
    if name.is_empty() {
        value.to_string()
    } else {
        format!("{}:{}", name, value)
    }
}

/// `0.25` or `25%`.
fn parse_offset(raw: &str) -> Option<f32> {
    let raw = raw.trim();
    let value = match raw.strip_suffix('%') {
        Some(percent) => percent.trim().parse::<f32>().ok()? / 100.0,
        None => raw.parse::<f32>().ok()?,
    };
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BuildOptions;
    use crate::event::XmlEventSource;
    use crate::types::Color;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    /// Runs the gradient handler on the first element of `markup`.
    fn run(markup: &str) -> (BuildContext, Result<(), HandlerError>) {
        let mut source = XmlEventSource::parse(markup).unwrap();
        let mut ctx = BuildContext::new(&BuildOptions::default());
        let result = loop {
            match source.next_event().unwrap() {
                Some(Event::Start(tag)) if tag.name == "linearGradient" => {
                    break build_linear(&mut source, &tag, &mut ctx);
                }
                Some(Event::Start(tag)) if tag.name == "radialGradient" => {
                    break build_radial(&mut source, &tag, &mut ctx);
                }
                Some(_) => continue,
                None => panic!("no gradient in markup"),
            }
        };
        (ctx, result)
    }

    #[test]
    fn two_stop_linear_gradient_without_transform() {
        let (ctx, result) = run(
            r##"<linearGradient id="g" gradientUnits="userSpaceOnUse" x1="0" y1="0" x2="1" y2="0">
                <stop offset="0" style="stop-color:#fff"/>
                <stop offset="1" style="stop-color:#000"/>
            </linearGradient>"##,
        );
        result.unwrap();
        let Some(Paint::Linear(g)) = ctx.gradients.get("g") else {
            panic!("expected linear gradient");
        };
        assert_eq!((g.x1, g.y1, g.x2, g.y2), (0.0, 0.0, 1.0, 0.0));
        assert_eq!(g.cycle, CycleMethod::NoCycle);
        assert_eq!(g.stops.len(), 2);
        assert_eq!(g.stops[0].color, Color::rgb(1.0, 1.0, 1.0));
        assert_eq!(g.stops[1].color, Color::rgb(0.0, 0.0, 0.0));
        assert_eq!(g.stops[1].offset, 1.0);
    }

    #[test]
    fn linear_transform_moves_endpoints() {
        let (ctx, result) = run(
            r#"<linearGradient id="g" x1="0" y1="0" x2="10" y2="0" gradientTransform="matrix(2 0 0 2 5 5)"></linearGradient>"#,
        );
        result.unwrap();
        let Some(Paint::Linear(g)) = ctx.gradients.get("g") else {
            panic!("expected linear gradient");
        };
        assert_eq!((g.x1, g.y1, g.x2, g.y2), (5.0, 5.0, 25.0, 5.0));
    }

    #[test]
    fn other_units_are_diagnosed_and_skipped() {
        let (ctx, result) = run(
            r#"<svg><linearGradient id="g" gradientUnits="objectBoundingBox" x1="0" y1="0" x2="1" y2="0"><stop offset="0" stop-color="red"/></linearGradient></svg>"#,
        );
        result.unwrap();
        assert!(ctx.gradients.is_empty());
    }

    #[test]
    fn stop_presentation_attributes_and_percent_offsets() {
        let (ctx, result) = run(
            r#"<linearGradient id="g" x1="0" y1="0" x2="1" y2="0">
                <stop offset="50%" stop-color="red" stop-opacity="0.5"/>
                <stop offset="1"/>
                <stop offset="1" style="stop-color:blue;filter:none"/>
            </linearGradient>"#,
        );
        result.unwrap();
        let stops = ctx.gradients["g"].stops().to_vec();
        assert_eq!(stops.len(), 2);
        assert!(close(stops[0].offset, 0.5));
        assert!(close(stops[0].color.a, 0.5));
        let records = ctx.diagnostics.finish();
        assert!(records.iter().any(|d| d.code == "element-dropped"));
        assert!(records.iter().any(|d| d.code == "unsupported-stop-property"));
    }

    #[test]
    fn href_inherits_stops() {
        let (ctx, result) = run(
            r##"<svg>
                <linearGradient id="base" x1="0" y1="0" x2="1" y2="0"><stop offset="0" stop-color="red"/></linearGradient>
                <radialGradient id="r" href="#base" cx="0" cy="0" r="1"/>
            </svg>"##,
        );
        result.unwrap();
        // `run` stops after the first gradient, so feed the second one by hand
        assert!(ctx.gradients.contains_key("base"));

        let mut source = XmlEventSource::parse(
            r##"<radialGradient id="r" href="#base" cx="0" cy="0" r="1"/>"##,
        )
        .unwrap();
        let mut ctx = ctx;
        let Some(Event::Start(tag)) = source.next_event().unwrap() else {
            panic!("expected start");
        };
        build_radial(&mut source, &tag, &mut ctx).unwrap();
        assert_eq!(ctx.gradients["r"].stops().len(), 1);
    }

    #[test]
    fn radial_without_focus_has_zero_focus() {
        let g = radial_geometry(10.0, 10.0, 5.0, 10.0, 10.0, Matrix::identity(), Vec::new());
        assert_eq!((g.cx, g.cy, g.radius), (10.0, 10.0, 5.0));
        assert_eq!((g.focus_angle, g.focus_distance), (0.0, 0.0));
    }

    #[test]
    fn radial_focus_angle_points_from_center_to_focus() {
        let g = radial_geometry(0.0, 0.0, 10.0, 0.0, 5.0, Matrix::identity(), Vec::new());
        assert!(close(g.focus_angle, 90.0));
        assert!(close(g.focus_distance, 0.5));
    }

    #[test]
    fn radial_transform_maps_center_radius_and_focus() {
        // uniform scale 2 then translate (10, 0)
        let m = Matrix::new(2.0, 0.0, 0.0, 2.0, 10.0, 0.0);
        let g = radial_geometry(1.0, 1.0, 3.0, 2.0, 1.0, m, Vec::new());
        assert_eq!((g.cx, g.cy), (12.0, 2.0));
        assert!(close(g.radius, 6.0));
        assert!(close(g.focus_angle, 0.0));
        assert!(close(g.focus_distance, 2.0 / 6.0));
    }

    #[test]
    fn radial_rotation_rotates_focus_angle() {
        // 90 degree rotation
        let m = Matrix::new(0.0, 1.0, -1.0, 0.0, 0.0, 0.0);
        let g = radial_geometry(0.0, 0.0, 4.0, 2.0, 0.0, m, Vec::new());
        assert!(close(g.focus_angle, 90.0));
        assert!(close(g.focus_distance, 0.5));
        assert!(close(g.radius, 4.0));
    }

    #[test]
    fn missing_coordinate_drops_gradient_after_consuming_stops() {
        let mut source = XmlEventSource::parse(
            r#"<svg><linearGradient id="g" x1="0" y1="0" x2="1"><stop offset="0" stop-color="red"/></linearGradient><rect/></svg>"#,
        )
        .unwrap();
        let mut ctx = BuildContext::new(&BuildOptions::default());
        source.next_event().unwrap();
        let Some(Event::Start(tag)) = source.next_event().unwrap() else {
            panic!("expected start");
        };
        let err = build_linear(&mut source, &tag, &mut ctx).unwrap_err();
        assert!(matches!(
            err,
            HandlerError::Element(ElementError::MissingAttribute { attribute: "y2", .. })
        ));
        match source.next_event().unwrap() {
            Some(Event::Start(next)) => assert_eq!(next.name, "rect"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn nested_gradient_does_not_end_the_outer_stop_scan() {
        let mut source = XmlEventSource::parse(
            r#"<svg><linearGradient id="outer" x1="0" y1="0" x2="1" y2="0">
                <stop offset="0" stop-color="red"/>
                <linearGradient id="inner" x1="0" y1="0" x2="1" y2="0"><stop offset="1" stop-color="blue"/></linearGradient>
                <stop offset="1" stop-color="lime"/>
            </linearGradient><rect/></svg>"#,
        )
        .unwrap();
        let mut ctx = BuildContext::new(&BuildOptions::default());
        source.next_event().unwrap();
        let Some(Event::Start(tag)) = source.next_event().unwrap() else {
            panic!("expected start");
        };
        build_linear(&mut source, &tag, &mut ctx).unwrap();

        let stops = ctx.gradients["outer"].stops().to_vec();
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[1].color, Color::rgb(0.0, 1.0, 0.0));
        assert!(!ctx.gradients.contains_key("inner"));
        loop {
            match source.next_event().unwrap() {
                Some(Event::Text(_)) => continue,
                Some(Event::Start(next)) => {
                    assert_eq!(next.name, "rect");
                    break;
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }
}
