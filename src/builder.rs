use std::collections::HashMap;

use url::Url;

use crate::diagnostics::{DebugLogger, Diagnostics};
use crate::error::{BuildError, ElementError, HandlerError};
use crate::event::{Event, EventSource, StartTag, parse_number};
use crate::fragments::{self, ClipPath, Definition};
use crate::gradient;
use crate::paint::Paint;
use crate::scene::{Clip, Document, DocumentMetadata, Geometry, Node, NodeId};
use crate::shapes;
use crate::style;
use crate::types::{Bounds, Color};

pub const DEFAULT_ID_PREFIX: &str = "node#";

/// Per-build settings. One set is shared by every document a loader builds.
#[derive(Clone)]
pub struct BuildOptions {
    pub stage_rectangle: bool,
    pub clip_to_view_box: bool,
    pub id_prefix: String,
    pub base_url: Option<Url>,
    /// Label used in log lines, normally the document location.
    pub context: String,
    pub(crate) debug: Option<DebugLogger>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            stage_rectangle: true,
            clip_to_view_box: true,
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            base_url: None,
            context: "<memory>".to_string(),
            debug: None,
        }
    }
}

/// Tables owned by one in-flight build and handed to every element handler.
pub(crate) struct BuildContext {
    pub document: Document,
    pub gradients: HashMap<String, Paint>,
    pub definitions: HashMap<String, Definition>,
    pub clip_paths: HashMap<String, ClipPath>,
    pub diagnostics: Diagnostics,
    pub base_url: Option<Url>,
    id_prefix: String,
}

impl BuildContext {
    pub fn new(options: &BuildOptions) -> Self {
        Self {
            document: Document::new(),
            gradients: HashMap::new(),
            definitions: HashMap::new(),
            clip_paths: HashMap::new(),
            diagnostics: Diagnostics::new(options.context.clone(), options.debug.clone()),
            base_url: options.base_url.clone(),
            id_prefix: options.id_prefix.clone(),
        }
    }
}

/// Single forward pass from markup events to a [`Document`].
pub struct DocumentBuilder<S: EventSource> {
    source: Option<S>,
    options: BuildOptions,
}

impl<S: EventSource> DocumentBuilder<S> {
    pub fn new(source: S, options: BuildOptions) -> Self {
        Self {
            source: Some(source),
            options,
        }
    }

    /// Consumes the whole event stream. The source is closed afterwards whether or
    /// not the build succeeded; a stopped or already used builder returns
    /// [`BuildError::Stopped`].
    pub fn build(&mut self) -> Result<Document, BuildError> {
        let mut source = self.source.take().ok_or(BuildError::Stopped)?;
        let result = self.run(&mut source);
        source.close();
        result
    }

    /// Releases the event source. Safe to call any number of times.
    pub fn stop(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.source.is_none()
    }

    fn run(&self, source: &mut S) -> Result<Document, BuildError> {
        let mut ctx = BuildContext::new(&self.options);
        let root = ctx.document.root();

        if let Err(err) = dispatch(source, &mut ctx, root, None) {
            ctx.diagnostics.severe("source-failure", err.to_string());
            ctx.diagnostics.finish();
            return Err(err);
        }

        self.post_process(&mut ctx);

        let BuildContext {
            mut document,
            diagnostics,
            ..
        } = ctx;
        document.set_diagnostics(diagnostics.finish());
        Ok(document)
    }

    fn post_process(&self, ctx: &mut BuildContext) {
        let Some(metadata) = ctx.document.metadata().cloned() else {
            return;
        };
        let root = ctx.document.root();

        if self.options.stage_rectangle && metadata.width > 0.0 && metadata.height > 0.0 {
            let mut stage = Node::shape(Geometry::Rectangle {
                x: 0.0,
                y: 0.0,
                width: metadata.width,
                height: metadata.height,
                rx: 0.0,
                ry: 0.0,
            });
            if let Some(shape) = stage.as_shape_mut() {
                shape.style.fill = Some(Paint::Color(Color::TRANSPARENT));
                shape.style.stroke = None;
            }
            let stage = ctx.document.alloc(stage);
            ctx.document.register_node(stage, None, &ctx.id_prefix);
            ctx.document.insert_child(root, 0, stage);
        }

        if self.options.clip_to_view_box {
            if let Some(view_box) = metadata.view_box {
                ctx.document.node_mut(root).clip = Some(Clip::Rect(view_box));
            }
        }
    }
}

fn is_group_element(name: &str) -> bool {
    matches!(name, "svg" | "g")
}

/// Reads events and attaches the nodes they produce to `parent` until the end tag
/// named `closing` (or the end of the stream when `closing` is `None`). End tags of
/// any other name are not scope boundaries.
pub(crate) fn dispatch(
    source: &mut dyn EventSource,
    ctx: &mut BuildContext,
    parent: NodeId,
    closing: Option<&str>,
) -> Result<(), BuildError> {
    while let Some(event) = source.next_event()? {
        match event {
            Event::End(name) => {
                if closing == Some(name.as_str()) {
                    return Ok(());
                }
            }
            Event::Start(tag) => match handle_element(source, ctx, &tag) {
                Ok(Some(produced)) => {
                    if let Err(err) = finish_node(ctx, &tag, produced) {
                        match err {
                            HandlerError::Element(err) => ctx.diagnostics.element_dropped(&err),
                            HandlerError::Fatal(err) => return Err(err),
                        }
                        // a dropped group hands its already registered content up
                        for child in ctx.document.take_children(produced.id) {
                            ctx.document.append_child(parent, child);
                        }
                        continue;
                    }
                    ctx.document.append_child(parent, produced.id);
                    if is_group_element(&tag.name) {
                        if let Some(id) = tag.id() {
                            ctx.document.register_group(id, produced.id);
                        }
                    }
                }
                Ok(None) => {}
                Err(HandlerError::Element(err)) => ctx.diagnostics.element_dropped(&err),
                Err(HandlerError::Fatal(err)) => return Err(err),
            },
            Event::Text(_) => {}
        }
    }
    Ok(())
}

#[derive(Clone, Copy)]
struct Produced {
    id: NodeId,
    /// Built from a `use`, which already applied style, opacity and transform.
    from_use: bool,
}

fn handle_element(
    source: &mut dyn EventSource,
    ctx: &mut BuildContext,
    tag: &StartTag,
) -> Result<Option<Produced>, HandlerError> {
    let node = match tag.name.as_str() {
        "rect" | "circle" | "ellipse" | "path" | "polygon" | "polyline" | "line" | "image" => {
            match shapes::rebuild_routine(&tag.name) {
                Some(build) => build(tag, &*ctx)?,
                None => return Ok(None),
            }
        }
        "text" => shapes::build_text(source, tag)?,
        "svg" | "g" => return build_group(source, ctx, tag).map(Some),
        "linearGradient" => {
            gradient::build_linear(source, tag, ctx)?;
            return Ok(None);
        }
        "radialGradient" => {
            gradient::build_radial(source, tag, ctx)?;
            return Ok(None);
        }
        "defs" => {
            fragments::build_defs(source, tag, ctx)?;
            return Ok(None);
        }
        "clipPath" => {
            fragments::build_clip_path(source, tag, ctx)?;
            return Ok(None);
        }
        "use" => {
            let Some(reference) = fragments::resolve_use(tag, ctx)? else {
                return Ok(None);
            };
            let node = reference.build(ctx)?;
            let id = ctx.document.alloc(node);
            return Ok(Some(Produced { id, from_use: true }));
        }
        other => {
            ctx.diagnostics
                .info("unsupported-element", format!("Non supported element: <{}>", other));
            return Ok(None);
        }
    };
    let id = ctx.document.alloc(node);
    Ok(Some(Produced {
        id,
        from_use: false,
    }))
}

fn build_group(
    source: &mut dyn EventSource,
    ctx: &mut BuildContext,
    tag: &StartTag,
) -> Result<Produced, HandlerError> {
    if tag.name == "svg" && ctx.document.metadata().is_none() {
        let metadata = read_metadata(tag, ctx);
        ctx.document.set_metadata(metadata);
    }
    let group = ctx.document.alloc(Node::group());
    dispatch(source, ctx, group, Some(&tag.name))?;
    Ok(Produced {
        id: group,
        from_use: false,
    })
}

/// Style, display, opacity, transform, clip and finally the id, in that order.
fn finish_node(
    ctx: &mut BuildContext,
    tag: &StartTag,
    produced: Produced,
) -> Result<(), HandlerError> {
    let BuildContext {
        document,
        gradients,
        diagnostics,
        ..
    } = &mut *ctx;
    let node = document.node_mut(produced.id);

    if !produced.from_use {
        style::apply_shape_style(node, tag, gradients, diagnostics)?;
    }
    style::apply_display(node, tag);
    if !produced.from_use {
        style::apply_opacity(node, tag)?;
        style::apply_transform(node, tag)?;
    }

    fragments::apply_clip_path(produced.id, tag, ctx)?;

    let prefix = ctx.id_prefix.clone();
    ctx.document.register_node(produced.id, tag.id(), &prefix);
    Ok(())
}

/// Root element attributes. Unparseable values are reported and left at their
/// defaults rather than dropping the document.
fn read_metadata(tag: &StartTag, ctx: &mut BuildContext) -> DocumentMetadata {
    let mut metadata = DocumentMetadata::default();
    for attribute in &tag.attributes {
        if let Err(err) = read_metadata_attribute(&mut metadata, &tag.name, &attribute.name, &attribute.value) {
            ctx.diagnostics.warn("invalid-document-attribute", err.to_string());
        }
    }
    metadata
}

fn read_metadata_attribute(
    metadata: &mut DocumentMetadata,
    element: &str,
    name: &str,
    value: &str,
) -> Result<(), ElementError> {
    match name {
        "id" => metadata.id = Some(value.to_string()),
        "version" => metadata.version = Some(value.to_string()),
        "space" => metadata.space = Some(value.to_string()),
        "x" => metadata.x = parse_number(element, name, value)?,
        "y" => metadata.y = parse_number(element, name, value)?,
        "width" => metadata.width = parse_number(element, name, value)?,
        "height" => metadata.height = parse_number(element, name, value)?,
        "viewBox" => metadata.view_box = Some(parse_box(element, name, value)?),
        "enable-background" => metadata.enable_background = Some(parse_box(element, name, value)?),
        _ => {}
    }
    Ok(())
}

/// `x y w h`, optionally preceded by a keyword such as `new`.
fn parse_box(element: &str, attribute: &str, value: &str) -> Result<Bounds, ElementError> {
    let mut tokens: Vec<&str> = value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.len() == 5 {
        tokens.remove(0);
    }
    let invalid = || ElementError::InvalidNumber {
        element: element.to_string(),
        attribute: attribute.to_string(),
        value: value.to_string(),
    };
    let &[x, y, w, h] = tokens.as_slice() else {
        return Err(invalid());
    };
    let number = |t: &str| parse_number(element, attribute, t).map_err(|_| invalid());
    Ok(Bounds::new(number(x)?, number(y)?, number(w)?, number(h)?))
}
