use crate::builder::BuildContext;
use crate::error::{ElementError, HandlerError};
use crate::event::{Event, EventSource, StartTag, skip_element};
use crate::gradient;
use crate::paint::parse_url_ref;
use crate::scene::{Clip, Node, NodeId};
use crate::shapes::{ShapeBuilder, rebuild_routine};
use crate::style;

/// An element recorded inside `defs`, kept unbuilt until something references it.
#[derive(Debug, Clone)]
pub(crate) struct Definition {
    pub id: String,
    pub element: StartTag,
}

/// A resolved `use`: the referencing element, the referenced definition and the
/// routine that rebuilds it.
#[derive(Clone)]
pub(crate) struct Use {
    use_element: StartTag,
    href_element: StartTag,
    rebuild: ShapeBuilder,
}

impl Use {
    /// Rebuilds the referenced element. Style, opacity and transform come from the
    /// definition first and the `use` element second, so the reference site wins.
    pub fn build(&self, ctx: &mut BuildContext) -> Result<Node, HandlerError> {
        let mut node = (self.rebuild)(&self.href_element, &*ctx)?;
        for tag in [&self.href_element, &self.use_element] {
            style::apply_shape_style(&mut node, tag, &ctx.gradients, &mut ctx.diagnostics)?;
        }
        for tag in [&self.href_element, &self.use_element] {
            style::apply_opacity(&mut node, tag)?;
            style::apply_transform(&mut node, tag)?;
        }
        Ok(node)
    }
}

/// A named set of `use` members. Every application rebuilds all members.
#[derive(Clone)]
pub(crate) struct ClipPath {
    pub id: String,
    pub members: Vec<Use>,
}

impl ClipPath {
    /// Allocates a detached group holding fresh copies of the members. Members
    /// that fail to build are reported and left out.
    pub fn instantiate(&self, ctx: &mut BuildContext) -> Result<NodeId, HandlerError> {
        log::debug!("rebuilding clip path '{}'", self.id);
        let group = ctx.document.alloc(Node::group());
        for member in &self.members {
            match member.build(ctx) {
                Ok(node) => {
                    let id = ctx.document.alloc(node);
                    ctx.document.append_child(group, id);
                }
                Err(HandlerError::Element(err)) => ctx.diagnostics.element_dropped(&err),
                Err(fatal) => return Err(fatal),
            }
        }
        Ok(group)
    }
}

/// Records every element inside `defs` under its id. Gradients and clip paths
/// are built right away since they are referenced by paint and clip strings.
pub(crate) fn build_defs(
    source: &mut dyn EventSource,
    tag: &StartTag,
    ctx: &mut BuildContext,
) -> Result<(), HandlerError> {
    let mut depth = 0usize;
    while let Some(event) = source.next_event()? {
        match event {
            Event::End(name) if name == tag.name => {
                if depth == 0 {
                    return Ok(());
                }
                depth -= 1;
            }
            Event::Start(child) if child.name == tag.name => depth += 1,
            Event::Start(child) => {
                let handled = match child.name.as_str() {
                    "linearGradient" => gradient::build_linear(source, &child, ctx),
                    "radialGradient" => gradient::build_radial(source, &child, ctx),
                    "clipPath" => build_clip_path(source, &child, ctx),
                    _ => {
                        record_definition(child, ctx);
                        Ok(())
                    }
                };
                match handled {
                    Ok(()) => {}
                    Err(HandlerError::Element(err)) => ctx.diagnostics.element_dropped(&err),
                    Err(fatal) => return Err(fatal),
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn record_definition(element: StartTag, ctx: &mut BuildContext) {
    match element.id().filter(|id| !id.is_empty()) {
        Some(id) => {
            let id = id.to_string();
            ctx.definitions.insert(id.clone(), Definition { id, element });
        }
        None => ctx.diagnostics.info(
            "missing-definition-id",
            format!("<{}> inside <defs> has no id and is ignored", element.name),
        ),
    }
}

/// Collects the `use` members of a clip path. Other member kinds are reported and
/// ignored.
pub(crate) fn build_clip_path(
    source: &mut dyn EventSource,
    tag: &StartTag,
    ctx: &mut BuildContext,
) -> Result<(), HandlerError> {
    let mut members = Vec::new();
    while let Some(event) = source.next_event()? {
        match event {
            Event::End(name) if name == tag.name => break,
            Event::Start(child) if child.name == "use" => match resolve_use(&child, ctx) {
                Ok(Some(member)) => members.push(member),
                Ok(None) => {}
                Err(err) => ctx.diagnostics.element_dropped(&err),
            },
            Event::Start(child) => {
                ctx.diagnostics.info(
                    "unsupported-element",
                    format!("Non supported element in <clipPath>: <{}>", child.name),
                );
                skip_element(source, &child.name)?;
            }
            _ => {}
        }
    }

    match tag.id() {
        Some(id) => {
            let id = id.to_string();
            ctx.clip_paths.insert(id.clone(), ClipPath { id, members });
        }
        None => ctx.diagnostics.info(
            "missing-definition-id",
            "<clipPath> without an id cannot be referenced",
        ),
    }
    Ok(())
}

/// Resolves `href="#id"` against the definitions seen so far. Unknown ids and
/// definitions that cannot be rebuilt are reported and yield no `Use`.
pub(crate) fn resolve_use(
    tag: &StartTag,
    ctx: &mut BuildContext,
) -> Result<Option<Use>, ElementError> {
    let href = tag.required_attr("href")?;
    let Some(id) = href.trim().strip_prefix('#') else {
        ctx.diagnostics.info(
            "unsupported-reference",
            format!("<use> supports only local references, got '{}'", href),
        );
        return Ok(None);
    };
    let Some(definition) = ctx.definitions.get(id) else {
        ctx.diagnostics.info(
            "unresolved-use",
            format!("Not found used element: '{}'", id),
        );
        return Ok(None);
    };

    let href_element = definition.element.clone();
    let id = definition.id.clone();
    match rebuild_routine(&href_element.name) {
        Some(rebuild) => Ok(Some(Use {
            use_element: tag.clone(),
            href_element,
            rebuild,
        })),
        None => {
            let code = match href_element.name.as_str() {
                "text" | "svg" | "g" | "linearGradient" | "radialGradient" => {
                    "unsupported-reference"
                }
                _ => "unsupported-element",
            };
            ctx.diagnostics.info(
                code,
                format!("<use> cannot rebuild <{}> '{}'", href_element.name, id),
            );
            Ok(None)
        }
    }
}

/// `clip-path="url(#id)"` gets a freshly built copy of the named clip path.
/// Unknown ids are ignored without a diagnostic.
pub(crate) fn apply_clip_path(
    target: NodeId,
    tag: &StartTag,
    ctx: &mut BuildContext,
) -> Result<(), HandlerError> {
    let Some(id) = tag.attr("clip-path").and_then(parse_url_ref) else {
        return Ok(());
    };
    let Some(clip) = ctx.clip_paths.get(&id).cloned() else {
        return Ok(());
    };
    let group = clip.instantiate(ctx)?;
    ctx.document.node_mut(target).clip = Some(Clip::Nodes(group));
    Ok(())
}
