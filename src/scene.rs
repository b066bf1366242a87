use std::collections::HashMap;
use std::fmt::Write as _;

use sha2::{Digest, Sha256};

use crate::diagnostics::Diagnostic;
use crate::error::ElementError;
use crate::paint::{Paint, resolve_paint};
use crate::resources::ImageSource;
use crate::transform::Matrix;
use crate::types::{Bounds, Point};

/// Index of a node in its document's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCap {
    Butt,
    Round,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineJoin {
    Miter,
    Bevel,
    Round,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeStyle {
    pub fill: Option<Paint>,
    pub stroke: Option<Paint>,
    pub stroke_width: f32,
    pub dash_array: Vec<f32>,
    pub dash_offset: f32,
    pub line_cap: LineCap,
    pub line_join: LineJoin,
    pub miter_limit: f32,
}

impl Default for ShapeStyle {
    fn default() -> Self {
        // SVG defaults: black fill, no stroke.
        Self {
            fill: Some(Paint::Color(crate::types::Color::BLACK)),
            stroke: None,
            stroke_width: 1.0,
            dash_array: Vec::new(),
            dash_offset: 0.0,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            miter_limit: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Font {
    pub family: String,
    pub size: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Rectangle {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        rx: f32,
        ry: f32,
    },
    Circle {
        cx: f32,
        cy: f32,
        r: f32,
    },
    Ellipse {
        cx: f32,
        cy: f32,
        rx: f32,
        ry: f32,
    },
    /// Raw path data, left for the backend to interpret.
    Path {
        data: String,
    },
    Polygon {
        points: Vec<Point>,
    },
    Polyline {
        points: Vec<Point>,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    },
    Text {
        x: f32,
        y: f32,
        content: String,
        font: Option<Font>,
    },
}

impl Geometry {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Geometry::Rectangle { .. } => "rect",
            Geometry::Circle { .. } => "circle",
            Geometry::Ellipse { .. } => "ellipse",
            Geometry::Path { .. } => "path",
            Geometry::Polygon { .. } => "polygon",
            Geometry::Polyline { .. } => "polyline",
            Geometry::Line { .. } => "line",
            Geometry::Text { .. } => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub geometry: Geometry,
    pub style: ShapeStyle,
}

impl Shape {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            style: ShapeStyle::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub source: ImageSource,
    pub preserve_ratio: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group(Group),
    Shape(Shape),
    Image(Image),
}

/// Visibility mask of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Clip {
    Rect(Bounds),
    /// A detached group holding freshly rebuilt clip members.
    Nodes(NodeId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: Option<String>,
    pub visible: bool,
    pub opacity: f32,
    pub transforms: Vec<Matrix>,
    pub clip: Option<Clip>,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: None,
            visible: true,
            opacity: 1.0,
            transforms: Vec::new(),
            clip: None,
            kind,
        }
    }

    pub fn group() -> Self {
        Self::new(NodeKind::Group(Group::default()))
    }

    pub fn shape(geometry: Geometry) -> Self {
        Self::new(NodeKind::Shape(Shape::new(geometry)))
    }

    pub fn as_shape(&self) -> Option<&Shape> {
        match &self.kind {
            NodeKind::Shape(shape) => Some(shape),
            _ => None,
        }
    }

    pub fn as_shape_mut(&mut self) -> Option<&mut Shape> {
        match &mut self.kind {
            NodeKind::Shape(shape) => Some(shape),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match &self.kind {
            NodeKind::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&Image> {
        match &self.kind {
            NodeKind::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn is_shape(&self) -> bool {
        matches!(self.kind, NodeKind::Shape(_))
    }

    /// All applied transforms folded into one matrix, first applied outermost.
    pub fn combined_transform(&self) -> Matrix {
        self.transforms
            .iter()
            .fold(Matrix::identity(), |acc, m| acc.mul(*m))
    }
}

/// Attributes of the root `<svg>` element. Lengths have their unit suffix stripped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetadata {
    pub id: Option<String>,
    pub version: Option<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub view_box: Option<Bounds>,
    pub enable_background: Option<Bounds>,
    pub space: Option<String>,
}

/// The built scene graph: an arena of nodes, the root container and the id tables.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    node_ids: HashMap<String, NodeId>,
    group_ids: HashMap<String, NodeId>,
    metadata: Option<DocumentMetadata>,
    diagnostics: Vec<Diagnostic>,
}

impl Document {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![Node::group()],
            root: NodeId(0),
            node_ids: HashMap::new(),
            group_ids: HashMap::new(),
            metadata: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children(self.root).is_empty()
    }

    /// Looks a node up in the id table.
    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.node_ids.get(id).map(|n| self.node(*n))
    }

    pub fn node_id(&self, id: &str) -> Option<NodeId> {
        self.node_ids.get(id).copied()
    }

    /// Looks a group up in the group table.
    pub fn get_group(&self, id: &str) -> Option<&Node> {
        self.group_ids.get(id).map(|n| self.node(*n))
    }

    pub fn group_id(&self, id: &str) -> Option<NodeId> {
        self.group_ids.get(id).copied()
    }

    pub fn node_table(&self) -> &HashMap<String, NodeId> {
        &self.node_ids
    }

    pub fn group_table(&self) -> &HashMap<String, NodeId> {
        &self.group_ids
    }

    pub fn metadata(&self) -> Option<&DocumentMetadata> {
        self.metadata.as_ref()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).kind {
            NodeKind::Group(group) => &group.children,
            _ => &[],
        }
    }

    /// Pre-order walk of the tree under `from`, `from` included. Clip members are
    /// not part of the tree and are not visited.
    pub fn descendants(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            out.push(id);
            for child in self.children(id).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// Replaces the fill of a shape node by parsing a color literal. Unknown ids and
    /// non-shape nodes are left alone and report `Ok(false)`.
    pub fn set_fill(&mut self, id: &str, color: &str) -> Result<bool, ElementError> {
        let paint = resolve_paint(color, &HashMap::new())?;
        Ok(self.apply_fill(id, paint))
    }

    pub fn set_fill_paint(&mut self, id: &str, paint: Paint) -> bool {
        self.apply_fill(id, Some(paint))
    }

    fn apply_fill(&mut self, id: &str, paint: Option<Paint>) -> bool {
        let Some(node_id) = self.node_id(id) else {
            return false;
        };
        match self.node_mut(node_id).as_shape_mut() {
            Some(shape) => {
                shape.style.fill = paint;
                true
            }
            None => false,
        }
    }

    /// SHA-256 over a canonical dump of the tree, stable across repeated builds of
    /// the same input.
    pub fn fingerprint(&self) -> String {
        let dump = self.structure_dump();
        let digest = Sha256::digest(dump.as_bytes());
        let mut out = String::with_capacity(64);
        for byte in digest.iter() {
            let _ = write!(out, "{:02x}", byte);
        }
        out
    }

    /// Indented, arena-independent description of the tree and both id tables.
    pub fn structure_dump(&self) -> String {
        let mut out = String::new();
        self.dump_node(&mut out, self.root, 0);

        let mut nodes: Vec<(&String, &NodeId)> = self.node_ids.iter().collect();
        nodes.sort_by(|a, b| a.0.cmp(b.0));
        for (key, id) in nodes {
            let _ = writeln!(out, "node-id {} -> {}", key, self.path_of(*id));
        }
        let mut groups: Vec<(&String, &NodeId)> = self.group_ids.iter().collect();
        groups.sort_by(|a, b| a.0.cmp(b.0));
        for (key, id) in groups {
            let _ = writeln!(out, "group-id {} -> {}", key, self.path_of(*id));
        }
        out
    }

    fn dump_node(&self, out: &mut String, id: NodeId, depth: usize) {
        let node = self.node(id);
        let indent = "  ".repeat(depth);
        let _ = write!(
            out,
            "{}id={:?} visible={} opacity={:?} transforms={:?}",
            indent, node.id, node.visible, node.opacity, node.transforms
        );
        match &node.kind {
            NodeKind::Group(_) => {
                let _ = writeln!(out, " group");
            }
            NodeKind::Shape(shape) => {
                let _ = writeln!(out, " {:?} {:?}", shape.geometry, shape.style);
            }
            NodeKind::Image(image) => {
                let _ = writeln!(out, " {:?}", image);
            }
        }
        match &node.clip {
            Some(Clip::Rect(bounds)) => {
                let _ = writeln!(out, "{}clip-rect {:?}", indent, bounds);
            }
            Some(Clip::Nodes(clip)) => {
                let _ = writeln!(out, "{}clip", indent);
                self.dump_node(out, *clip, depth + 1);
            }
            None => {}
        }
        for child in self.children(id) {
            self.dump_node(out, *child, depth + 1);
        }
    }

    fn path_of(&self, target: NodeId) -> String {
        fn find(doc: &Document, at: NodeId, target: NodeId, path: &mut Vec<usize>) -> bool {
            if at == target {
                return true;
            }
            for (idx, child) in doc.children(at).iter().enumerate() {
                path.push(idx);
                if find(doc, *child, target, path) {
                    return true;
                }
                path.pop();
            }
            false
        }
        let mut path = Vec::new();
        if find(self, self.root, target, &mut path) {
            let parts: Vec<String> = path.iter().map(|p| p.to_string()).collect();
            format!("/{}", parts.join("/"))
        } else {
            "detached".to_string()
        }
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub(crate) fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if let NodeKind::Group(group) = &mut self.nodes[parent.0].kind {
            group.children.push(child);
        }
    }

    pub(crate) fn take_children(&mut self, parent: NodeId) -> Vec<NodeId> {
        match &mut self.nodes[parent.0].kind {
            NodeKind::Group(group) => std::mem::take(&mut group.children),
            _ => Vec::new(),
        }
    }

    pub(crate) fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        if let NodeKind::Group(group) = &mut self.nodes[parent.0].kind {
            let index = index.min(group.children.len());
            group.children.insert(index, child);
        }
    }

    /// Registers a node under its explicit id, or under a synthetic id numbered by
    /// the current size of the table, counting up past keys already taken. An
    /// explicitly empty id registers nothing.
    pub(crate) fn register_node(&mut self, node: NodeId, explicit: Option<&str>, prefix: &str) {
        let key = match explicit {
            Some(id) => id.to_string(),
            None => {
                let mut n = self.node_ids.len();
                loop {
                    let candidate = format!("{}{}", prefix, n);
                    if !self.node_ids.contains_key(&candidate) {
                        break candidate;
                    }
                    n += 1;
                }
            }
        };
        if key.is_empty() {
            return;
        }
        self.nodes[node.0].id = Some(key.clone());
        self.node_ids.insert(key, node);
    }

    pub(crate) fn register_group(&mut self, id: &str, group: NodeId) {
        if id.is_empty() {
            return;
        }
        self.group_ids.insert(id.to_string(), group);
    }

    pub(crate) fn set_metadata(&mut self, metadata: DocumentMetadata) {
        self.metadata = Some(metadata);
    }

    pub(crate) fn set_diagnostics(&mut self, diagnostics: Vec<Diagnostic>) {
        self.diagnostics = diagnostics;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Color;

    fn rect() -> Node {
        Node::shape(Geometry::Rectangle {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
            rx: 0.0,
            ry: 0.0,
        })
    }

    #[test]
    fn synthetic_ids_follow_table_size() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = doc.alloc(rect());
        doc.register_node(a, None, "node#");
        doc.append_child(root, a);
        let b = doc.alloc(rect());
        doc.register_node(b, Some("named"), "node#");
        doc.append_child(root, b);
        let c = doc.alloc(rect());
        doc.register_node(c, None, "node#");
        doc.append_child(root, c);

        assert_eq!(doc.node_id("node#0"), Some(a));
        assert_eq!(doc.node_id("named"), Some(b));
        assert_eq!(doc.node_id("node#2"), Some(c));
    }

    #[test]
    fn synthetic_ids_skip_keys_already_taken() {
        let mut doc = Document::new();
        let named = doc.alloc(rect());
        doc.register_node(named, Some("node#1"), "node#");
        let a = doc.alloc(rect());
        doc.register_node(a, None, "node#");
        let b = doc.alloc(rect());
        doc.register_node(b, None, "node#");
        let c = doc.alloc(rect());
        doc.register_node(c, None, "node#");

        assert_eq!(doc.node_id("node#1"), Some(named));
        assert_eq!(doc.node_id("node#2"), Some(a));
        assert_eq!(doc.node_id("node#3"), Some(b));
        assert_eq!(doc.node_id("node#4"), Some(c));
        assert_eq!(doc.node_table().len(), 4);
    }

    #[test]
    fn empty_id_is_not_registered() {
        let mut doc = Document::new();
        let a = doc.alloc(rect());
        doc.register_node(a, Some(""), "node#");
        assert!(doc.node_table().is_empty());
        assert_eq!(doc.node(a).id, None);
    }

    #[test]
    fn set_fill_only_touches_shapes() {
        let mut doc = Document::new();
        let root = doc.root();
        let shape = doc.alloc(rect());
        doc.register_node(shape, Some("r"), "node#");
        doc.append_child(root, shape);
        let group = doc.alloc(Node::group());
        doc.register_node(group, Some("g"), "node#");
        doc.append_child(root, group);

        assert_eq!(doc.set_fill("r", "#0000ff"), Ok(true));
        let fill = doc.get_node("r").unwrap().as_shape().unwrap().style.fill.clone();
        assert_eq!(fill, Some(Paint::Color(Color::rgb(0.0, 0.0, 1.0))));

        assert_eq!(doc.set_fill("g", "#0000ff"), Ok(false));
        assert_eq!(doc.set_fill("nope", "#0000ff"), Ok(false));
        assert!(!doc.set_fill_paint("nope", Paint::Color(Color::BLACK)));
        assert!(doc.set_fill("r", "bogus").is_err());
    }

    #[test]
    fn descendants_are_pre_order() {
        let mut doc = Document::new();
        let root = doc.root();
        let g = doc.alloc(Node::group());
        doc.append_child(root, g);
        let a = doc.alloc(rect());
        doc.append_child(g, a);
        let b = doc.alloc(rect());
        doc.insert_child(root, 0, b);
        assert_eq!(doc.descendants(root), vec![root, b, g, a]);
    }

    #[test]
    fn fingerprint_ignores_arena_layout_but_not_content() {
        let mut one = Document::new();
        let r1 = one.root();
        let unused = one.alloc(rect());
        let a = one.alloc(rect());
        one.append_child(r1, a);
        let _ = unused;

        let mut two = Document::new();
        let r2 = two.root();
        let b = two.alloc(rect());
        two.append_child(r2, b);
        assert_eq!(one.fingerprint(), two.fingerprint());

        two.node_mut(b).opacity = 0.5;
        assert_ne!(one.fingerprint(), two.fingerprint());
    }
}
