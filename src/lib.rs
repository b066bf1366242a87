mod builder;
mod diagnostics;
mod error;
mod event;
mod fragments;
mod gradient;
mod paint;
mod resources;
mod scene;
mod shapes;
mod style;
mod transform;
mod types;

use std::path::{Path, PathBuf};

use url::Url;

pub use builder::{BuildOptions, DEFAULT_ID_PREFIX, DocumentBuilder};
use diagnostics::DebugLogger;
pub use diagnostics::{Diagnostic, DiagnosticLevel};
pub use error::{BuildError, ElementError};
pub use event::{Attribute, Event, EventSource, StartTag, XmlEventSource};
pub use paint::{
    CycleMethod, GradientStop, LinearGradient, Paint, RadialGradient, parse_web_color,
    resolve_paint,
};
pub use resources::{ImageSource, Location, Resource, ResourceBundle, resolve_location};
pub use scene::{
    Clip, Document, DocumentMetadata, Font, Geometry, Group, Image, LineCap, LineJoin, Node,
    NodeId, NodeKind, Shape, ShapeStyle,
};
pub use transform::Matrix;
pub use types::{Bounds, Color, Point};

/// Loads vector documents into scene graphs. Cheap to share; every load runs its
/// own independent build.
pub struct SceneLoader {
    options: BuildOptions,
    base_url_configured: bool,
    resources: ResourceBundle,
}

impl SceneLoader {
    pub fn builder() -> SceneLoaderBuilder {
        SceneLoaderBuilder::new()
    }

    /// Resolves `location` as an absolute URL, then a bundled resource name, then
    /// a local path, and builds the document found there.
    pub fn load(&self, location: &str) -> Result<Document, BuildError> {
        let resolved = resolve_location(location, &self.resources);
        let (bytes, base) = resources::read_location(&resolved, &self.resources)
            .inspect_err(|err| log::error!("In {}: {}", location, err))?;
        self.build_bytes(&bytes, location, base)
    }

    pub fn load_path(&self, path: impl AsRef<Path>) -> Result<Document, BuildError> {
        let path = path.as_ref();
        let label = path.display().to_string();
        let (bytes, base) =
            resources::read_location(&Location::File(path.to_path_buf()), &self.resources)
                .inspect_err(|err| log::error!("In {}: {}", label, err))?;
        self.build_bytes(&bytes, &label, base)
    }

    pub fn load_str(&self, markup: &str) -> Result<Document, BuildError> {
        let source = XmlEventSource::parse(markup)
            .inspect_err(|err| log::error!("In <memory>: {}", err))?;
        self.load_events(source)
    }

    pub fn load_bytes(&self, bytes: &[u8]) -> Result<Document, BuildError> {
        self.build_bytes(bytes, "<memory>", None)
    }

    /// Builds from an already tokenized event stream.
    pub fn load_events<S: EventSource>(&self, source: S) -> Result<Document, BuildError> {
        DocumentBuilder::new(source, self.options.clone()).build()
    }

    /// Builds every location in parallel. Results are in input order.
    pub fn load_many(&self, locations: &[String]) -> Vec<Result<Document, BuildError>> {
        use rayon::prelude::*;

        locations
            .par_iter()
            .map(|location| self.load(location))
            .collect()
    }

    pub fn resources(&self) -> &ResourceBundle {
        &self.resources
    }

    fn build_bytes(
        &self,
        bytes: &[u8],
        context: &str,
        base: Option<Url>,
    ) -> Result<Document, BuildError> {
        let source = XmlEventSource::parse_bytes(bytes)
            .inspect_err(|err| log::error!("In {}: {}", context, err))?;
        let mut options = self.options.clone();
        options.context = context.to_string();
        if !self.base_url_configured {
            options.base_url = base;
        }
        DocumentBuilder::new(source, options).build()
    }
}

pub struct SceneLoaderBuilder {
    base_url: Option<String>,
    resources: ResourceBundle,
    stage_rectangle: bool,
    clip_to_view_box: bool,
    debug_path: Option<PathBuf>,
    id_prefix: String,
}

impl Default for SceneLoaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneLoaderBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            resources: ResourceBundle::default(),
            stage_rectangle: true,
            clip_to_view_box: true,
            debug_path: None,
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
        }
    }

    /// Base for relative image references. Overrides the location of loaded files.
    pub fn base_url(mut self, url: &str) -> Self {
        self.base_url = Some(url.to_string());
        self
    }

    pub fn resources(mut self, bundle: ResourceBundle) -> Self {
        self.resources = bundle;
        self
    }

    pub fn resource(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.resources.add(name, data);
        self
    }

    pub fn stage_rectangle(mut self, enabled: bool) -> Self {
        self.stage_rectangle = enabled;
        self
    }

    pub fn clip_to_view_box(mut self, enabled: bool) -> Self {
        self.clip_to_view_box = enabled;
        self
    }

    /// Writes every diagnostic and a per-document summary as JSON lines.
    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn synthetic_id_prefix(mut self, prefix: &str) -> Self {
        self.id_prefix = prefix.to_string();
        self
    }

    pub fn build(self) -> Result<SceneLoader, BuildError> {
        let base_url = match &self.base_url {
            Some(raw) => Some(Url::parse(raw).map_err(|err| {
                BuildError::InvalidConfiguration(format!("base_url '{}': {}", raw, err))
            })?),
            None => None,
        };
        if self.id_prefix.is_empty() {
            return Err(BuildError::InvalidConfiguration(
                "synthetic_id_prefix must not be empty".to_string(),
            ));
        }
        let debug = match self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        Ok(SceneLoader {
            base_url_configured: base_url.is_some(),
            options: BuildOptions {
                stage_rectangle: self.stage_rectangle,
                clip_to_view_box: self.clip_to_view_box,
                id_prefix: self.id_prefix,
                base_url,
                context: "<memory>".to_string(),
                debug,
            },
            resources: self.resources,
        })
    }
}
