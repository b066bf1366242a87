use std::path::{Path, PathBuf};

use base64::Engine;
use url::Url;

use crate::error::{BuildError, ElementError};

/// Where an image node's pixels come from. Decoding is left to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Url(String),
    File(PathBuf),
    Embedded { mime: String, data: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct Resource {
    pub name: String,
    pub data: Vec<u8>,
}

/// Documents bundled with the application, addressable by name.
#[derive(Debug, Clone, Default)]
pub struct ResourceBundle {
    pub resources: Vec<Resource>,
}

impl ResourceBundle {
    pub fn add(&mut self, name: impl Into<String>, data: Vec<u8>) {
        let name = name.into();
        self.resources.retain(|r| r.name != name);
        self.resources.push(Resource { name, data });
    }

    /// Lookup by name; a leading `/` is ignored.
    pub fn get(&self, name: &str) -> Option<&Resource> {
        let name = name.strip_prefix('/').unwrap_or(name);
        self.resources
            .iter()
            .find(|r| r.name.strip_prefix('/').unwrap_or(&r.name) == name)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    Url(Url),
    Resource(String),
    File(PathBuf),
}

/// An absolute URL first, then a bundled resource, then a local path.
pub fn resolve_location(location: &str, bundle: &ResourceBundle) -> Location {
    if let Ok(url) = Url::parse(location) {
        // single letter schemes are drive letters
        if url.scheme().len() > 1 {
            return Location::Url(url);
        }
    }
    if bundle.get(location).is_some() {
        return Location::Resource(location.to_string());
    }
    Location::File(PathBuf::from(location))
}

/// Bytes of a location plus the base URL relative image references resolve against.
pub(crate) fn read_location(
    location: &Location,
    bundle: &ResourceBundle,
) -> Result<(Vec<u8>, Option<Url>), BuildError> {
    match location {
        Location::Url(url) => match url.scheme() {
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| BuildError::UnresolvedLocation(url.to_string()))?;
                Ok((std::fs::read(path)?, Some(url.clone())))
            }
            "http" | "https" => Ok((fetch_url(url)?, Some(url.clone()))),
            _ => Err(BuildError::UnresolvedLocation(url.to_string())),
        },
        Location::Resource(name) => bundle
            .get(name)
            .map(|r| (r.data.clone(), None))
            .ok_or_else(|| BuildError::UnresolvedLocation(name.clone())),
        Location::File(path) => {
            let data = std::fs::read(path)?;
            Ok((data, file_url(path)))
        }
    }
}

#[cfg(feature = "http")]
fn fetch_url(url: &Url) -> Result<Vec<u8>, BuildError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .user_agent(concat!("svg_scene/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|err| BuildError::Fetch(format!("client build error: {err}")))?;
    let response = client
        .get(url.as_str())
        .send()
        .and_then(|resp| resp.error_for_status())
        .map_err(|err| BuildError::Fetch(format!("{url}: {err}")))?;
    log::debug!("fetched {} ({:?})", response.url(), response.status());
    let body = response
        .bytes()
        .map_err(|err| BuildError::Fetch(format!("{url}: {err}")))?;
    Ok(body.to_vec())
}

#[cfg(not(feature = "http"))]
fn fetch_url(url: &Url) -> Result<Vec<u8>, BuildError> {
    Err(BuildError::UnresolvedLocation(format!(
        "{url} (network locations need the `http` feature)"
    )))
}

fn file_url(path: &Path) -> Option<Url> {
    let absolute = std::fs::canonicalize(path).ok()?;
    Url::from_file_path(absolute).ok()
}

/// Resolves an image `href`: `data:` URIs are decoded, absolute URLs are kept,
/// relative references are joined onto `base` when there is one and otherwise
/// taken as paths.
pub(crate) fn resolve_image_href(
    href: &str,
    base: Option<&Url>,
) -> Result<ImageSource, ElementError> {
    let href = href.trim();
    let invalid = || ElementError::InvalidReference {
        element: "image".to_string(),
        value: truncate(href),
    };
    if href.starts_with("data:") {
        let (mime, data) = parse_data_uri(href).ok_or_else(invalid)?;
        return Ok(ImageSource::Embedded { mime, data });
    }
    let resolved = match Url::parse(href) {
        Ok(url) if url.scheme().len() > 1 => Some(url),
        _ => base.and_then(|base| base.join(href).ok()),
    };
    match resolved {
        Some(url) if url.scheme() == "file" => url
            .to_file_path()
            .map(ImageSource::File)
            .map_err(|_| invalid()),
        Some(url) => Ok(ImageSource::Url(url.to_string())),
        None if href.is_empty() => Err(invalid()),
        None => Ok(ImageSource::File(PathBuf::from(href))),
    }
}

fn truncate(value: &str) -> String {
    value.chars().take(64).collect()
}

pub(crate) fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let (header, payload) = uri.strip_prefix("data:")?.split_once(',')?;
    let mime = header
        .split(';')
        .next()
        .filter(|v| !v.is_empty())
        .unwrap_or("text/plain")
        .to_ascii_lowercase();
    let data = if header.contains(";base64") {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact.as_bytes())
            .ok()?
    } else {
        percent_decode(payload)?
    };
    Some((mime, data))
}

fn percent_decode(input: &str) -> Option<Vec<u8>> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = hex_nibble(*bytes.get(i + 1)?)?;
            let lo = hex_nibble(*bytes.get(i + 2)?)?;
            out.push((hi << 4) | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Some(out)
}

fn hex_nibble(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}
