//! Package URL (PURL) identifiers.
//!
//! A PURL names the package being crawled (`pkg:npm/left-pad@1.0.0`). It
//! decides where the package lives inside the hub and which VEX products
//! belong to it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Package type whose hub location is driven by a qualifier instead of
/// namespace/name.
pub const TYPE_OCI: &str = "oci";

/// Qualifier holding the repository of an OCI artifact.
pub const QUALIFIER_REPOSITORY_URL: &str = "repository_url";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PurlError {
    #[error("PURL must start with 'pkg:': {0}")]
    MissingScheme(String),
    #[error("PURL has no type: {0}")]
    MissingType(String),
    #[error("PURL has no name: {0}")]
    MissingName(String),
    #[error("invalid PURL type '{ty}' in {purl}")]
    InvalidType { purl: String, ty: String },
    #[error("PURL name is not a single path segment: {0}")]
    InvalidName(String),
    #[error("OCI PURL has no usable repository_url qualifier: {0}")]
    MissingRepositoryUrl(String),
    #[error("invalid qualifier '{qualifier}' in {purl}")]
    InvalidQualifier { purl: String, qualifier: String },
    #[error("invalid percent-encoding in {0}")]
    InvalidEncoding(String),
}

/// A parsed package URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageUrl {
    pub ty: String,
    pub namespace: Option<String>,
    pub name: String,
    pub version: Option<String>,
    pub qualifiers: BTreeMap<String, String>,
    pub subpath: Option<String>,
}

impl PackageUrl {
    pub fn new(ty: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ty: ty.into().to_ascii_lowercase(),
            namespace: None,
            name: name.into(),
            version: None,
            qualifiers: BTreeMap::new(),
            subpath: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_qualifier(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.qualifiers
            .insert(key.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_subpath(mut self, subpath: impl Into<String>) -> Self {
        self.subpath = Some(subpath.into());
        self
    }

    /// Directory holding this package's VEX documents inside the hub.
    ///
    /// `<hub>/pkg/<type>/<namespace>/<name>/<subpath>`, except for OCI
    /// artifacts which live under `<hub>/pkg/oci/<repository_url>`.
    ///
    /// # Errors
    ///
    /// Fails when the type or name would not stay a single directory level,
    /// or when an OCI identifier lacks a `repository_url`. Every returned
    /// path lies strictly below `<hub>/pkg/<type>`.
    pub fn hub_dir(&self, hub_root: &Path) -> Result<PathBuf, PurlError> {
        if !is_valid_type(&self.ty) {
            return Err(PurlError::InvalidType {
                purl: self.to_string(),
                ty: self.ty.clone(),
            });
        }
        let mut dir = hub_root.join("pkg").join(&self.ty);

        if self.ty == TYPE_OCI {
            let repository = self
                .qualifiers
                .get(QUALIFIER_REPOSITORY_URL)
                .map(String::as_str)
                .unwrap_or_default();
            if push_segments(&mut dir, repository) == 0 {
                return Err(PurlError::MissingRepositoryUrl(self.to_string()));
            }
            return Ok(dir);
        }

        if let Some(namespace) = &self.namespace {
            push_segments(&mut dir, namespace);
        }
        if !is_plain_segment(&self.name) {
            return Err(PurlError::InvalidName(self.to_string()));
        }
        dir.push(&self.name);
        if let Some(subpath) = &self.subpath {
            push_segments(&mut dir, subpath);
        }
        Ok(dir)
    }
}

// Only plain segments are joined so a crafted identifier cannot climb out
// of the hub. Returns how many were joined.
fn push_segments(dir: &mut PathBuf, value: &str) -> usize {
    let mut pushed = 0;
    for segment in value.split('/').filter(|seg| is_plain_segment(seg)) {
        dir.push(segment);
        pushed += 1;
    }
    pushed
}

fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\'])
}

// `[a-z][a-z0-9.+-]*`
fn is_valid_type(ty: &str) -> bool {
    let mut chars = ty.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '+' | '-')
        })
}

impl FromStr for PackageUrl {
    type Err = PurlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once(':')
            .ok_or_else(|| PurlError::MissingScheme(s.to_string()))?;
        if !scheme.eq_ignore_ascii_case("pkg") {
            return Err(PurlError::MissingScheme(s.to_string()));
        }
        let rest = rest.trim_start_matches('/');

        let (rest, subpath) = match rest.rsplit_once('#') {
            Some((head, subpath)) => (head, Some(subpath)),
            None => (rest, None),
        };
        let (rest, qualifiers) = match rest.rsplit_once('?') {
            Some((head, qualifiers)) => (head, Some(qualifiers)),
            None => (rest, None),
        };

        let (ty, rest) = rest
            .split_once('/')
            .ok_or_else(|| PurlError::MissingType(s.to_string()))?;
        if ty.is_empty() {
            return Err(PurlError::MissingType(s.to_string()));
        }
        let ty = ty.to_ascii_lowercase();
        if !is_valid_type(&ty) {
            return Err(PurlError::InvalidType {
                purl: s.to_string(),
                ty,
            });
        }

        let rest = rest.trim_end_matches('/');
        let (namespace, name) = match rest.rsplit_once('/') {
            Some((namespace, name)) => (Some(namespace), name),
            None => (None, rest),
        };
        // The version separator is looked up in the last segment only, so an
        // unencoded npm scope (`@babel`) stays part of the namespace.
        let (name, version) = match name.rsplit_once('@') {
            Some((name, version)) => (name, Some(decode(version, s)?)),
            None => (name, None),
        };
        if name.is_empty() {
            return Err(PurlError::MissingName(s.to_string()));
        }
        let name = decode(name, s)?;
        if !is_plain_segment(&name) {
            return Err(PurlError::InvalidName(s.to_string()));
        }

        let namespace = match namespace {
            Some(ns) => {
                let segments = ns
                    .split('/')
                    .filter(|seg| !seg.is_empty())
                    .map(|seg| decode(seg, s))
                    .collect::<Result<Vec<_>, _>>()?;
                (!segments.is_empty()).then(|| segments.join("/"))
            }
            None => None,
        };

        let mut parsed_qualifiers = BTreeMap::new();
        for pair in qualifiers.unwrap_or_default().split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').ok_or_else(|| PurlError::InvalidQualifier {
                purl: s.to_string(),
                qualifier: pair.to_string(),
            })?;
            let value = decode(value, s)?;
            if !value.is_empty() {
                parsed_qualifiers.insert(key.to_ascii_lowercase(), value);
            }
        }

        let subpath = match subpath {
            Some(sp) => {
                let segments = sp
                    .split('/')
                    .filter(|seg| !seg.is_empty() && *seg != "." && *seg != "..")
                    .map(|seg| decode(seg, s))
                    .collect::<Result<Vec<_>, _>>()?;
                (!segments.is_empty()).then(|| segments.join("/"))
            }
            None => None,
        };

        Ok(Self {
            ty,
            namespace,
            name,
            version: version.filter(|v| !v.is_empty()),
            qualifiers: parsed_qualifiers,
            subpath,
        })
    }
}

impl fmt::Display for PackageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pkg:{}/", self.ty)?;
        if let Some(namespace) = &self.namespace {
            for segment in namespace.split('/').filter(|seg| !seg.is_empty()) {
                write!(f, "{}/", encode(segment))?;
            }
        }
        write!(f, "{}", encode(&self.name))?;
        if let Some(version) = &self.version {
            write!(f, "@{}", encode(version))?;
        }
        let mut separator = '?';
        for (key, value) in &self.qualifiers {
            write!(f, "{separator}{key}={}", encode(value))?;
            separator = '&';
        }
        if let Some(subpath) = &self.subpath {
            let segments: Vec<String> = subpath
                .split('/')
                .filter(|seg| !seg.is_empty())
                .map(encode)
                .collect();
            write!(f, "#{}", segments.join("/"))?;
        }
        Ok(())
    }
}

/// Reports whether `candidate` names the package `target` refers to.
///
/// `target` is the more general identifier: without a version it matches
/// every version of the candidate, and the candidate may carry qualifiers the
/// target does not. Unparseable identifiers never match.
pub fn matches(target: &str, candidate: &str) -> bool {
    let (Ok(target), Ok(candidate)) = (target.parse::<PackageUrl>(), candidate.parse::<PackageUrl>())
    else {
        return false;
    };

    if target.ty != candidate.ty
        || target.namespace != candidate.namespace
        || target.name != candidate.name
    {
        return false;
    }

    if let Some(version) = &target.version {
        if candidate.version.as_ref() != Some(version) {
            return false;
        }
    }

    target
        .qualifiers
        .iter()
        .all(|(key, value)| candidate.qualifiers.get(key) == Some(value))
}

fn encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b':' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn decode(value: &str, purl: &str) -> Result<String, PurlError> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| PurlError::InvalidEncoding(purl.to_string()))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| PurlError::InvalidEncoding(purl.to_string()))
}
