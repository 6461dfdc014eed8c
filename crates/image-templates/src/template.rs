//! Image reference templates: the parsed form of a configured
//! `host/name:tag@{digest}` reference family.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use itertools::Itertools as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::range::FloatRange;

/// The registry assumed when a reference names none.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// The namespace prepended to bare names on the default registry.
const DEFAULT_NAMESPACE: &str = "library";

/// Errors raised while parsing a template reference.
///
/// The `Display` messages are a contract: they name the violated rule and
/// are surfaced verbatim through configuration and CLI error output.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    /// The reference had no image name.
    #[error("image name is empty")]
    EmptyName,

    /// The registry host contained an underscore.
    #[error("registry host `{0}` must not contain underscores")]
    UnderscoreInHost(String),

    /// The registry host contained a character outside its allowed set.
    #[error("registry host `{0}` may only contain letters, digits, `.`, and `-`")]
    InvalidHost(String),

    /// The registry host's port was not numeric.
    #[error("registry port in `{0}` must be numeric")]
    InvalidPort(String),

    /// The image name contained a character outside its allowed set.
    #[error("image name `{0}` may only contain lowercase letters, digits, `.`, `_`, `-`, and `/`")]
    InvalidName(String),

    /// The image name began or ended with a separator character.
    #[error("image name `{0}` must not begin or end with a separator")]
    NameBoundary(String),

    /// More than one `:` separated the name and tag.
    #[error("expected at most one `:` between name and tag")]
    TooManyColons,

    /// More than one `@` appeared in the reference.
    #[error("expected at most one `@` before a digest")]
    TooManyAtSigns,

    /// The `@` was not followed by exactly `{digest}`.
    #[error("`@` must be followed by exactly `{{digest}}`")]
    MalformedDigest,

    /// A `:` separator was present but the tag after it was empty.
    #[error("image tag is empty")]
    EmptyTag,

    /// A `{` in the tag had no matching `}`.
    #[error("unmatched `{{` in `{0}`: placeholder brackets must pair")]
    UnmatchedBracket(String),

    /// A `}` in the tag had no matching `{`.
    #[error("unmatched `}}` in `{0}`: placeholder brackets must pair")]
    StrayBracket(String),

    /// A placeholder in the tag was not a `{v...}` placeholder.
    #[error("unknown placeholder `{{{0}}}`: expected `{{v}}` or `{{v<range>}}`")]
    UnknownPlaceholder(String),

    /// A `{v...}` placeholder carried an unparseable range.
    #[error("invalid float range `{0}`: expected `*`, `N.*`, or `N.M.*`")]
    InvalidRange(String),
}

/// One segment of a template's tag structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagSegment {
    /// Literal text, matched as-is (but case-insensitively).
    Literal(String),
    /// A `{v...}` placeholder and its float range.
    Float(FloatRange),
}

impl fmt::Display for TagSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagSegment::Literal(text) => f.write_str(text),
            TagSegment::Float(range) => range.fmt(f),
        }
    }
}

/// A parsed image reference family: registry, name, tag structure, and
/// digest requirement.
///
/// Two renderings coexist. The canonical rendering ([`Template::render`],
/// also `Display`) fills in the default registry and namespace; the written
/// rendering ([`Template::written`]) reproduces the reference the way its
/// author typed it, which is the shape derived patterns match in files.
/// Equality and hashing consider only the canonical fields.
#[derive(Debug, Clone)]
pub struct Template {
    /// Canonical lowercased registry host (with optional port).
    pub(crate) registry: String,
    /// Canonical image name, namespace included.
    pub(crate) name: String,
    /// The host as written, when the reference carried one.
    pub(crate) written_registry: Option<String>,
    /// The name as written, without the defaulted namespace.
    pub(crate) written_name: String,
    /// Ordered tag structure.
    pub(crate) tag: Vec<TagSegment>,
    /// Whether matches must carry a digest.
    pub(crate) requires_digest: bool,
}

impl Template {
    /// Parses a reference, assuming [`DEFAULT_REGISTRY`] when the text
    /// names no registry of its own.
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        Self::parse_with_registry(text, None)
    }

    /// Parses a reference, assuming `default_registry` (when given) over
    /// [`DEFAULT_REGISTRY`] when the text names no registry of its own.
    ///
    /// A registry supplied here counts as written: derived patterns will
    /// expect it in matched text, exactly as if the reference had spelled
    /// it out.
    pub fn parse_with_registry(
        text: &str,
        default_registry: Option<&str>,
    ) -> Result<Self, TemplateError> {
        let (written_host, rest) = match text.split_once('/') {
            Some((host, rest)) if is_registry(host) => (Some(host), rest),
            _ => (None, text),
        };

        let (registry, written_registry) = match written_host.or(default_registry) {
            Some(host) => {
                let host = validate_host(host)?;
                (host.clone(), Some(host))
            }
            None => (DEFAULT_REGISTRY.into(), None),
        };

        if rest.matches('@').count() > 1 {
            return Err(TemplateError::TooManyAtSigns);
        }
        let (rest, requires_digest) = match rest.split_once('@') {
            Some((before, "{digest}")) => (before, true),
            Some(_) => return Err(TemplateError::MalformedDigest),
            None => (rest, false),
        };

        if rest.matches(':').count() > 1 {
            return Err(TemplateError::TooManyColons);
        }
        let (written_name, tag_text) = match rest.split_once(':') {
            Some((_, "")) => return Err(TemplateError::EmptyTag),
            Some((name, tag)) => (name, Some(tag)),
            None => (rest, None),
        };
        validate_name(written_name)?;

        let name = if registry == DEFAULT_REGISTRY && !written_name.contains('/') {
            format!("{DEFAULT_NAMESPACE}/{written_name}")
        } else {
            written_name.into()
        };

        let tag = match tag_text {
            Some(tag_text) => parse_tag(tag_text)?,
            None => vec![TagSegment::Float(FloatRange::Any)],
        };

        Ok(Template {
            registry,
            name,
            written_registry,
            written_name: written_name.into(),
            tag,
            requires_digest,
        })
    }

    /// The canonical registry host.
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// The canonical image name, namespace included.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether matches must carry a `sha256:` digest.
    pub fn requires_digest(&self) -> bool {
        self.requires_digest
    }

    /// The ordered tag structure.
    pub fn tag_segments(&self) -> &[TagSegment] {
        &self.tag
    }

    /// The number of version placeholders in the tag structure.
    pub fn version_slots(&self) -> usize {
        self.float_ranges().count()
    }

    /// The declared float ranges, in tag order.
    pub(crate) fn float_ranges(&self) -> impl Iterator<Item = FloatRange> {
        self.tag.iter().filter_map(|segment| match segment {
            TagSegment::Float(range) => Some(*range),
            TagSegment::Literal(_) => None,
        })
    }

    /// Canonical repository and image rendering (`docker.io/library/nginx`),
    /// the form used in commit and pull request text.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.registry, self.name)
    }

    /// Canonical tag rendering (`{v}`, `1.{v2.*}-alpine`, ...).
    pub fn tag_text(&self) -> String {
        self.tag.iter().join("")
    }

    /// Canonical full rendering.
    pub fn render(&self) -> String {
        let mut out = format!("{}:{}", self.slug(), self.tag_text());
        if self.requires_digest {
            out.push_str("@{digest}");
        }
        out
    }

    /// The reference as its author wrote it: explicit host only, no
    /// defaulted namespace. Derived patterns are rendered from this form,
    /// since it is what appears in scanned files.
    pub fn written(&self) -> String {
        let mut out = String::new();
        if let Some(host) = &self.written_registry {
            out.push_str(host);
            out.push('/');
        }
        out.push_str(&self.written_name);
        out.push(':');
        out.push_str(&self.tag_text());
        if self.requires_digest {
            out.push_str("@{digest}");
        }
        out
    }
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.registry == other.registry
            && self.name == other.name
            && self.tag == other.tag
            && self.requires_digest == other.requires_digest
    }
}

impl Eq for Template {}

impl Hash for Template {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.registry.hash(state);
        self.name.hash(state);
        self.tag.hash(state);
        self.requires_digest.hash(state);
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl FromStr for Template {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Template::parse(s)
    }
}

impl Serialize for Template {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Whether a leading path segment names a registry rather than the first
/// component of an image name.
fn is_registry(segment: &str) -> bool {
    segment == "localhost" || segment.contains('.') || segment.contains(':')
}

fn validate_host(host: &str) -> Result<String, TemplateError> {
    let (name, port) = match host.split_once(':') {
        Some((name, port)) => (name, Some(port)),
        None => (host, None),
    };
    if let Some(port) = port
        && (port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(TemplateError::InvalidPort(host.into()));
    }
    if name.contains('_') {
        return Err(TemplateError::UnderscoreInHost(host.into()));
    }
    if name.is_empty()
        || !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
    {
        return Err(TemplateError::InvalidHost(host.into()));
    }
    Ok(host.to_ascii_lowercase())
}

fn validate_name(name: &str) -> Result<(), TemplateError> {
    if name.is_empty() {
        return Err(TemplateError::EmptyName);
    }
    if !name.bytes().all(|b| {
        b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'-' | b'/')
    }) {
        return Err(TemplateError::InvalidName(name.into()));
    }
    let separator = |b: u8| matches!(b, b'.' | b'_' | b'-' | b'/');
    if separator(name.as_bytes()[0]) || separator(name.as_bytes()[name.len() - 1]) {
        return Err(TemplateError::NameBoundary(name.into()));
    }
    Ok(())
}

fn parse_tag(tag: &str) -> Result<Vec<TagSegment>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = tag;

    loop {
        match rest.find(['{', '}']) {
            None => {
                literal.push_str(rest);
                break;
            }
            Some(at) if rest.as_bytes()[at] == b'}' => {
                return Err(TemplateError::StrayBracket(tag.into()));
            }
            Some(at) => {
                literal.push_str(&rest[..at]);
                let after = &rest[at + 1..];
                let Some(end) = after.find('}') else {
                    return Err(TemplateError::UnmatchedBracket(tag.into()));
                };
                let body = &after[..end];
                let Some(range) = body.strip_prefix('v') else {
                    return Err(TemplateError::UnknownPlaceholder(body.into()));
                };
                let range = FloatRange::parse(range)
                    .ok_or_else(|| TemplateError::InvalidRange(range.into()))?;
                if !literal.is_empty() {
                    segments.push(TagSegment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(TagSegment::Float(range));
                rest = &after[end + 1..];
            }
        }
    }
    if !literal.is_empty() {
        segments.push(TagSegment::Literal(literal));
    }

    Ok(segments)
}
