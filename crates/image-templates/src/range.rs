//! Float ranges: the under-constrained version specifications written
//! inside `{v...}` tag placeholders.

use std::fmt;

use semver::Version;

/// A partially pinned version specification.
///
/// This is deliberately not a full semver range grammar: a placeholder
/// either floats freely or pins a major (or major and minor) component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatRange {
    /// Matches any version, prereleases included. Written `{v}` or `{v*}`.
    Any,
    /// Matches any version with the given major. Written `{vN.*}`.
    Major(u64),
    /// Matches any version with the given major and minor. Written `{vN.M.*}`.
    MajorMinor(u64, u64),
}

impl FloatRange {
    /// Parses the text between `{v` and `}` in a placeholder.
    pub(crate) fn parse(range: &str) -> Option<FloatRange> {
        if range.is_empty() || range == "*" {
            return Some(FloatRange::Any);
        }

        let pinned = range.strip_suffix(".*")?;
        match pinned.split_once('.') {
            None => Some(FloatRange::Major(component(pinned)?)),
            Some((_, minor)) if minor.contains('.') => None,
            Some((major, minor)) => Some(FloatRange::MajorMinor(
                component(major)?,
                component(minor)?,
            )),
        }
    }

    /// Returns whether `version` falls inside this range.
    pub fn satisfied_by(&self, version: &Version) -> bool {
        match self {
            FloatRange::Any => true,
            FloatRange::Major(major) => version.major == *major,
            FloatRange::MajorMinor(major, minor) => {
                version.major == *major && version.minor == *minor
            }
        }
    }
}

impl fmt::Display for FloatRange {
    /// Renders the canonical placeholder form, braces included.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloatRange::Any => write!(f, "{{v}}"),
            FloatRange::Major(major) => write!(f, "{{v{major}.*}}"),
            FloatRange::MajorMinor(major, minor) => write!(f, "{{v{major}.{minor}.*}}"),
        }
    }
}

/// Parses one numeric range component, rejecting signs and empty text
/// (which `u64::from_str` would otherwise tolerate).
fn component(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
